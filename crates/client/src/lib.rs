//! The ModelPort client: one provider-agnostic surface for `generate_text`,
//! `stream_text`, `generate_object`, `stream_object`, and `embed` across
//! Anthropic, OpenAI (Chat and Responses), Google Gemini, and
//! OpenAI-compatible endpoints.

mod object;

pub use object::{object, ObjectStream, STRUCTURED_OUTPUT_TOOL};

use mp_catalog::{Catalog, Model, ModelSpec, ProviderInfo};
use mp_domain::context::{Context, Prompt};
use mp_domain::error::{Error, Result};
use mp_domain::options::{EmbedOptions, GenerateOptions};
use mp_domain::response::{EmbedResponse, Response};
use mp_domain::schema::Schema;
use mp_providers::http::{HttpConfig, Transport, UsageHook};
use mp_providers::registry::ProviderRegistry;
use mp_providers::stream::StreamResponse;
use mp_providers::traits::Provider;
use std::path::PathBuf;
use std::sync::Arc;

/// Either a `provider:model` spec string or an already resolved [`Model`].
#[derive(Debug, Clone)]
pub enum ModelRef {
    Spec(String),
    Model(Model),
}

impl From<&str> for ModelRef {
    fn from(spec: &str) -> Self {
        ModelRef::Spec(spec.to_string())
    }
}

impl From<String> for ModelRef {
    fn from(spec: String) -> Self {
        ModelRef::Spec(spec)
    }
}

impl From<&ModelSpec> for ModelRef {
    fn from(spec: &ModelSpec) -> Self {
        ModelRef::Spec(spec.to_string())
    }
}

impl From<Model> for ModelRef {
    fn from(model: Model) -> Self {
        ModelRef::Model(model)
    }
}

/// Input for `embed`: one string or a batch.
#[derive(Debug, Clone)]
pub enum EmbedInput {
    One(String),
    Many(Vec<String>),
}

impl EmbedInput {
    fn into_vec(self) -> Vec<String> {
        match self {
            EmbedInput::One(s) => vec![s],
            EmbedInput::Many(v) => v,
        }
    }
}

impl From<&str> for EmbedInput {
    fn from(s: &str) -> Self {
        EmbedInput::One(s.to_string())
    }
}

impl From<String> for EmbedInput {
    fn from(s: String) -> Self {
        EmbedInput::One(s)
    }
}

impl From<Vec<String>> for EmbedInput {
    fn from(v: Vec<String>) -> Self {
        EmbedInput::Many(v)
    }
}

impl From<Vec<&str>> for EmbedInput {
    fn from(v: Vec<&str>) -> Self {
        EmbedInput::Many(v.into_iter().map(String::from).collect())
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Builder
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[derive(Default)]
pub struct ClientBuilder {
    catalog: Option<Catalog>,
    catalog_dir: Option<(PathBuf, Option<PathBuf>)>,
    http: Option<HttpConfig>,
    usage_hook: Option<UsageHook>,
    extra_providers: Vec<Arc<dyn Provider>>,
}

impl ClientBuilder {
    /// Use an explicit catalog instead of the embedded one.
    pub fn catalog(mut self, catalog: Catalog) -> Self {
        self.catalog = Some(catalog);
        self
    }

    /// Load the catalog from a `models/` directory, with an optional
    /// `models_local/` patch directory. Read errors are fatal at `build`.
    pub fn catalog_dir(
        mut self,
        models_dir: impl Into<PathBuf>,
        local_dir: Option<PathBuf>,
    ) -> Self {
        self.catalog_dir = Some((models_dir.into(), local_dir));
        self
    }

    pub fn http(mut self, config: HttpConfig) -> Self {
        self.http = Some(config);
        self
    }

    /// Invoked with `(model, usage)` after every usage attribution.
    pub fn usage_hook(mut self, hook: UsageHook) -> Self {
        self.usage_hook = Some(hook);
        self
    }

    /// Register a custom provider adapter.
    pub fn provider(mut self, provider: Arc<dyn Provider>) -> Self {
        self.extra_providers.push(provider);
        self
    }

    pub fn build(self) -> Result<Client> {
        let catalog = match (self.catalog, self.catalog_dir) {
            (Some(catalog), _) => catalog,
            (None, Some((models, local))) => Catalog::load(&models, local.as_deref())?,
            (None, None) => Catalog::builtin(),
        };
        let mut registry = ProviderRegistry::for_catalog(&catalog);
        for provider in self.extra_providers {
            registry.register(provider);
        }
        let mut transport = Transport::new(self.http.unwrap_or_default())?;
        if let Some(hook) = self.usage_hook {
            transport = transport.with_usage_hook(hook);
        }
        Ok(Client {
            catalog: Arc::new(catalog),
            registry: Arc::new(registry),
            transport,
        })
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Client
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// The unified LLM client. Cheap to clone; the connection pool, catalog,
/// and provider registry are shared.
#[derive(Clone)]
pub struct Client {
    catalog: Arc<Catalog>,
    registry: Arc<ProviderRegistry>,
    transport: Transport,
}

impl Client {
    /// A client with the embedded catalog and default transport.
    pub fn new() -> Result<Self> {
        ClientBuilder::default().build()
    }

    pub fn builder() -> ClientBuilder {
        ClientBuilder::default()
    }

    pub fn catalog(&self) -> &Catalog {
        &self.catalog
    }

    pub fn registry(&self) -> &ProviderRegistry {
        &self.registry
    }

    /// Resolve a model reference to the model, its provider adapter, and
    /// the catalog provider record.
    pub fn resolve(&self, model: impl Into<ModelRef>) -> Result<ResolvedModel> {
        let model = match model.into() {
            ModelRef::Spec(spec) => self.catalog.resolve(&ModelSpec::parse(&spec)?)?,
            ModelRef::Model(model) => model,
        };
        let provider = self.registry.get(&model.provider).ok_or_else(|| {
            Error::Validation(format!(
                "no provider implementation registered for {:?}",
                model.provider
            ))
        })?;
        let info = self
            .catalog
            .provider(&model.provider)
            .cloned()
            .unwrap_or_else(|| ProviderInfo {
                id: model.provider.clone(),
                name: model.provider.clone(),
                base_url: String::new(),
                env: Vec::new(),
                doc: None,
                compat: None,
            });
        Ok(ResolvedModel {
            model,
            provider,
            info,
        })
    }

    // ── Public operations ──────────────────────────────────────────

    /// Generate a complete assistant turn.
    pub async fn generate_text(
        &self,
        model: impl Into<ModelRef>,
        prompt: impl Into<Prompt>,
        options: &GenerateOptions,
    ) -> Result<Response> {
        let resolved = self.resolve(model)?;
        let context = Context::normalize(prompt)?;
        self.transport
            .generate(
                &resolved.provider,
                &resolved.info,
                &resolved.model,
                context,
                options,
            )
            .await
    }

    /// Open a streaming generation. The returned response exposes the lazy
    /// chunk sequence; `collect()` folds it into a final [`Response`].
    pub async fn stream_text(
        &self,
        model: impl Into<ModelRef>,
        prompt: impl Into<Prompt>,
        options: &GenerateOptions,
    ) -> Result<StreamResponse> {
        let resolved = self.resolve(model)?;
        let context = Context::normalize(prompt)?;
        self.transport
            .stream(
                &resolved.provider,
                &resolved.info,
                &resolved.model,
                context,
                options,
            )
            .await
    }

    /// Generate a structured object conforming to `schema`, by forcing a
    /// call to a synthetic `structured_output` tool and validating its
    /// arguments. Read the object back with [`object`].
    pub async fn generate_object(
        &self,
        model: impl Into<ModelRef>,
        prompt: impl Into<Prompt>,
        schema: &Schema,
        options: &GenerateOptions,
    ) -> Result<Response> {
        let opts = object::object_options(schema, options)?;
        let mut response = self.generate_text(model, prompt, &opts).await?;
        let value = object::extract_and_validate(&response, schema)?;
        response
            .provider_meta
            .insert(STRUCTURED_OUTPUT_TOOL.into(), value);
        Ok(response)
    }

    /// Streaming variant of [`Client::generate_object`]. The returned
    /// stream yields the final object once, at the first successful parse
    /// after the terminal chunk.
    pub async fn stream_object(
        &self,
        model: impl Into<ModelRef>,
        prompt: impl Into<Prompt>,
        schema: &Schema,
        options: &GenerateOptions,
    ) -> Result<ObjectStream> {
        let opts = object::object_options(schema, options)?;
        let stream = self.stream_text(model, prompt, &opts).await?;
        Ok(ObjectStream::new(stream, schema.clone()))
    }

    /// Embed one string or a batch; returns one vector per input.
    pub async fn embed(
        &self,
        model: impl Into<ModelRef>,
        input: impl Into<EmbedInput>,
        options: &EmbedOptions,
    ) -> Result<EmbedResponse> {
        let resolved = self.resolve(model)?;
        let input = input.into().into_vec();
        if input.is_empty() {
            return Err(Error::Validation("embed input is empty".into()));
        }
        self.transport
            .embed(
                &resolved.provider,
                &resolved.info,
                &resolved.model,
                &input,
                options,
            )
            .await
    }
}

/// A resolved model bundled with its adapter and catalog record.
pub struct ResolvedModel {
    pub model: Model,
    pub provider: Arc<dyn Provider>,
    pub info: ProviderInfo,
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Tests
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn resolve_spec_string() {
        let client = Client::new().unwrap();
        let resolved = client.resolve("openai:gpt-4o-mini").unwrap();
        assert_eq!(resolved.model.id, "gpt-4o-mini");
        assert_eq!(resolved.provider.id(), "openai");
        assert_eq!(resolved.info.base_url, "https://api.openai.com/v1");
    }

    #[test]
    fn resolve_compat_provider() {
        let client = Client::new().unwrap();
        let resolved = client.resolve("groq:llama-3.3-70b-versatile").unwrap();
        assert_eq!(resolved.provider.id(), "groq");
        assert_eq!(resolved.info.base_url, "https://api.groq.com/openai/v1");
    }

    #[test]
    fn resolve_rejects_bad_specs() {
        let client = Client::new().unwrap();
        assert!(matches!(
            client.resolve("no-colon"),
            Err(Error::Validation(_))
        ));
        assert!(matches!(
            client.resolve("openai:unknown-model"),
            Err(Error::Validation(_))
        ));
    }

    #[test]
    fn resolve_preresolved_model_skips_catalog() {
        let client = Client::new().unwrap();
        let model = client.catalog().resolve_spec("anthropic:claude-3-haiku-20240307").unwrap();
        let resolved = client.resolve(model).unwrap();
        assert_eq!(resolved.provider.id(), "anthropic");
    }

    #[tokio::test]
    async fn generate_text_validates_before_dispatch() {
        let client = Client::new().unwrap();
        // 5 stop sequences: rejected before any network activity.
        let opts = GenerateOptions {
            stop: vec!["a".into(), "b".into(), "c".into(), "d".into(), "e".into()],
            ..Default::default()
        };
        let err = client
            .generate_text("openai:gpt-4o-mini", "hi", &opts)
            .await
            .unwrap_err();
        assert!(matches!(err, Error::Validation(_)));
    }

    #[tokio::test]
    async fn embed_rejects_empty_input() {
        let client = Client::new().unwrap();
        let err = client
            .embed("openai:text-embedding-3-small", Vec::<String>::new(), &Default::default())
            .await
            .unwrap_err();
        assert!(matches!(err, Error::Validation(_)));
    }

    #[tokio::test]
    async fn embed_rejects_non_embedding_models() {
        let client = Client::new().unwrap();
        let err = client
            .embed("openai:gpt-4o-mini", "hello", &Default::default())
            .await
            .unwrap_err();
        assert!(matches!(err, Error::Validation(_)));
    }
}
