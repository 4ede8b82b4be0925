//! Provider registry.
//!
//! Maps provider ids to adapter instances. The three native adapters are
//! always present; catalog providers declaring `compat = "openai"` are
//! registered through the OpenAI-compatible chat codec at construction.

use crate::anthropic::AnthropicProvider;
use crate::google::GoogleProvider;
use crate::openai::OpenAiProvider;
use crate::traits::Provider;
use mp_catalog::Catalog;
use std::collections::HashMap;
use std::sync::Arc;

pub struct ProviderRegistry {
    providers: HashMap<String, Arc<dyn Provider>>,
}

impl ProviderRegistry {
    /// The native adapters: anthropic, openai, google.
    pub fn builtin() -> Self {
        let mut registry = Self {
            providers: HashMap::new(),
        };
        registry.register(Arc::new(AnthropicProvider));
        registry.register(Arc::new(OpenAiProvider::new()));
        registry.register(Arc::new(GoogleProvider));
        registry
    }

    /// Builtin adapters plus one OpenAI-compatible adapter per catalog
    /// provider that declares `compat = "openai"`.
    pub fn for_catalog(catalog: &Catalog) -> Self {
        let mut registry = Self::builtin();
        for id in catalog.provider_ids() {
            if registry.implemented(id) {
                continue;
            }
            let Some(info) = catalog.provider(id) else {
                continue;
            };
            if info.compat.as_deref() == Some("openai") {
                tracing::debug!(provider = %id, "registering OpenAI-compatible provider");
                registry.register(Arc::new(OpenAiProvider::compat(id)));
            }
        }
        registry
    }

    pub fn register(&mut self, provider: Arc<dyn Provider>) {
        self.providers.insert(provider.id().to_string(), provider);
    }

    pub fn get(&self, provider_id: &str) -> Option<Arc<dyn Provider>> {
        self.providers.get(provider_id).cloned()
    }

    /// True iff a provider implementation is registered under this id.
    pub fn implemented(&self, provider_id: &str) -> bool {
        self.providers.contains_key(provider_id)
    }

    pub fn provider_ids(&self) -> Vec<String> {
        let mut ids: Vec<String> = self.providers.keys().cloned().collect();
        ids.sort();
        ids
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builtins_present() {
        let registry = ProviderRegistry::builtin();
        for id in ["anthropic", "openai", "google"] {
            assert!(registry.implemented(id), "{id}");
        }
        assert!(!registry.implemented("groq"));
    }

    #[test]
    fn compat_providers_from_catalog() {
        let registry = ProviderRegistry::for_catalog(&Catalog::builtin());
        assert!(registry.implemented("groq"));
        assert_eq!(registry.get("groq").unwrap().id(), "groq");
    }

    #[test]
    fn unknown_provider_not_implemented() {
        let registry = ProviderRegistry::builtin();
        assert!(registry.get("nope").is_none());
    }
}
