//! The HTTP pipeline.
//!
//! Builds requests (URL, auth placement, body), enforces the HTTP/2 body
//! guard, dispatches with retries and deadline/cancellation, classifies
//! non-2xx responses, and attributes usage on the way out.

use crate::credentials::{mask_secrets, resolve_api_key};
use crate::stream::{spawn_stream, ByteSource, StreamJob, StreamResponse};
use crate::traits::{AuthPlacement, Provider, ProviderRequest};
use mp_catalog::{Model, ProviderInfo};
use mp_domain::context::Context;
use mp_domain::error::{Error, HttpProtocol, Result};
use mp_domain::options::{EmbedOptions, GenerateOptions};
use mp_domain::response::{EmbedResponse, Response};
use mp_domain::usage::Usage;
use rand::Rng;
use serde_json::Value;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

/// Serialized request bodies above this size are refused on pools that may
/// negotiate HTTP/2.
pub const HTTP2_BODY_LIMIT: usize = 65_535;

/// Maximum automatic retries for retriable failures (4 attempts total).
const MAX_RETRIES: u32 = 3;

/// Base backoff delay; doubles per attempt with +/-20% jitter.
const RETRY_BASE_DELAY: Duration = Duration::from_millis(250);

/// Called with the resolved model and the priced usage after attribution.
pub type UsageHook = Arc<dyn Fn(&Model, &Usage) + Send + Sync>;

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Transport configuration
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[derive(Debug, Clone)]
pub struct HttpConfig {
    /// Protocols the connection pool may negotiate. Feeds the HTTP/2 body
    /// guard; an HTTP/1-only pool imposes no body-size limit.
    pub protocols: Vec<HttpProtocol>,
    pub connect_timeout: Duration,
    /// Default per-call deadline when the options set none.
    pub request_timeout: Duration,
}

impl Default for HttpConfig {
    fn default() -> Self {
        Self {
            protocols: vec![HttpProtocol::Http1, HttpProtocol::Http2],
            connect_timeout: Duration::from_secs(10),
            request_timeout: Duration::from_secs(120),
        }
    }
}

/// Refuse oversized bodies on HTTP/2-capable pools.
pub fn guard_http2_body(size: usize, protocols: &[HttpProtocol]) -> Result<()> {
    if size > HTTP2_BODY_LIMIT && protocols.contains(&HttpProtocol::Http2) {
        return Err(Error::Http2BodyTooLarge {
            size,
            protocols: protocols.to_vec(),
        });
    }
    Ok(())
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Transport
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// One shared connection pool plus the request pipeline. Cheap to clone.
#[derive(Clone)]
pub struct Transport {
    client: reqwest::Client,
    config: HttpConfig,
    usage_hook: Option<UsageHook>,
}

impl Transport {
    pub fn new(config: HttpConfig) -> Result<Self> {
        let mut builder = reqwest::Client::builder().connect_timeout(config.connect_timeout);
        if !config.protocols.contains(&HttpProtocol::Http2) {
            builder = builder.http1_only();
        }
        let client = builder
            .build()
            .map_err(|e| Error::Transport(e.to_string()))?;
        Ok(Self {
            client,
            config,
            usage_hook: None,
        })
    }

    pub fn with_usage_hook(mut self, hook: UsageHook) -> Self {
        self.usage_hook = Some(hook);
        self
    }

    pub fn config(&self) -> &HttpConfig {
        &self.config
    }

    // ── Non-streaming ──────────────────────────────────────────────

    /// Full generate pipeline: encode, authenticate, dispatch (with
    /// retries), decode, attribute usage.
    pub async fn generate(
        &self,
        provider: &Arc<dyn Provider>,
        info: &ProviderInfo,
        model: &Model,
        context: Context,
        options: &GenerateOptions,
    ) -> Result<Response> {
        options.validate()?;
        context.validate()?;
        if !options.tools.is_empty() && !model.capabilities.tool_call {
            return Err(Error::Validation(format!(
                "model {} does not support tool calls",
                model.spec()
            )));
        }

        let request = ProviderRequest {
            model,
            context: &context,
            options,
            stream: false,
        };
        let body = provider.encode_body(&request)?;
        let body_bytes = serde_json::to_vec(&body)?;
        guard_http2_body(body_bytes.len(), &self.config.protocols)?;

        let api_key = resolve_api_key(info, &options.provider_options)?;
        let url = self.request_url(provider, info, model, false, &api_key);
        let raw = self
            .dispatch_with_retries(
                provider,
                model,
                &url,
                &api_key,
                body_bytes,
                options.timeout,
                options.cancel.clone(),
            )
            .await?;

        let decoded = provider.decode_response(&raw, model)?;
        let usage = decoded.usage.priced(model.cost.as_ref());
        if let Some(hook) = &self.usage_hook {
            hook(model, &usage);
        }
        tracing::debug!(
            provider = %provider.id(),
            model = %model.id,
            input_tokens = usage.input_tokens,
            output_tokens = usage.output_tokens,
            "usage attributed"
        );

        let message = decoded.message;
        let context = context.append(message.clone());
        Ok(Response {
            id: decoded.id,
            model: decoded.model.unwrap_or_else(|| model.id.clone()),
            context,
            message: Some(message),
            usage,
            finish_reason: decoded.finish_reason,
            provider_meta: decoded.provider_meta,
        })
    }

    // ── Streaming ──────────────────────────────────────────────────

    /// Open a stream. No retries happen once the stream is dispatched: a
    /// partially consumed stream has observable side effects.
    pub async fn stream(
        &self,
        provider: &Arc<dyn Provider>,
        info: &ProviderInfo,
        model: &Model,
        context: Context,
        options: &GenerateOptions,
    ) -> Result<StreamResponse> {
        options.validate()?;
        context.validate()?;
        if !options.tools.is_empty() && !model.capabilities.tool_call {
            return Err(Error::Validation(format!(
                "model {} does not support tool calls",
                model.spec()
            )));
        }

        let request = ProviderRequest {
            model,
            context: &context,
            options,
            stream: true,
        };
        let body = provider.encode_body(&request)?;
        let body_bytes = serde_json::to_vec(&body)?;
        guard_http2_body(body_bytes.len(), &self.config.protocols)?;

        let api_key = resolve_api_key(info, &options.provider_options)?;
        let url = self.request_url(provider, info, model, true, &api_key);

        tracing::debug!(
            provider = %provider.id(),
            model = %model.id,
            url = %crate::google::redact_url_key(&url),
            "opening stream"
        );
        let cancel = options.cancel.clone().unwrap_or_default();
        let timeout = options.timeout.unwrap_or(self.config.request_timeout);
        let builder = self
            .build_post(provider, model, &url, &api_key)
            .body(body_bytes.clone());

        let response = send_guarded(builder, timeout, &cancel).await?;
        let status = response.status();
        if !status.is_success() {
            let response_body = response.text().await.ok();
            return Err(Error::api_request(
                status.as_u16(),
                String::from_utf8(body_bytes).ok(),
                response_body,
            ));
        }

        let stream = spawn_stream(
            StreamJob {
                source: ByteSource::Http(response),
                provider: Arc::clone(provider),
                model: model.clone(),
                usage_hook: self.usage_hook.clone(),
            },
            cancel,
        );
        Ok(StreamResponse::new(model.clone(), context, stream))
    }

    // ── Embeddings ─────────────────────────────────────────────────

    pub async fn embed(
        &self,
        provider: &Arc<dyn Provider>,
        info: &ProviderInfo,
        model: &Model,
        input: &[String],
        options: &EmbedOptions,
    ) -> Result<EmbedResponse> {
        if !model.capabilities.embedding {
            return Err(Error::Validation(format!(
                "model {} does not support embeddings",
                model.spec()
            )));
        }
        let Some(path) = provider.embed_path(model) else {
            return Err(provider.embeddings_unsupported());
        };

        let body = provider.encode_embed_body(model, input, options)?;
        let body_bytes = serde_json::to_vec(&body)?;
        guard_http2_body(body_bytes.len(), &self.config.protocols)?;

        let api_key = resolve_api_key(info, &options.provider_options)?;
        let url = apply_query_auth(
            &join_url(base_url(info, provider.as_ref()), &path),
            &provider.auth(model, &api_key),
        );
        let raw = self
            .dispatch_with_retries(
                provider,
                model,
                &url,
                &api_key,
                body_bytes,
                options.timeout,
                options.cancel.clone(),
            )
            .await?;

        let mut decoded = provider.decode_embed_response(&raw, model)?;
        decoded.usage = decoded.usage.priced(model.cost.as_ref());
        if let Some(hook) = &self.usage_hook {
            hook(model, &decoded.usage);
        }
        Ok(decoded)
    }

    // ── Internals ──────────────────────────────────────────────────

    fn request_url(
        &self,
        provider: &Arc<dyn Provider>,
        info: &ProviderInfo,
        model: &Model,
        stream: bool,
        api_key: &str,
    ) -> String {
        let path = provider.path(model, stream);
        let url = join_url(base_url(info, provider.as_ref()), &path);
        apply_query_auth(&url, &provider.auth(model, api_key))
    }

    fn build_post(
        &self,
        provider: &Arc<dyn Provider>,
        model: &Model,
        url: &str,
        api_key: &str,
    ) -> reqwest::RequestBuilder {
        let mut builder = self
            .client
            .post(url)
            .header("Content-Type", "application/json");
        if let AuthPlacement::Header { name, value } = provider.auth(model, api_key) {
            builder = builder.header(name, value);
        }
        for (name, value) in provider.extra_headers(model) {
            builder = builder.header(name, value);
        }
        builder
    }

    /// Dispatch with exponential backoff. Transport errors and retriable
    /// 5xx responses are retried up to [`MAX_RETRIES`] times; 4xx never.
    async fn dispatch_with_retries(
        &self,
        provider: &Arc<dyn Provider>,
        model: &Model,
        url: &str,
        api_key: &str,
        body_bytes: Vec<u8>,
        timeout: Option<Duration>,
        cancel: Option<CancellationToken>,
    ) -> Result<Value> {
        let cancel = cancel.unwrap_or_default();
        let timeout = timeout.unwrap_or(self.config.request_timeout);
        let mut attempt: u32 = 0;

        tracing::debug!(
            provider = %provider.id(),
            model = %model.id,
            url = %crate::google::redact_url_key(url),
            "dispatching request"
        );

        loop {
            let builder = self
                .build_post(provider, model, url, api_key)
                .body(body_bytes.clone());
            let result = self.send_once(builder, &body_bytes, timeout, &cancel).await;

            match result {
                Ok(value) => return Ok(value),
                Err(e) if e.is_retriable() && attempt < MAX_RETRIES => {
                    let delay = backoff_delay(attempt);
                    tracing::warn!(
                        provider = %provider.id(),
                        model = %model.id,
                        attempt = attempt + 1,
                        delay_ms = delay.as_millis() as u64,
                        error = %mask_secrets(&e.to_string()),
                        "retrying after retriable failure"
                    );
                    attempt += 1;
                    tokio::select! {
                        _ = cancel.cancelled() => return Err(Error::Cancelled),
                        _ = tokio::time::sleep(delay) => {}
                    }
                }
                Err(e) => return Err(e),
            }
        }
    }

    async fn send_once(
        &self,
        builder: reqwest::RequestBuilder,
        body_bytes: &[u8],
        timeout: Duration,
        cancel: &CancellationToken,
    ) -> Result<Value> {
        let response = send_guarded(builder, timeout, cancel).await?;
        let status = response.status();
        let text = response
            .text()
            .await
            .map_err(|e| Error::Transport(e.to_string()))?;

        if !status.is_success() {
            return Err(Error::api_request(
                status.as_u16(),
                String::from_utf8(body_bytes.to_vec()).ok(),
                Some(text),
            ));
        }
        serde_json::from_str(&text)
            .map_err(|e| Error::Protocol(format!("response is not valid JSON: {e}")))
    }
}

/// Send one request under the deadline and cancellation token. Cancellation
/// aborts at the transport level; partial responses are discarded.
async fn send_guarded(
    builder: reqwest::RequestBuilder,
    timeout: Duration,
    cancel: &CancellationToken,
) -> Result<reqwest::Response> {
    tokio::select! {
        _ = cancel.cancelled() => Err(Error::Cancelled),
        outcome = tokio::time::timeout(timeout, builder.send()) => match outcome {
            Err(_) => Err(Error::Timeout(format!(
                "request exceeded deadline of {}ms",
                timeout.as_millis()
            ))),
            Ok(Err(e)) if e.is_timeout() => Err(Error::Timeout(e.to_string())),
            Ok(Err(e)) => Err(Error::Transport(e.to_string())),
            Ok(Ok(response)) => Ok(response),
        },
    }
}

fn base_url<'a>(info: &'a ProviderInfo, provider: &'a dyn Provider) -> &'a str {
    if info.base_url.is_empty() {
        provider.default_base_url()
    } else {
        &info.base_url
    }
}

fn join_url(base: &str, path: &str) -> String {
    format!("{}{}", base.trim_end_matches('/'), path)
}

/// Append query-parameter auth to the URL; header auth is applied by the
/// request builder instead.
fn apply_query_auth(url: &str, auth: &AuthPlacement) -> String {
    match auth {
        AuthPlacement::Query { name, value } => {
            let sep = if url.contains('?') { '&' } else { '?' };
            format!("{url}{sep}{name}={value}")
        }
        AuthPlacement::Header { .. } => url.to_string(),
    }
}

/// 250ms * 2^attempt with +/-20% jitter.
fn backoff_delay(attempt: u32) -> Duration {
    let base = RETRY_BASE_DELAY.as_millis() as f64 * 2f64.powi(attempt as i32);
    let jitter = rand::rng().random_range(0.8..=1.2);
    Duration::from_millis((base * jitter) as u64)
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Tests
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
