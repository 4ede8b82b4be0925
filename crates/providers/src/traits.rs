//! The provider contract.
//!
//! A provider is a record of pure codec functions plus auth and endpoint
//! metadata. The HTTP pipeline and the streaming runtime drive every
//! provider through this one trait; instances are shared as
//! `Arc<dyn Provider>`.

use mp_catalog::Model;
use mp_domain::chunk::StreamChunk;
use mp_domain::context::Context;
use mp_domain::error::{Error, Result};
use mp_domain::message::Message;
use mp_domain::options::{EmbedOptions, GenerateOptions};
use mp_domain::response::{EmbedResponse, FinishReason};
use mp_domain::usage::Usage;
use serde_json::Value;

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Request / response intermediate types
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// Everything a codec needs to encode one request body.
#[derive(Debug, Clone, Copy)]
pub struct ProviderRequest<'a> {
    pub model: &'a Model,
    pub context: &'a Context,
    pub options: &'a GenerateOptions,
    pub stream: bool,
}

/// Where the API key is injected.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AuthPlacement {
    Header { name: &'static str, value: String },
    Query { name: &'static str, value: String },
}

impl AuthPlacement {
    pub fn bearer(api_key: &str) -> Self {
        AuthPlacement::Header {
            name: "Authorization",
            value: format!("Bearer {api_key}"),
        }
    }
}

/// The assistant turn decoded from a non-streaming response body. Usage is
/// normalized but not yet priced; the pipeline attributes cost.
#[derive(Debug, Clone)]
pub struct DecodedResponse {
    pub id: String,
    /// Model id echoed by the vendor, when present.
    pub model: Option<String>,
    pub message: Message,
    pub usage: Usage,
    pub finish_reason: FinishReason,
    pub provider_meta: serde_json::Map<String, Value>,
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// SSE event payloads
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// The `data` field of one SSE event, classified by the runtime before it
/// reaches the codec: JSON objects arrive decoded, everything else (the
/// `[DONE]` sentinel, non-object JSON) passes through as the raw string.
#[derive(Debug, Clone, PartialEq)]
pub enum EventPayload {
    Object(serde_json::Map<String, Value>),
    Raw(String),
}

/// One complete SSE event as handed to `decode_sse_event`.
#[derive(Debug, Clone, PartialEq)]
pub struct ProviderEvent {
    /// The SSE `event:` field, when the vendor sets one.
    pub name: Option<String>,
    pub payload: EventPayload,
}

impl ProviderEvent {
    pub fn from_data(name: Option<String>, data: &str) -> Self {
        let payload = match serde_json::from_str::<Value>(data) {
            Ok(Value::Object(map)) => EventPayload::Object(map),
            _ => EventPayload::Raw(data.to_string()),
        };
        Self { name, payload }
    }

    /// The decoded object payload, if the data was a JSON object.
    pub fn object(&self) -> Option<&serde_json::Map<String, Value>> {
        match &self.payload {
            EventPayload::Object(map) => Some(map),
            EventPayload::Raw(_) => None,
        }
    }

    /// A field of the object payload.
    pub fn field(&self, key: &str) -> Option<&Value> {
        self.object().and_then(|o| o.get(key))
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Provider trait
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// The codec + auth + endpoint contract every vendor adapter implements.
///
/// All codec methods are pure: encoding is deterministic for identical
/// inputs, and `decode_sse_event` holds no state across events (tool-call
/// fragments are accumulated by the streaming runtime, not here).
pub trait Provider: Send + Sync {
    fn id(&self) -> &str;

    /// Base URL used when the catalog does not override it.
    fn default_base_url(&self) -> &str;

    /// Endpoint path (may include a query string) for a generate call.
    fn path(&self, model: &Model, stream: bool) -> String;

    /// How the API key is injected into the request.
    fn auth(&self, model: &Model, api_key: &str) -> AuthPlacement;

    /// Static headers beyond auth and content-type (e.g. API versions).
    fn extra_headers(&self, _model: &Model) -> Vec<(&'static str, String)> {
        Vec::new()
    }

    /// Encode the context and options into the vendor request body.
    /// Options the vendor does not support are silently dropped here.
    fn encode_body(&self, request: &ProviderRequest<'_>) -> Result<Value>;

    /// Decode a 2xx non-streaming response body.
    fn decode_response(&self, raw: &Value, model: &Model) -> Result<DecodedResponse>;

    /// Decode one SSE event into zero or more chunks. Unrecognized events
    /// decode to an empty list; this never fails.
    fn decode_sse_event(&self, event: &ProviderEvent, model: &Model) -> Vec<StreamChunk>;

    // ── Embeddings (optional) ──────────────────────────────────────

    /// Endpoint path for embedding calls, `None` when unsupported.
    fn embed_path(&self, _model: &Model) -> Option<String> {
        None
    }

    fn encode_embed_body(
        &self,
        _model: &Model,
        _input: &[String],
        _options: &EmbedOptions,
    ) -> Result<Value> {
        Err(self.embeddings_unsupported())
    }

    fn decode_embed_response(&self, _raw: &Value, _model: &Model) -> Result<EmbedResponse> {
        Err(self.embeddings_unsupported())
    }

    /// The error returned by providers without an embeddings API.
    fn embeddings_unsupported(&self) -> Error {
        Error::Validation(format!(
            "provider {:?} does not offer an embeddings API",
            self.id()
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn object_payload_classification() {
        let ev = ProviderEvent::from_data(None, r#"{"type":"ping"}"#);
        assert!(ev.object().is_some());
        assert_eq!(ev.field("type"), Some(&Value::String("ping".into())));
    }

    #[test]
    fn non_object_json_stays_raw() {
        for data in ["[1,2,3]", "42", "\"text\"", "[DONE]", "not json"] {
            let ev = ProviderEvent::from_data(None, data);
            assert_eq!(ev.payload, EventPayload::Raw(data.to_string()), "{data}");
        }
    }

    #[test]
    fn bearer_header() {
        let auth = AuthPlacement::bearer("sk-test");
        assert_eq!(
            auth,
            AuthPlacement::Header {
                name: "Authorization",
                value: "Bearer sk-test".into()
            }
        );
    }
}
