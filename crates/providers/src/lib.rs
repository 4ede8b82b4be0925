//! Provider adapters and the request runtime for ModelPort: per-vendor
//! codecs (Anthropic, OpenAI Chat + Responses, Google Gemini), the HTTP
//! pipeline with retries and the HTTP/2 body guard, the SSE streaming
//! runtime with tool-call accumulation, and credential resolution.

pub mod anthropic;
pub mod credentials;
pub mod google;
pub mod http;
pub mod openai;
mod openai_responses;
pub mod registry;
pub mod sse;
pub mod stream;
pub mod traits;
pub(crate) mod util;

// Re-exports for convenience.
pub use http::{guard_http2_body, HttpConfig, Transport, UsageHook, HTTP2_BODY_LIMIT};
pub use registry::ProviderRegistry;
pub use stream::{stream_from_bytes, ChunkStream, StreamCollector, StreamResponse};
pub use traits::{AuthPlacement, DecodedResponse, Provider, ProviderEvent, ProviderRequest};
