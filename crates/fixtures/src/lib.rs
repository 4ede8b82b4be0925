//! Transcript recording and replay: the provider conformance harness.
//!
//! Transcripts are sanitized captures of single request/response
//! exchanges (secrets redacted at record time). Replaying one drives the
//! exact SSE/codec/decode path live traffic takes, deterministically.

mod redact;
mod replay;
mod transcript;

pub use redact::{is_sensitive, placeholder, redact_url, sanitize_headers, SENSITIVE_NAMES};
pub use replay::{
    conformance_models, response_from_transcript, stream_from_transcript,
    stream_response_from_transcript, transcript_model,
};
pub use transcript::{ResponseMeta, Transcript, TranscriptEvent, TranscriptRequest};
