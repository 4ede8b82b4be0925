//! Deterministic transcript replay.
//!
//! Replay drives the same SSE framing, codec, and decode paths as live
//! traffic, so provider conformance is tested without a network. Replayed
//! streams are restartable: every call spins up a fresh stream from the
//! recorded chunks.

use crate::transcript::Transcript;
use mp_catalog::{Catalog, Model, ModelSpec};
use mp_domain::context::Context;
use mp_domain::error::{Error, Result};
use mp_domain::response::Response;
use mp_providers::stream::{stream_from_bytes, ChunkStream, StreamResponse};
use mp_providers::traits::Provider;
use std::sync::Arc;

/// Resolve the model a transcript was recorded against.
pub fn transcript_model(transcript: &Transcript, catalog: &Catalog) -> Result<Model> {
    catalog.resolve(&ModelSpec::parse(&transcript.model_spec)?)
}

/// Build a live chunk stream from a streaming transcript's data events.
pub fn stream_from_transcript(
    transcript: &Transcript,
    provider: Arc<dyn Provider>,
    model: Model,
) -> ChunkStream {
    stream_from_bytes(provider, model, transcript.data_chunks())
}

/// Build a full [`StreamResponse`] from a streaming transcript, as
/// `stream_text` would return it (empty base context).
pub fn stream_response_from_transcript(
    transcript: &Transcript,
    provider: Arc<dyn Provider>,
    model: Model,
) -> StreamResponse {
    let stream = stream_from_transcript(transcript, provider, model.clone());
    StreamResponse::new(model, Context::default(), stream)
}

/// Run a non-streaming transcript through the decode path, producing the
/// same [`Response`] a live call would (usage priced from the model).
pub fn response_from_transcript(
    transcript: &Transcript,
    provider: &dyn Provider,
    model: &Model,
) -> Result<Response> {
    let status = transcript.response_meta.status;
    let body = transcript.body();
    if !(200..300).contains(&status) {
        return Err(Error::api_request(
            status,
            Some(transcript.request.canonical_json.to_string()),
            Some(body),
        ));
    }
    let raw: serde_json::Value = serde_json::from_str(&body)
        .map_err(|e| Error::Protocol(format!("transcript body is not valid JSON: {e}")))?;
    let decoded = provider.decode_response(&raw, model)?;
    let message = decoded.message;
    let context = Context::default().append(message.clone());
    Ok(Response {
        id: decoded.id,
        model: decoded.model.unwrap_or_else(|| model.id.clone()),
        context,
        message: Some(message),
        usage: decoded.usage.priced(model.cost.as_ref()),
        finish_reason: decoded.finish_reason,
        provider_meta: decoded.provider_meta,
    })
}

/// Model ids to sweep for a provider, honoring the catalog's local
/// exclusion lists (the only place exclusions are consumed).
pub fn conformance_models(catalog: &Catalog, provider_id: &str) -> Vec<String> {
    let excluded = catalog.exclusions(provider_id);
    catalog
        .model_ids(provider_id)
        .into_iter()
        .filter(|id| !excluded.iter().any(|e| e == id))
        .map(String::from)
        .collect()
}
