//! Structured object generation, layered on tool calling.
//!
//! The schema is wrapped in a synthetic tool which the model is forced to
//! call; the decoded arguments are validated and coerced against the
//! schema. The streaming variant consumes the runtime's accumulated
//! tool-call arguments and yields the final object once, after the
//! terminal chunk.

use mp_domain::chunk::StreamChunk;
use mp_domain::error::{Error, Result, SchemaViolation};
use mp_domain::options::{GenerateOptions, ToolChoice};
use mp_domain::response::Response;
use mp_domain::schema::Schema;
use mp_domain::tool::Tool;
use mp_providers::stream::StreamResponse;
use serde_json::Value;

/// Name of the synthetic tool used for structured output.
pub const STRUCTURED_OUTPUT_TOOL: &str = "structured_output";

/// Clone the caller's options, replacing tools with the synthetic schema
/// tool and forcing its selection.
pub(crate) fn object_options(schema: &Schema, base: &GenerateOptions) -> Result<GenerateOptions> {
    let tool = Tool::new(
        STRUCTURED_OUTPUT_TOOL,
        "Return data that conforms to the schema.",
        schema.clone(),
    )?;
    let mut options = base.clone();
    options.tools = vec![tool];
    options.tool_choice = Some(ToolChoice::Tool {
        name: STRUCTURED_OUTPUT_TOOL.into(),
    });
    Ok(options)
}

/// Locate the structured-output tool call in a response, parse its
/// arguments, and validate + coerce them against the schema.
pub(crate) fn extract_and_validate(response: &Response, schema: &Schema) -> Result<Value> {
    let call = response
        .tool_calls()
        .iter()
        .find(|c| c.name == STRUCTURED_OUTPUT_TOOL)
        .ok_or_else(|| {
            Error::SchemaValidation(vec![SchemaViolation::new(
                "$",
                "model returned no structured_output tool call",
            )])
        })?;
    let raw = call.arguments()?;
    schema.coerce(raw).map_err(Error::SchemaValidation)
}

/// The validated object generated by [`crate::Client::generate_object`].
pub fn object(response: &Response) -> Result<Value> {
    if let Some(value) = response.provider_meta.get(STRUCTURED_OUTPUT_TOOL) {
        return Ok(value.clone());
    }
    // Response did not pass through generate_object; fall back to the raw
    // tool call without coercion.
    response
        .tool_calls()
        .iter()
        .find(|c| c.name == STRUCTURED_OUTPUT_TOOL)
        .ok_or_else(|| {
            Error::SchemaValidation(vec![SchemaViolation::new(
                "$",
                "response carries no structured_output object",
            )])
        })?
        .arguments()
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Streaming objects
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// A lazy sequence of structured objects from a streaming generation.
///
/// The minimum conformant behavior is implemented: one object, emitted at
/// the first successful parse after the terminal chunk (the runtime's
/// accumulator guarantees the synthesized tool call precedes it).
pub struct ObjectStream {
    inner: StreamResponse,
    schema: Schema,
    latest: Option<Value>,
    yielded: bool,
    done: bool,
}

impl ObjectStream {
    /// Wrap an existing stream (live or replayed) whose forced tool is the
    /// structured-output tool.
    pub fn new(inner: StreamResponse, schema: Schema) -> Self {
        Self {
            inner,
            schema,
            latest: None,
            yielded: false,
            done: false,
        }
    }

    /// The next materialized object, or `None` when the stream is spent.
    pub async fn next_object(&mut self) -> Option<Result<Value>> {
        if self.yielded && self.done {
            return None;
        }
        while let Some(chunk) = self.inner.next_chunk().await {
            match chunk {
                StreamChunk::ToolCall {
                    name, arguments, ..
                } if name == STRUCTURED_OUTPUT_TOOL => {
                    self.latest = Some(arguments);
                }
                StreamChunk::Meta(meta) if meta.terminal => {
                    self.done = true;
                    break;
                }
                _ => {}
            }
        }
        self.done = true;
        if self.yielded {
            return None;
        }
        self.yielded = true;
        let raw = match self.latest.take() {
            Some(raw) => raw,
            None => {
                return Some(Err(Error::SchemaValidation(vec![SchemaViolation::new(
                    "$",
                    "stream ended without a structured_output tool call",
                )])))
            }
        };
        Some(self.schema.coerce(raw).map_err(Error::SchemaValidation))
    }

    /// Drain into a vector of validated objects.
    pub async fn collect_objects(mut self) -> Result<Vec<Value>> {
        let mut objects = Vec::new();
        while let Some(object) = self.next_object().await {
            objects.push(object?);
        }
        Ok(objects)
    }

    /// Adapt into a `futures_core::Stream` of validated objects.
    pub fn into_stream(mut self) -> impl futures_core::Stream<Item = Result<Value>> {
        async_stream::stream! {
            while let Some(object) = self.next_object().await {
                yield object;
            }
        }
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Tests
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
