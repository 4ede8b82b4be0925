//! Anthropic Messages API codec.
//!
//! System messages are lifted out of the context into the top-level
//! `system` field; tool results ride as `user` messages with `tool_result`
//! content blocks; `max_tokens` is mandatory and defaults to the model's
//! output limit.

use crate::traits::{
    AuthPlacement, DecodedResponse, Provider, ProviderEvent, ProviderRequest,
};
use base64::Engine as _;
use mp_catalog::Model;
use mp_domain::chunk::{MetaChunk, StreamChunk, StreamError, ToolCallChunkMeta};
use mp_domain::error::{Error, Result};
use mp_domain::message::{ContentPart, Message, Role};
use mp_domain::options::ToolChoice;
use mp_domain::response::FinishReason;
use mp_domain::tool::ToolCall;
use mp_domain::usage::Usage;
use serde_json::Value;

const ANTHROPIC_VERSION: &str = "2023-06-01";

/// Provider adapter for the Anthropic Messages API.
pub struct AnthropicProvider;

impl Provider for AnthropicProvider {
    fn id(&self) -> &str {
        "anthropic"
    }

    fn default_base_url(&self) -> &str {
        "https://api.anthropic.com"
    }

    fn path(&self, _model: &Model, _stream: bool) -> String {
        "/v1/messages".into()
    }

    fn auth(&self, _model: &Model, api_key: &str) -> AuthPlacement {
        AuthPlacement::Header {
            name: "x-api-key",
            value: api_key.to_string(),
        }
    }

    fn extra_headers(&self, _model: &Model) -> Vec<(&'static str, String)> {
        vec![("anthropic-version", ANTHROPIC_VERSION.to_string())]
    }

    fn encode_body(&self, request: &ProviderRequest<'_>) -> Result<Value> {
        encode_body(request)
    }

    fn decode_response(&self, raw: &Value, model: &Model) -> Result<DecodedResponse> {
        decode_response(raw, model)
    }

    fn decode_sse_event(&self, event: &ProviderEvent, _model: &Model) -> Vec<StreamChunk> {
        decode_sse_event(event)
    }

    fn embeddings_unsupported(&self) -> Error {
        Error::Validation(
            "anthropic does not provide an embeddings API; use an OpenAI-compatible \
             or Google provider for embeddings"
                .into(),
        )
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Encoding
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

fn encode_body(request: &ProviderRequest<'_>) -> Result<Value> {
    let opts = request.options;
    let mut api_messages: Vec<Value> = Vec::new();

    for msg in request.context.without_system() {
        match msg.role {
            Role::User => api_messages.push(user_msg(msg)?),
            Role::Assistant => api_messages.push(assistant_msg(msg)),
            Role::Tool => api_messages.push(tool_result_msg(msg)),
            Role::System => {}
        }
    }

    let max_tokens = opts.max_tokens.unwrap_or(request.model.default_max_tokens());
    let mut body = serde_json::json!({
        "model": request.model.id,
        "messages": api_messages,
        "max_tokens": max_tokens,
    });

    if let Some(system) = request.context.system_text() {
        body["system"] = Value::String(system);
    }
    if request.stream {
        body["stream"] = Value::Bool(true);
    }

    if !opts.tools.is_empty() {
        let tools: Vec<Value> = opts
            .tools
            .iter()
            .map(|t| {
                serde_json::json!({
                    "name": t.name,
                    "description": t.description,
                    "input_schema": t.schema.to_json_schema(),
                })
            })
            .collect();
        body["tools"] = Value::Array(tools);
        if let Some(choice) = &opts.tool_choice {
            body["tool_choice"] = match choice {
                ToolChoice::Auto => serde_json::json!({"type": "auto"}),
                ToolChoice::None => serde_json::json!({"type": "none"}),
                ToolChoice::Required => serde_json::json!({"type": "any"}),
                ToolChoice::Tool { name } => {
                    serde_json::json!({"type": "tool", "name": name})
                }
            };
        }
    }

    if let Some(temp) = opts.temperature {
        body["temperature"] = serde_json::json!(temp);
    }
    if let Some(top_p) = opts.top_p {
        body["top_p"] = serde_json::json!(top_p);
    }
    if let Some(top_k) = opts.top_k {
        body["top_k"] = serde_json::json!(top_k);
    }
    if !opts.stop.is_empty() {
        body["stop_sequences"] = serde_json::json!(opts.stop);
    }
    // seed, frequency_penalty, presence_penalty, response_format: the
    // Messages API has no equivalents; dropped.

    crate::util::merge_provider_options(&mut body, &opts.provider_options);
    Ok(body)
}

fn user_msg(msg: &Message) -> Result<Value> {
    let mut content: Vec<Value> = Vec::new();
    for part in &msg.content {
        match part {
            ContentPart::Text { text } => {
                content.push(serde_json::json!({"type": "text", "text": text}))
            }
            ContentPart::ImageUrl { url } => content.push(serde_json::json!({
                "type": "image",
                "source": {"type": "url", "url": url}
            })),
            ContentPart::Image { data, media_type } => content.push(serde_json::json!({
                "type": "image",
                "source": {
                    "type": "base64",
                    "media_type": media_type,
                    "data": base64::engine::general_purpose::STANDARD.encode(data),
                }
            })),
            ContentPart::File {
                data, media_type, ..
            } => content.push(serde_json::json!({
                "type": "document",
                "source": {
                    "type": "base64",
                    "media_type": media_type,
                    "data": base64::engine::general_purpose::STANDARD.encode(data),
                }
            })),
            other => {
                return Err(Error::Validation(format!(
                    "anthropic user messages cannot carry {other:?}"
                )))
            }
        }
    }
    Ok(serde_json::json!({"role": "user", "content": content}))
}

fn assistant_msg(msg: &Message) -> Value {
    let mut content: Vec<Value> = Vec::new();
    for part in &msg.content {
        match part {
            ContentPart::Text { text } => {
                content.push(serde_json::json!({"type": "text", "text": text}))
            }
            ContentPart::ToolCall { id, name, input } => {
                content.push(serde_json::json!({
                    "type": "tool_use",
                    "id": id,
                    "name": name,
                    "input": input,
                }))
            }
            // Thinking blocks require the original signature to re-send;
            // prior-turn reasoning is dropped on re-encode.
            _ => {}
        }
    }
    for call in &msg.tool_calls {
        if !msg
            .content
            .iter()
            .any(|p| matches!(p, ContentPart::ToolCall { id, .. } if *id == call.id))
        {
            content.push(serde_json::json!({
                "type": "tool_use",
                "id": call.id,
                "name": call.name,
                "input": call.arguments().unwrap_or(Value::Object(Default::default())),
            }));
        }
    }
    serde_json::json!({"role": "assistant", "content": content})
}

fn tool_result_msg(msg: &Message) -> Value {
    // Tool results are user messages with tool_result content blocks.
    let content: Vec<Value> = msg
        .content
        .iter()
        .filter_map(|p| match p {
            ContentPart::ToolResult {
                tool_call_id,
                output,
                ..
            } => Some(serde_json::json!({
                "type": "tool_result",
                "tool_use_id": tool_call_id,
                "content": crate::util::stringify_output(output),
            })),
            _ => None,
        })
        .collect();
    serde_json::json!({"role": "user", "content": content})
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Non-streaming decoding
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

fn decode_response(raw: &Value, _model: &Model) -> Result<DecodedResponse> {
    let blocks = raw
        .get("content")
        .and_then(|c| c.as_array())
        .ok_or_else(|| Error::Protocol("anthropic response has no content array".into()))?;

    let mut parts: Vec<ContentPart> = Vec::new();
    let mut tool_calls: Vec<ToolCall> = Vec::new();

    for block in blocks {
        match block.get("type").and_then(|t| t.as_str()).unwrap_or("") {
            "text" => {
                if let Some(text) = block.get("text").and_then(|t| t.as_str()) {
                    parts.push(ContentPart::text(text));
                }
            }
            "thinking" => {
                if let Some(text) = block.get("thinking").and_then(|t| t.as_str()) {
                    parts.push(ContentPart::thinking(text));
                }
            }
            "tool_use" => {
                let id = block
                    .get("id")
                    .and_then(|v| v.as_str())
                    .unwrap_or("")
                    .to_string();
                let name = block
                    .get("name")
                    .and_then(|v| v.as_str())
                    .unwrap_or("")
                    .to_string();
                let input = block
                    .get("input")
                    .cloned()
                    .unwrap_or(Value::Object(Default::default()));
                parts.push(ContentPart::ToolCall {
                    id: id.clone(),
                    name: name.clone(),
                    input: input.clone(),
                });
                tool_calls.push(ToolCall::new(Some(id), name, input.to_string()));
            }
            _ => {}
        }
    }

    let mut message = Message::new(Role::Assistant, parts);
    message.tool_calls = tool_calls;

    let stop_reason = raw.get("stop_reason").and_then(|v| v.as_str());
    let mut provider_meta = serde_json::Map::new();
    if let Some(reason) = stop_reason {
        provider_meta.insert("stop_reason".into(), Value::String(reason.to_string()));
    }

    Ok(DecodedResponse {
        id: raw
            .get("id")
            .and_then(|v| v.as_str())
            .unwrap_or("")
            .to_string(),
        model: raw
            .get("model")
            .and_then(|v| v.as_str())
            .map(String::from),
        message,
        usage: decode_usage(raw.get("usage")),
        finish_reason: map_stop_reason(stop_reason),
        provider_meta,
    })
}

fn decode_usage(raw: Option<&Value>) -> Usage {
    let Some(raw) = raw else {
        return Usage::default();
    };
    let mut usage = Usage::normalize(raw);
    // Cache reads live under a vendor-specific key.
    if let Some(cached) = raw.get("cache_read_input_tokens").and_then(|v| v.as_u64()) {
        usage.cached_tokens = usage.cached_tokens.max(cached as u32);
    }
    usage
}

fn map_stop_reason(reason: Option<&str>) -> FinishReason {
    match reason {
        Some("end_turn") | Some("stop_sequence") => FinishReason::Stop,
        Some("max_tokens") => FinishReason::Length,
        Some("tool_use") => FinishReason::ToolCalls,
        Some("refusal") => FinishReason::ContentFilter,
        Some(_) => FinishReason::Other,
        None => FinishReason::Stop,
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// SSE decoding
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

fn decode_sse_event(event: &ProviderEvent) -> Vec<StreamChunk> {
    let event_type = event
        .field("type")
        .and_then(|t| t.as_str())
        .unwrap_or_default();

    match event_type {
        "message_start" => {
            let Some(message) = event.field("message") else {
                return Vec::new();
            };
            vec![StreamChunk::Meta(MetaChunk {
                usage: message.get("usage").map(|u| decode_usage(Some(u))),
                model: message
                    .get("model")
                    .and_then(|m| m.as_str())
                    .map(String::from),
                ..Default::default()
            })]
        }

        "content_block_start" => {
            let index = event.field("index").and_then(|i| i.as_u64()).unwrap_or(0) as u32;
            let Some(block) = event.field("content_block") else {
                return Vec::new();
            };
            if block.get("type").and_then(|t| t.as_str()) == Some("tool_use") {
                let id = block
                    .get("id")
                    .and_then(|v| v.as_str())
                    .unwrap_or("")
                    .to_string();
                let name = block
                    .get("name")
                    .and_then(|v| v.as_str())
                    .unwrap_or("")
                    .to_string();
                return vec![StreamChunk::ToolCall {
                    name,
                    arguments: Value::Object(Default::default()),
                    meta: ToolCallChunkMeta {
                        id,
                        index: Some(index),
                    },
                }];
            }
            Vec::new()
        }

        "content_block_delta" => {
            let index = event.field("index").and_then(|i| i.as_u64()).unwrap_or(0) as u32;
            let Some(delta) = event.field("delta") else {
                return Vec::new();
            };
            match delta.get("type").and_then(|t| t.as_str()).unwrap_or("") {
                "text_delta" => delta
                    .get("text")
                    .and_then(|t| t.as_str())
                    .filter(|t| !t.is_empty())
                    .map(|t| vec![StreamChunk::text(t)])
                    .unwrap_or_default(),
                "thinking_delta" => delta
                    .get("thinking")
                    .and_then(|t| t.as_str())
                    .filter(|t| !t.is_empty())
                    .map(|t| vec![StreamChunk::thinking(t)])
                    .unwrap_or_default(),
                "input_json_delta" => delta
                    .get("partial_json")
                    .and_then(|p| p.as_str())
                    .map(|p| vec![StreamChunk::tool_call_args(index, p)])
                    .unwrap_or_default(),
                _ => Vec::new(),
            }
        }

        "message_delta" => {
            let finish_reason = event
                .field("delta")
                .and_then(|d| d.get("stop_reason"))
                .and_then(|v| v.as_str())
                .map(|s| map_stop_reason(Some(s)));
            let usage = event.field("usage").map(|u| decode_usage(Some(u)));
            if finish_reason.is_none() && usage.is_none() {
                return Vec::new();
            }
            vec![StreamChunk::Meta(MetaChunk {
                finish_reason,
                usage,
                ..Default::default()
            })]
        }

        "message_stop" => vec![StreamChunk::Meta(MetaChunk {
            terminal: true,
            ..Default::default()
        })],

        "error" => {
            let message = event
                .field("error")
                .and_then(|e| e.get("message"))
                .and_then(|m| m.as_str())
                .unwrap_or("unknown error")
                .to_string();
            vec![
                StreamChunk::Meta(MetaChunk {
                    error: Some(StreamError {
                        reason: "api_error".into(),
                        message: Some(message),
                        index: None,
                        id: None,
                    }),
                    ..Default::default()
                }),
                StreamChunk::Meta(MetaChunk {
                    terminal: true,
                    finish_reason: Some(FinishReason::Error),
                    ..Default::default()
                }),
            ]
        }

        // ping, content_block_stop, unknown: nothing to emit.
        _ => Vec::new(),
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Tests
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
