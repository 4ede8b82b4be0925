//! OpenAI Responses API driver.
//!
//! Selected by the OpenAI provider shell when the resolved model carries
//! `api = "responses"`. System text travels as `instructions`, history as
//! typed `input` items, and function tools are flattened (no nested
//! `function` object). Deep-research models get a `web_search_preview`
//! tool auto-injected when the caller supplied no web-search tool; the
//! injection is surfaced via `provider_meta.auto_injected_tools`.

use crate::traits::{DecodedResponse, ProviderEvent, ProviderRequest};
use mp_domain::chunk::{MetaChunk, StreamChunk, StreamError, ToolCallChunkMeta};
use mp_domain::error::{Error, Result};
use mp_domain::message::{ContentPart, Message, Role};
use mp_domain::options::ToolChoice;
use mp_domain::response::FinishReason;
use mp_domain::tool::ToolCall;
use mp_domain::usage::Usage;
use serde_json::Value;

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Encoding
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

pub(crate) fn encode_body(request: &ProviderRequest<'_>) -> Result<Value> {
    let opts = request.options;
    let reasoning = request.model.capabilities.reasoning;

    let mut input: Vec<Value> = Vec::new();
    for msg in request.context.without_system() {
        match msg.role {
            Role::User => input.push(user_item(msg)?),
            Role::Assistant => encode_assistant_items(msg, &mut input),
            Role::Tool => input.push(tool_output_item(msg)),
            Role::System => {}
        }
    }

    let mut body = serde_json::json!({
        "model": request.model.id,
        "input": input,
    });

    if let Some(system) = request.context.system_text() {
        body["instructions"] = Value::String(system);
    }
    if request.stream {
        body["stream"] = Value::Bool(true);
    }
    if let Some(max) = opts.max_tokens {
        body["max_output_tokens"] = serde_json::json!(max);
    }
    if !reasoning {
        if let Some(temp) = opts.temperature {
            body["temperature"] = serde_json::json!(temp);
        }
        if let Some(top_p) = opts.top_p {
            body["top_p"] = serde_json::json!(top_p);
        }
    } else if let Some(effort) = opts
        .provider_option("reasoning_effort")
        .and_then(|v| v.as_str())
    {
        body["reasoning"] = serde_json::json!({"effort": effort});
    }
    // top_k, stop, seed, penalties: no Responses API equivalents; dropped.

    let mut tools: Vec<Value> = opts
        .tools
        .iter()
        .map(|t| {
            serde_json::json!({
                "type": "function",
                "name": t.name,
                "description": t.description,
                "parameters": t.schema.to_json_schema(),
            })
        })
        .collect();

    // Deep-research models refuse to run without a research tool.
    if request.model.category.as_deref() == Some("deep_research")
        && !opts.tools.iter().any(|t| t.name.contains("web_search"))
    {
        tools.push(serde_json::json!({"type": "web_search_preview"}));
    }

    if !tools.is_empty() {
        body["tools"] = Value::Array(tools);
        if let Some(choice) = &opts.tool_choice {
            body["tool_choice"] = match choice {
                ToolChoice::Auto => Value::String("auto".into()),
                ToolChoice::None => Value::String("none".into()),
                ToolChoice::Required => Value::String("required".into()),
                ToolChoice::Tool { name } => {
                    serde_json::json!({"type": "function", "name": name})
                }
            };
        }
    }

    crate::util::merge_provider_options(&mut body, &opts.provider_options);
    Ok(body)
}

fn user_item(msg: &Message) -> Result<Value> {
    let mut content: Vec<Value> = Vec::new();
    for part in &msg.content {
        match part {
            ContentPart::Text { text } => {
                content.push(serde_json::json!({"type": "input_text", "text": text}))
            }
            ContentPart::ImageUrl { url } => {
                content.push(serde_json::json!({"type": "input_image", "image_url": url}))
            }
            other => {
                return Err(Error::Validation(format!(
                    "openai responses input cannot carry {other:?}"
                )))
            }
        }
    }
    Ok(serde_json::json!({"role": "user", "content": content}))
}

/// Assistant history flattens into a message item plus one item per
/// function call.
fn encode_assistant_items(msg: &Message, input: &mut Vec<Value>) {
    let text = msg.extract_all_text();
    if !text.is_empty() {
        input.push(serde_json::json!({
            "role": "assistant",
            "content": [{"type": "output_text", "text": text}],
        }));
    }
    for call in &msg.tool_calls {
        input.push(serde_json::json!({
            "type": "function_call",
            "call_id": call.id,
            "name": call.name,
            "arguments": call.arguments_json,
        }));
    }
}

fn tool_output_item(msg: &Message) -> Value {
    let output = msg
        .content
        .iter()
        .find_map(|p| match p {
            ContentPart::ToolResult { output, .. } => {
                Some(crate::util::stringify_output(output))
            }
            _ => None,
        })
        .unwrap_or_default();
    serde_json::json!({
        "type": "function_call_output",
        "call_id": msg.tool_call_id.clone().unwrap_or_default(),
        "output": output,
    })
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Decoding
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

pub(crate) fn decode_response(raw: &Value) -> Result<DecodedResponse> {
    let output = raw
        .get("output")
        .and_then(|o| o.as_array())
        .ok_or_else(|| Error::Protocol("responses body has no output array".into()))?;

    let mut parts: Vec<ContentPart> = Vec::new();
    let mut tool_calls: Vec<ToolCall> = Vec::new();

    for item in output {
        match item.get("type").and_then(|t| t.as_str()).unwrap_or("") {
            "message" => {
                if let Some(content) = item.get("content").and_then(|c| c.as_array()) {
                    for piece in content {
                        if piece.get("type").and_then(|t| t.as_str()) == Some("output_text") {
                            if let Some(text) = piece.get("text").and_then(|t| t.as_str()) {
                                parts.push(ContentPart::text(text));
                            }
                        }
                    }
                }
            }
            "reasoning" => {
                if let Some(summary) = item.get("summary").and_then(|s| s.as_array()) {
                    for piece in summary {
                        if let Some(text) = piece.get("text").and_then(|t| t.as_str()) {
                            parts.push(ContentPart::thinking(text));
                        }
                    }
                }
            }
            "function_call" => {
                let id = item
                    .get("call_id")
                    .and_then(|v| v.as_str())
                    .map(String::from);
                let name = item
                    .get("name")
                    .and_then(|v| v.as_str())
                    .unwrap_or("")
                    .to_string();
                let arguments = item
                    .get("arguments")
                    .and_then(|v| v.as_str())
                    .unwrap_or("{}");
                let call = ToolCall::new(id, name, arguments);
                parts.push(ContentPart::ToolCall {
                    id: call.id.clone(),
                    name: call.name.clone(),
                    input: call.arguments().unwrap_or(Value::Object(Default::default())),
                });
                tool_calls.push(call);
            }
            _ => {}
        }
    }

    // Thinking precedes text in the canonical ordering.
    parts.sort_by_key(|p| match p {
        ContentPart::Thinking { .. } => 0,
        ContentPart::Text { .. } => 1,
        _ => 2,
    });

    let has_tool_calls = !tool_calls.is_empty();
    let mut message = Message::new(Role::Assistant, parts);
    message.tool_calls = tool_calls;

    let mut provider_meta = serde_json::Map::new();
    if let Some(injected) = auto_injected_tools(raw) {
        provider_meta.insert("auto_injected_tools".into(), injected);
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
        usage: raw.get("usage").map(Usage::normalize).unwrap_or_default(),
        finish_reason: map_status(raw, has_tool_calls),
        provider_meta,
    })
}

/// Vendor-managed tools (e.g. `web_search_preview`) the request ended up
/// carrying; surfaced so callers can observe auto-injection.
fn auto_injected_tools(raw: &Value) -> Option<Value> {
    let tools = raw.get("tools")?.as_array()?;
    let injected: Vec<Value> = tools
        .iter()
        .filter_map(|t| t.get("type").and_then(|v| v.as_str()))
        .filter(|t| *t != "function")
        .map(|t| Value::String(t.to_string()))
        .collect();
    (!injected.is_empty()).then_some(Value::Array(injected))
}

fn map_status(raw: &Value, has_tool_calls: bool) -> FinishReason {
    if has_tool_calls {
        return FinishReason::ToolCalls;
    }
    match raw.get("status").and_then(|s| s.as_str()) {
        Some("completed") | None => FinishReason::Stop,
        Some("incomplete") => {
            let reason = raw
                .get("incomplete_details")
                .and_then(|d| d.get("reason"))
                .and_then(|r| r.as_str());
            match reason {
                Some("max_output_tokens") => FinishReason::Length,
                Some("content_filter") => FinishReason::ContentFilter,
                _ => FinishReason::Other,
            }
        }
        Some("failed") => FinishReason::Error,
        Some(_) => FinishReason::Other,
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// SSE decoding
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

pub(crate) fn decode_sse_event(event: &ProviderEvent) -> Vec<StreamChunk> {
    let event_type = event
        .field("type")
        .and_then(|t| t.as_str())
        .unwrap_or_default();

    match event_type {
        "response.output_text.delta" => event
            .field("delta")
            .and_then(|d| d.as_str())
            .filter(|d| !d.is_empty())
            .map(|d| vec![StreamChunk::text(d)])
            .unwrap_or_default(),

        "response.reasoning_summary_text.delta" => event
            .field("delta")
            .and_then(|d| d.as_str())
            .filter(|d| !d.is_empty())
            .map(|d| vec![StreamChunk::thinking(d)])
            .unwrap_or_default(),

        "response.output_item.added" => {
            let index = event
                .field("output_index")
                .and_then(|i| i.as_u64())
                .unwrap_or(0) as u32;
            let Some(item) = event.field("item") else {
                return Vec::new();
            };
            if item.get("type").and_then(|t| t.as_str()) == Some("function_call") {
                let id = item
                    .get("call_id")
                    .and_then(|v| v.as_str())
                    .unwrap_or("")
                    .to_string();
                let name = item
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

        "response.function_call_arguments.delta" => {
            let index = event
                .field("output_index")
                .and_then(|i| i.as_u64())
                .unwrap_or(0) as u32;
            event
                .field("delta")
                .and_then(|d| d.as_str())
                .map(|d| vec![StreamChunk::tool_call_args(index, d)])
                .unwrap_or_default()
        }

        "response.completed" | "response.incomplete" => {
            let Some(response) = event.field("response") else {
                return vec![StreamChunk::Meta(MetaChunk {
                    terminal: true,
                    finish_reason: Some(FinishReason::Stop),
                    ..Default::default()
                })];
            };
            let has_tool_calls = response
                .get("output")
                .and_then(|o| o.as_array())
                .is_some_and(|items| {
                    items
                        .iter()
                        .any(|i| i.get("type").and_then(|t| t.as_str()) == Some("function_call"))
                });
            vec![StreamChunk::Meta(MetaChunk {
                terminal: true,
                finish_reason: Some(map_status(response, has_tool_calls)),
                usage: response.get("usage").map(Usage::normalize),
                model: response
                    .get("model")
                    .and_then(|m| m.as_str())
                    .map(String::from),
                ..Default::default()
            })]
        }

        "response.failed" | "error" => {
            let message = event
                .field("response")
                .and_then(|r| r.get("error"))
                .or_else(|| event.field("error"))
                .and_then(|e| e.get("message"))
                .and_then(|m| m.as_str())
                .unwrap_or("response failed")
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

        // created, in_progress, output_item.done, content_part.*: no
        // chunk-level signal.
        _ => Vec::new(),
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Tests
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
