//! OpenAI adapter: the Chat Completions codec plus the provider shell that
//! selects the Chat or Responses driver from the resolved model's `api`
//! attribute.
//!
//! The Chat codec also serves OpenAI-compatible endpoints (Groq, vLLM,
//! Together, ...) registered through [`OpenAiProvider::compat`].

use crate::openai_responses;
use crate::traits::{
    AuthPlacement, DecodedResponse, Provider, ProviderEvent, ProviderRequest,
};
use base64::Engine as _;
use mp_catalog::{ApiFlavor, Model};
use mp_domain::chunk::{MetaChunk, StreamChunk, ToolCallChunkMeta};
use mp_domain::error::{Error, Result};
use mp_domain::message::{ContentPart, Message, Role};
use mp_domain::options::{ResponseFormat, ToolChoice};
use mp_domain::response::{EmbedResponse, FinishReason};
use mp_domain::tool::ToolCall;
use mp_domain::usage::Usage;
use serde_json::Value;

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Provider shell
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// The OpenAI provider, or any OpenAI-compatible endpoint.
pub struct OpenAiProvider {
    id: String,
    /// Compat endpoints always speak the Chat Completions dialect.
    chat_only: bool,
}

impl OpenAiProvider {
    pub fn new() -> Self {
        Self {
            id: "openai".into(),
            chat_only: false,
        }
    }

    /// An OpenAI-compatible provider under a different id. The base URL
    /// comes from the catalog entry.
    pub fn compat(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            chat_only: true,
        }
    }

    fn flavor(&self, model: &Model) -> ApiFlavor {
        if self.chat_only {
            ApiFlavor::Chat
        } else {
            model.api
        }
    }
}

impl Default for OpenAiProvider {
    fn default() -> Self {
        Self::new()
    }
}

impl Provider for OpenAiProvider {
    fn id(&self) -> &str {
        &self.id
    }

    fn default_base_url(&self) -> &str {
        "https://api.openai.com/v1"
    }

    fn path(&self, model: &Model, _stream: bool) -> String {
        match self.flavor(model) {
            ApiFlavor::Chat => "/chat/completions".into(),
            ApiFlavor::Responses => "/responses".into(),
        }
    }

    fn auth(&self, _model: &Model, api_key: &str) -> AuthPlacement {
        AuthPlacement::bearer(api_key)
    }

    fn encode_body(&self, request: &ProviderRequest<'_>) -> Result<Value> {
        match self.flavor(request.model) {
            ApiFlavor::Chat => encode_chat_body(request),
            ApiFlavor::Responses => openai_responses::encode_body(request),
        }
    }

    fn decode_response(&self, raw: &Value, model: &Model) -> Result<DecodedResponse> {
        match self.flavor(model) {
            ApiFlavor::Chat => decode_chat_response(raw),
            ApiFlavor::Responses => openai_responses::decode_response(raw),
        }
    }

    fn decode_sse_event(&self, event: &ProviderEvent, model: &Model) -> Vec<StreamChunk> {
        match self.flavor(model) {
            ApiFlavor::Chat => decode_chat_sse(event),
            ApiFlavor::Responses => openai_responses::decode_sse_event(event),
        }
    }

    fn embed_path(&self, _model: &Model) -> Option<String> {
        Some("/embeddings".into())
    }

    fn encode_embed_body(
        &self,
        model: &Model,
        input: &[String],
        _options: &mp_domain::options::EmbedOptions,
    ) -> Result<Value> {
        Ok(serde_json::json!({
            "model": model.id,
            "input": input,
        }))
    }

    fn decode_embed_response(&self, raw: &Value, model: &Model) -> Result<EmbedResponse> {
        let data = raw
            .get("data")
            .and_then(|d| d.as_array())
            .ok_or_else(|| Error::Protocol("missing 'data' array in embeddings response".into()))?;
        let vectors: Vec<Vec<f32>> = data
            .iter()
            .filter_map(|item| {
                let embedding = item.get("embedding")?.as_array()?;
                Some(
                    embedding
                        .iter()
                        .filter_map(|v| v.as_f64().map(|f| f as f32))
                        .collect(),
                )
            })
            .collect();
        let usage = raw
            .get("usage")
            .map(Usage::normalize)
            .unwrap_or_default();
        Ok(EmbedResponse {
            model: raw
                .get("model")
                .and_then(|m| m.as_str())
                .unwrap_or(&model.id)
                .to_string(),
            vectors,
            usage,
        })
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Chat Completions encoding
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

fn encode_chat_body(request: &ProviderRequest<'_>) -> Result<Value> {
    let opts = request.options;
    let reasoning = request.model.capabilities.reasoning;

    let mut messages: Vec<Value> = Vec::new();
    for msg in request.context {
        let mut encoded = match msg.role {
            Role::System => serde_json::json!({
                "role": "system",
                "content": msg.extract_all_text(),
            }),
            Role::User => user_msg(msg)?,
            Role::Assistant => assistant_msg(msg),
            Role::Tool => tool_result_msg(msg),
        };
        if let Some(name) = &msg.name {
            encoded["name"] = Value::String(name.clone());
        }
        messages.push(encoded);
    }

    let mut body = serde_json::json!({
        "model": request.model.id,
        "messages": messages,
    });

    if request.stream {
        body["stream"] = Value::Bool(true);
        body["stream_options"] = serde_json::json!({"include_usage": true});
    }

    // Reasoning models take max_completion_tokens and reject the sampling
    // knobs; everything else keeps the classic fields.
    if let Some(max) = opts.max_tokens {
        if reasoning {
            body["max_completion_tokens"] = serde_json::json!(max);
        } else {
            body["max_tokens"] = serde_json::json!(max);
        }
    }
    if !reasoning {
        if let Some(temp) = opts.temperature {
            body["temperature"] = serde_json::json!(temp);
        }
        if let Some(top_p) = opts.top_p {
            body["top_p"] = serde_json::json!(top_p);
        }
    }
    if reasoning {
        if let Some(effort) = opts.provider_option("reasoning_effort").and_then(|v| v.as_str()) {
            body["reasoning_effort"] = Value::String(effort.to_string());
        }
    }
    // top_k has no Chat Completions equivalent; dropped.
    if !opts.stop.is_empty() {
        body["stop"] = serde_json::json!(opts.stop);
    }
    if let Some(seed) = opts.seed {
        body["seed"] = serde_json::json!(seed);
    }
    if let Some(fp) = opts.frequency_penalty {
        body["frequency_penalty"] = serde_json::json!(fp);
    }
    if let Some(pp) = opts.presence_penalty {
        body["presence_penalty"] = serde_json::json!(pp);
    }

    if !opts.tools.is_empty() {
        let tools: Vec<Value> = opts
            .tools
            .iter()
            .map(|t| {
                serde_json::json!({
                    "type": "function",
                    "function": {
                        "name": t.name,
                        "description": t.description,
                        "parameters": t.schema.to_json_schema(),
                    }
                })
            })
            .collect();
        body["tools"] = Value::Array(tools);
        if let Some(choice) = &opts.tool_choice {
            body["tool_choice"] = encode_tool_choice(choice);
        }
    }

    if let Some(format) = &opts.response_format {
        body["response_format"] = match format {
            ResponseFormat::Text => serde_json::json!({"type": "text"}),
            ResponseFormat::JsonObject => serde_json::json!({"type": "json_object"}),
            ResponseFormat::JsonSchema { name, schema } => serde_json::json!({
                "type": "json_schema",
                "json_schema": {"name": name, "schema": schema},
            }),
        };
    }

    crate::util::merge_provider_options(&mut body, &opts.provider_options);
    Ok(body)
}

pub(crate) fn encode_tool_choice(choice: &ToolChoice) -> Value {
    match choice {
        ToolChoice::Auto => Value::String("auto".into()),
        ToolChoice::None => Value::String("none".into()),
        ToolChoice::Required => Value::String("required".into()),
        ToolChoice::Tool { name } => serde_json::json!({
            "type": "function",
            "function": {"name": name},
        }),
    }
}

fn user_msg(msg: &Message) -> Result<Value> {
    let all_text = msg.content.iter().all(ContentPart::is_text);
    if all_text {
        return Ok(serde_json::json!({
            "role": "user",
            "content": msg.extract_all_text(),
        }));
    }
    let mut content: Vec<Value> = Vec::new();
    for part in &msg.content {
        match part {
            ContentPart::Text { text } => {
                content.push(serde_json::json!({"type": "text", "text": text}))
            }
            ContentPart::ImageUrl { url } => content.push(serde_json::json!({
                "type": "image_url",
                "image_url": {"url": url},
            })),
            ContentPart::Image { data, media_type } => {
                let encoded = base64::engine::general_purpose::STANDARD.encode(data);
                content.push(serde_json::json!({
                    "type": "image_url",
                    "image_url": {"url": format!("data:{media_type};base64,{encoded}")},
                }))
            }
            ContentPart::File {
                data,
                media_type,
                filename,
            } => {
                let encoded = base64::engine::general_purpose::STANDARD.encode(data);
                content.push(serde_json::json!({
                    "type": "file",
                    "file": {
                        "filename": filename,
                        "file_data": format!("data:{media_type};base64,{encoded}"),
                    }
                }))
            }
            other => {
                return Err(Error::Validation(format!(
                    "openai user messages cannot carry {other:?}"
                )))
            }
        }
    }
    Ok(serde_json::json!({"role": "user", "content": content}))
}

fn assistant_msg(msg: &Message) -> Value {
    let mut obj = serde_json::json!({"role": "assistant"});
    let text = msg.extract_all_text();
    obj["content"] = if text.is_empty() {
        Value::Null
    } else {
        Value::String(text)
    };

    let mut tool_calls: Vec<Value> = msg.tool_calls.iter().map(ToolCall::to_wire).collect();
    for (id, name, input) in msg.tool_call_parts() {
        if !msg.tool_calls.iter().any(|c| c.id == id) {
            tool_calls.push(
                ToolCall::new(Some(id.to_string()), name, input.to_string()).to_wire(),
            );
        }
    }
    if !tool_calls.is_empty() {
        obj["tool_calls"] = Value::Array(tool_calls);
    }
    obj
}

fn tool_result_msg(msg: &Message) -> Value {
    let content = msg
        .content
        .iter()
        .find_map(|p| match p {
            ContentPart::ToolResult { output, .. } => Some(match output {
                Value::String(s) => s.clone(),
                other => other.to_string(),
            }),
            _ => None,
        })
        .unwrap_or_default();
    serde_json::json!({
        "role": "tool",
        "tool_call_id": msg.tool_call_id.clone().unwrap_or_default(),
        "content": content,
    })
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Chat Completions decoding
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

fn decode_chat_response(raw: &Value) -> Result<DecodedResponse> {
    let choice = raw
        .get("choices")
        .and_then(|c| c.as_array())
        .and_then(|a| a.first())
        .ok_or_else(|| Error::Protocol("no choices in chat completion response".into()))?;
    let message = choice
        .get("message")
        .ok_or_else(|| Error::Protocol("no message in chat completion choice".into()))?;

    let mut parts: Vec<ContentPart> = Vec::new();
    if let Some(reasoning) = message.get("reasoning_content").and_then(|v| v.as_str()) {
        if !reasoning.is_empty() {
            parts.push(ContentPart::thinking(reasoning));
        }
    }
    if let Some(text) = message.get("content").and_then(|v| v.as_str()) {
        if !text.is_empty() {
            parts.push(ContentPart::text(text));
        }
    }

    let mut tool_calls: Vec<ToolCall> = Vec::new();
    if let Some(calls) = message.get("tool_calls").and_then(|v| v.as_array()) {
        for raw_call in calls {
            if let Some(call) = ToolCall::from_wire(raw_call) {
                parts.push(ContentPart::ToolCall {
                    id: call.id.clone(),
                    name: call.name.clone(),
                    input: call.arguments().unwrap_or(Value::Object(Default::default())),
                });
                tool_calls.push(call);
            }
        }
    }

    let mut assistant = Message::new(Role::Assistant, parts);
    assistant.tool_calls = tool_calls;

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
        message: assistant,
        usage: raw.get("usage").map(Usage::normalize).unwrap_or_default(),
        finish_reason: map_finish_reason(
            choice.get("finish_reason").and_then(|v| v.as_str()),
        ),
        provider_meta: Default::default(),
    })
}

pub(crate) fn map_finish_reason(reason: Option<&str>) -> FinishReason {
    match reason {
        Some("stop") => FinishReason::Stop,
        Some("length") => FinishReason::Length,
        Some("tool_calls") | Some("function_call") => FinishReason::ToolCalls,
        Some("content_filter") => FinishReason::ContentFilter,
        Some(_) => FinishReason::Other,
        None => FinishReason::Stop,
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Chat Completions SSE decoding
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

fn decode_chat_sse(event: &ProviderEvent) -> Vec<StreamChunk> {
    // The [DONE] sentinel is handled by the runtime; raw payloads carry
    // nothing else for this dialect.
    let Some(object) = event.object() else {
        return Vec::new();
    };

    let choice = object
        .get("choices")
        .and_then(|c| c.as_array())
        .and_then(|a| a.first());

    // Usage-only chunk (stream_options.include_usage).
    let Some(choice) = choice else {
        if let Some(usage) = object.get("usage").filter(|u| !u.is_null()) {
            return vec![StreamChunk::Meta(MetaChunk {
                usage: Some(Usage::normalize(usage)),
                ..Default::default()
            })];
        }
        return Vec::new();
    };

    let mut chunks: Vec<StreamChunk> = Vec::new();
    let delta = choice.get("delta").unwrap_or(&Value::Null);

    if let Some(text) = delta.get("reasoning_content").and_then(|v| v.as_str()) {
        if !text.is_empty() {
            chunks.push(StreamChunk::thinking(text));
        }
    }
    if let Some(text) = delta.get("content").and_then(|v| v.as_str()) {
        if !text.is_empty() {
            chunks.push(StreamChunk::text(text));
        }
    }

    if let Some(calls) = delta.get("tool_calls").and_then(|v| v.as_array()) {
        for call in calls {
            let index = call.get("index").and_then(|i| i.as_u64()).unwrap_or(0) as u32;
            let function = call.get("function");
            let name = function
                .and_then(|f| f.get("name"))
                .and_then(|n| n.as_str());
            let id = call.get("id").and_then(|i| i.as_str());
            if id.is_some() || name.is_some() {
                chunks.push(StreamChunk::ToolCall {
                    name: name.unwrap_or("").to_string(),
                    arguments: Value::Object(Default::default()),
                    meta: ToolCallChunkMeta {
                        id: id.unwrap_or("").to_string(),
                        index: Some(index),
                    },
                });
            }
            if let Some(arguments) = function
                .and_then(|f| f.get("arguments"))
                .and_then(|a| a.as_str())
            {
                if !arguments.is_empty() {
                    chunks.push(StreamChunk::tool_call_args(index, arguments));
                }
            }
        }
    }

    if let Some(reason) = choice.get("finish_reason").and_then(|v| v.as_str()) {
        let mut meta = MetaChunk {
            finish_reason: Some(map_finish_reason(Some(reason))),
            ..Default::default()
        };
        if let Some(usage) = object.get("usage").filter(|u| !u.is_null()) {
            meta.usage = Some(Usage::normalize(usage));
        }
        chunks.push(StreamChunk::Meta(meta));
    }

    chunks
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Tests
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
