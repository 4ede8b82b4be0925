//! Google Gemini codec.
//!
//! Implements the `generateContent` / `streamGenerateContent` APIs. Auth is
//! an API key in the `key` query parameter; system text travels as
//! `systemInstruction`; sampling controls live under `generationConfig`.
//! Gemini delivers `functionCall` parts with complete arguments, so the
//! codec emits fully-formed tool-call chunks and lets the runtime seed its
//! accumulator from them.

use crate::traits::{
    AuthPlacement, DecodedResponse, Provider, ProviderEvent, ProviderRequest,
};
use base64::Engine as _;
use mp_catalog::Model;
use mp_domain::chunk::{MetaChunk, StreamChunk, ToolCallChunkMeta};
use mp_domain::error::{Error, Result};
use mp_domain::message::{ContentPart, Message, Role};
use mp_domain::options::{ResponseFormat, ToolChoice};
use mp_domain::response::{EmbedResponse, FinishReason};
use mp_domain::tool::{generate_call_id, ToolCall};
use mp_domain::usage::Usage;
use serde_json::Value;

/// Provider adapter for the Google Gemini API.
pub struct GoogleProvider;

impl Provider for GoogleProvider {
    fn id(&self) -> &str {
        "google"
    }

    fn default_base_url(&self) -> &str {
        "https://generativelanguage.googleapis.com"
    }

    fn path(&self, model: &Model, stream: bool) -> String {
        if stream {
            format!("/v1beta/models/{}:streamGenerateContent?alt=sse", model.id)
        } else {
            format!("/v1beta/models/{}:generateContent", model.id)
        }
    }

    fn auth(&self, _model: &Model, api_key: &str) -> AuthPlacement {
        AuthPlacement::Query {
            name: "key",
            value: api_key.to_string(),
        }
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

    fn embed_path(&self, model: &Model) -> Option<String> {
        Some(format!("/v1beta/models/{}:batchEmbedContents", model.id))
    }

    fn encode_embed_body(
        &self,
        model: &Model,
        input: &[String],
        _options: &mp_domain::options::EmbedOptions,
    ) -> Result<Value> {
        let requests: Vec<Value> = input
            .iter()
            .map(|text| {
                serde_json::json!({
                    "model": format!("models/{}", model.id),
                    "content": {"parts": [{"text": text}]}
                })
            })
            .collect();
        Ok(serde_json::json!({"requests": requests}))
    }

    fn decode_embed_response(&self, raw: &Value, model: &Model) -> Result<EmbedResponse> {
        let embeddings = raw
            .get("embeddings")
            .and_then(|e| e.as_array())
            .ok_or_else(|| {
                Error::Protocol("missing 'embeddings' array in response".into())
            })?;
        let vectors: Vec<Vec<f32>> = embeddings
            .iter()
            .filter_map(|item| {
                let values = item.get("values")?.as_array()?;
                Some(
                    values
                        .iter()
                        .filter_map(|v| v.as_f64().map(|f| f as f32))
                        .collect(),
                )
            })
            .collect();
        Ok(EmbedResponse {
            model: model.id.clone(),
            vectors,
            usage: Usage::default(),
        })
    }
}

/// Redact the API key from a URL for safe logging.
pub fn redact_url_key(url: &str) -> String {
    if let Some(idx) = url.find("key=") {
        let prefix = &url[..idx + 4];
        let rest = &url[idx + 4..];
        let end = rest.find('&').unwrap_or(rest.len());
        format!("{prefix}[REDACTED]{}", &rest[end..])
    } else {
        url.to_string()
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Encoding
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

fn encode_body(request: &ProviderRequest<'_>) -> Result<Value> {
    let opts = request.options;
    let mut contents: Vec<Value> = Vec::new();

    for msg in request.context.without_system() {
        match msg.role {
            Role::User => contents.push(user_content(msg)?),
            Role::Assistant => contents.push(assistant_content(msg)),
            Role::Tool => contents.push(tool_result_content(msg)),
            Role::System => {}
        }
    }

    let mut body = serde_json::json!({"contents": contents});

    if let Some(system) = request.context.system_text() {
        body["systemInstruction"] = serde_json::json!({"parts": [{"text": system}]});
    }

    if !opts.tools.is_empty() {
        let declarations: Vec<Value> = opts
            .tools
            .iter()
            .map(|t| {
                serde_json::json!({
                    "name": t.name,
                    "description": t.description,
                    "parameters": t.schema.to_json_schema(),
                })
            })
            .collect();
        body["tools"] = serde_json::json!([{"functionDeclarations": declarations}]);
        if let Some(choice) = &opts.tool_choice {
            body["toolConfig"] = encode_tool_config(choice);
        }
    }

    let mut gen_config = serde_json::json!({});
    if let Some(temp) = opts.temperature {
        gen_config["temperature"] = serde_json::json!(temp);
    }
    if let Some(top_p) = opts.top_p {
        gen_config["topP"] = serde_json::json!(top_p);
    }
    if let Some(top_k) = opts.top_k {
        gen_config["topK"] = serde_json::json!(top_k);
    }
    if let Some(max) = opts.max_tokens {
        gen_config["maxOutputTokens"] = serde_json::json!(max);
    }
    if !opts.stop.is_empty() {
        gen_config["stopSequences"] = serde_json::json!(opts.stop);
    }
    if matches!(opts.response_format, Some(ResponseFormat::JsonObject)) {
        gen_config["responseMimeType"] = serde_json::json!("application/json");
    }
    // seed, frequency_penalty, presence_penalty: dropped.
    if gen_config.as_object().is_some_and(|o| !o.is_empty()) {
        body["generationConfig"] = gen_config;
    }

    crate::util::merge_provider_options(&mut body, &opts.provider_options);
    Ok(body)
}

fn encode_tool_config(choice: &ToolChoice) -> Value {
    match choice {
        ToolChoice::Auto => serde_json::json!({
            "functionCallingConfig": {"mode": "AUTO"}
        }),
        ToolChoice::None => serde_json::json!({
            "functionCallingConfig": {"mode": "NONE"}
        }),
        ToolChoice::Required => serde_json::json!({
            "functionCallingConfig": {"mode": "ANY"}
        }),
        ToolChoice::Tool { name } => serde_json::json!({
            "functionCallingConfig": {"mode": "ANY", "allowedFunctionNames": [name]}
        }),
    }
}

fn user_content(msg: &Message) -> Result<Value> {
    let mut parts: Vec<Value> = Vec::new();
    for part in &msg.content {
        match part {
            ContentPart::Text { text } => parts.push(serde_json::json!({"text": text})),
            ContentPart::Image { data, media_type } => parts.push(serde_json::json!({
                "inlineData": {
                    "mimeType": media_type,
                    "data": base64::engine::general_purpose::STANDARD.encode(data),
                }
            })),
            ContentPart::File {
                data, media_type, ..
            } => parts.push(serde_json::json!({
                "inlineData": {
                    "mimeType": media_type,
                    "data": base64::engine::general_purpose::STANDARD.encode(data),
                }
            })),
            ContentPart::ImageUrl { url } => parts.push(serde_json::json!({
                "fileData": {"fileUri": url}
            })),
            other => {
                return Err(Error::Validation(format!(
                    "gemini user messages cannot carry {other:?}"
                )))
            }
        }
    }
    Ok(serde_json::json!({"role": "user", "parts": parts}))
}

fn assistant_content(msg: &Message) -> Value {
    let mut parts: Vec<Value> = Vec::new();
    for part in &msg.content {
        match part {
            ContentPart::Text { text } => parts.push(serde_json::json!({"text": text})),
            ContentPart::ToolCall { name, input, .. } => {
                parts.push(serde_json::json!({
                    "functionCall": {"name": name, "args": input}
                }))
            }
            _ => {}
        }
    }
    for call in &msg.tool_calls {
        let already = msg
            .tool_call_parts()
            .any(|(_, name, _)| name == call.name);
        if !already {
            parts.push(serde_json::json!({
                "functionCall": {
                    "name": call.name,
                    "args": call.arguments().unwrap_or(Value::Object(Default::default())),
                }
            }));
        }
    }
    serde_json::json!({"role": "model", "parts": parts})
}

fn tool_result_content(msg: &Message) -> Value {
    let mut parts: Vec<Value> = Vec::new();
    for part in &msg.content {
        if let ContentPart::ToolResult {
            tool_name, output, ..
        } = part
        {
            // Gemini keys responses by function name, not call id.
            parts.push(serde_json::json!({
                "functionResponse": {
                    "name": tool_name,
                    "response": {"content": output},
                }
            }));
        }
    }
    serde_json::json!({"role": "user", "parts": parts})
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Decoding
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

fn decode_response(raw: &Value, model: &Model) -> Result<DecodedResponse> {
    let candidate = raw
        .get("candidates")
        .and_then(|c| c.as_array())
        .and_then(|a| a.first())
        .ok_or_else(|| Error::Protocol("no candidates in gemini response".into()))?;

    let mut parts: Vec<ContentPart> = Vec::new();
    let mut tool_calls: Vec<ToolCall> = Vec::new();

    if let Some(raw_parts) = candidate
        .get("content")
        .and_then(|c| c.get("parts"))
        .and_then(|p| p.as_array())
    {
        for part in raw_parts {
            if let Some(text) = part.get("text").and_then(|v| v.as_str()) {
                if part.get("thought").and_then(|t| t.as_bool()).unwrap_or(false) {
                    parts.push(ContentPart::thinking(text));
                } else {
                    parts.push(ContentPart::text(text));
                }
            }
            if let Some(call) = part.get("functionCall") {
                let name = call
                    .get("name")
                    .and_then(|v| v.as_str())
                    .unwrap_or("")
                    .to_string();
                let args = call
                    .get("args")
                    .cloned()
                    .unwrap_or(Value::Object(Default::default()));
                let id = generate_call_id();
                parts.push(ContentPart::ToolCall {
                    id: id.clone(),
                    name: name.clone(),
                    input: args.clone(),
                });
                tool_calls.push(ToolCall::new(Some(id), name, args.to_string()));
            }
        }
    }

    let has_tool_calls = !tool_calls.is_empty();
    let mut message = Message::new(Role::Assistant, parts);
    message.tool_calls = tool_calls;

    Ok(DecodedResponse {
        id: raw
            .get("responseId")
            .and_then(|v| v.as_str())
            .unwrap_or("")
            .to_string(),
        model: raw
            .get("modelVersion")
            .and_then(|v| v.as_str())
            .map(String::from)
            .or_else(|| Some(model.id.clone())),
        message,
        usage: decode_usage(raw.get("usageMetadata")),
        finish_reason: map_finish_reason(
            candidate.get("finishReason").and_then(|v| v.as_str()),
            has_tool_calls,
        ),
        provider_meta: Default::default(),
    })
}

/// Gemini's usage keys are vendor-specific camelCase; normalize by hand.
fn decode_usage(raw: Option<&Value>) -> Usage {
    let Some(raw) = raw else {
        return Usage::default();
    };
    let count = |key: &str| raw.get(key).and_then(|v| v.as_u64()).unwrap_or(0) as u32;
    let mut usage = Usage::new(count("promptTokenCount"), count("candidatesTokenCount"));
    usage.reasoning_tokens = count("thoughtsTokenCount");
    usage.cached_tokens = count("cachedContentTokenCount");
    usage
}

fn map_finish_reason(reason: Option<&str>, has_tool_calls: bool) -> FinishReason {
    if has_tool_calls {
        return FinishReason::ToolCalls;
    }
    match reason {
        Some("STOP") | None => FinishReason::Stop,
        Some("MAX_TOKENS") => FinishReason::Length,
        Some("SAFETY") | Some("PROHIBITED_CONTENT") | Some("BLOCKLIST") => {
            FinishReason::ContentFilter
        }
        Some(_) => FinishReason::Other,
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// SSE decoding
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// Streaming chunks mirror the response shape. Function calls arrive with
/// complete arguments, so a single fully-formed tool-call chunk is emitted
/// per call; the terminal meta comes from the runtime at end of body.
fn decode_sse_event(event: &ProviderEvent) -> Vec<StreamChunk> {
    let Some(object) = event.object() else {
        return Vec::new();
    };
    let mut chunks: Vec<StreamChunk> = Vec::new();

    let candidate = object
        .get("candidates")
        .and_then(|c| c.as_array())
        .and_then(|a| a.first());

    if let Some(candidate) = candidate {
        if let Some(parts) = candidate
            .get("content")
            .and_then(|c| c.get("parts"))
            .and_then(|p| p.as_array())
        {
            for part in parts {
                if let Some(text) = part.get("text").and_then(|v| v.as_str()) {
                    if text.is_empty() {
                        continue;
                    }
                    if part.get("thought").and_then(|t| t.as_bool()).unwrap_or(false) {
                        chunks.push(StreamChunk::thinking(text));
                    } else {
                        chunks.push(StreamChunk::text(text));
                    }
                }
                if let Some(call) = part.get("functionCall") {
                    let name = call
                        .get("name")
                        .and_then(|v| v.as_str())
                        .unwrap_or("")
                        .to_string();
                    let args = call
                        .get("args")
                        .cloned()
                        .unwrap_or(Value::Object(Default::default()));
                    chunks.push(StreamChunk::ToolCall {
                        name,
                        arguments: args,
                        meta: ToolCallChunkMeta {
                            id: generate_call_id(),
                            index: None,
                        },
                    });
                }
            }
        }

        if let Some(reason) = candidate.get("finishReason").and_then(|v| v.as_str()) {
            let has_tool_calls = chunks
                .iter()
                .any(|c| matches!(c, StreamChunk::ToolCall { .. }));
            chunks.push(StreamChunk::Meta(MetaChunk {
                finish_reason: Some(map_finish_reason(Some(reason), has_tool_calls)),
                usage: object
                    .get("usageMetadata")
                    .map(|u| decode_usage(Some(u))),
                ..Default::default()
            }));
        }
    }

    chunks
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Tests
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[cfg(test)]
mod tests {
    use super::*;
    use mp_domain::context::Context;
    use mp_domain::options::GenerateOptions;
    use mp_domain::schema::{Field, FieldType, Schema};
    use mp_domain::tool::Tool;
    use serde_json::json;

    fn model() -> Model {
        mp_catalog::Catalog::builtin()
            .resolve_spec("google:gemini-2.0-flash")
            .unwrap()
    }

    fn encode(ctx: &Context, opts: &GenerateOptions) -> Value {
        let model = model();
        encode_body(&ProviderRequest {
            model: &model,
            context: ctx,
            options: opts,
            stream: false,
        })
        .unwrap()
    }

    #[test]
    fn paths_differ_for_streaming() {
        let provider = GoogleProvider;
        let m = model();
        assert_eq!(
            provider.path(&m, false),
            "/v1beta/models/gemini-2.0-flash:generateContent"
        );
        assert_eq!(
            provider.path(&m, true),
            "/v1beta/models/gemini-2.0-flash:streamGenerateContent?alt=sse"
        );
    }

    #[test]
    fn auth_is_query_param() {
        let provider = GoogleProvider;
        assert_eq!(
            provider.auth(&model(), "sk-g"),
            AuthPlacement::Query {
                name: "key",
                value: "sk-g".into()
            }
        );
    }

    #[test]
    fn system_instruction_and_generation_config() {
        let ctx = Context::new(vec![
            mp_domain::message::Message::system("short answers"),
            mp_domain::message::Message::user("hi"),
        ]);
        let opts = GenerateOptions {
            temperature: Some(0.5),
            top_k: Some(40),
            max_tokens: Some(100),
            stop: vec!["END".into()],
            ..Default::default()
        };
        let body = encode(&ctx, &opts);
        assert_eq!(body["systemInstruction"]["parts"][0]["text"], "short answers");
        assert_eq!(body["generationConfig"]["temperature"], 0.5);
        assert_eq!(body["generationConfig"]["topK"], 40);
        assert_eq!(body["generationConfig"]["maxOutputTokens"], 100);
        assert_eq!(body["generationConfig"]["stopSequences"], json!(["END"]));
    }

    #[test]
    fn forced_tool_uses_allowed_function_names() {
        let schema = Schema::new().field(Field::new("location", FieldType::String).required());
        let opts = GenerateOptions {
            tools: vec![Tool::new("get_weather", "weather", schema).unwrap()],
            tool_choice: Some(ToolChoice::Tool {
                name: "get_weather".into(),
            }),
            ..Default::default()
        };
        let ctx = Context::new(vec![mp_domain::message::Message::user("Paris?")]);
        let body = encode(&ctx, &opts);
        assert_eq!(
            body["tools"][0]["functionDeclarations"][0]["name"],
            "get_weather"
        );
        assert_eq!(
            body["toolConfig"]["functionCallingConfig"]["mode"],
            "ANY"
        );
        assert_eq!(
            body["toolConfig"]["functionCallingConfig"]["allowedFunctionNames"],
            json!(["get_weather"])
        );
    }

    #[test]
    fn tool_results_keyed_by_function_name() {
        let mut assistant = mp_domain::message::Message::assistant("checking");
        assistant.tool_calls = vec![ToolCall::new(Some("call_1".into()), "get_weather", "{}")];
        let ctx = Context::new(vec![
            mp_domain::message::Message::user("Paris?"),
            assistant,
            mp_domain::message::Message::tool_result("call_1", "get_weather", json!({"c": 21})),
        ]);
        let body = encode(&ctx, &GenerateOptions::default());
        let parts = body["contents"][2]["parts"].as_array().unwrap();
        assert_eq!(parts[0]["functionResponse"]["name"], "get_weather");
    }

    #[test]
    fn penalties_dropped() {
        let opts = GenerateOptions {
            frequency_penalty: Some(0.2),
            presence_penalty: Some(0.2),
            seed: Some(1),
            ..Default::default()
        };
        let ctx = Context::new(vec![mp_domain::message::Message::user("hi")]);
        let body = encode(&ctx, &opts);
        assert!(body.get("generationConfig").is_none());
    }

    #[test]
    fn decode_text_and_usage() {
        let raw = json!({
            "candidates": [{
                "content": {"role": "model", "parts": [{"text": "bonjour"}]},
                "finishReason": "STOP"
            }],
            "usageMetadata": {
                "promptTokenCount": 8,
                "candidatesTokenCount": 3,
                "totalTokenCount": 11,
                "thoughtsTokenCount": 2
            }
        });
        let decoded = decode_response(&raw, &model()).unwrap();
        assert_eq!(decoded.message.extract_all_text(), "bonjour");
        assert_eq!(decoded.usage.input_tokens, 8);
        assert_eq!(decoded.usage.output_tokens, 3);
        assert_eq!(decoded.usage.reasoning_tokens, 2);
        assert_eq!(decoded.finish_reason, FinishReason::Stop);
    }

    #[test]
    fn decode_function_call_generates_ids() {
        let raw = json!({
            "candidates": [{
                "content": {"role": "model", "parts": [
                    {"functionCall": {"name": "get_weather", "args": {"location": "Paris"}}}
                ]},
                "finishReason": "STOP"
            }]
        });
        let decoded = decode_response(&raw, &model()).unwrap();
        assert_eq!(decoded.finish_reason, FinishReason::ToolCalls);
        let call = &decoded.message.tool_calls[0];
        assert!(call.id.starts_with("call_"));
        assert_eq!(call.arguments().unwrap()["location"], "Paris");
    }

    #[test]
    fn decode_no_candidates_is_protocol_error() {
        assert!(matches!(
            decode_response(&json!({}), &model()),
            Err(Error::Protocol(_))
        ));
    }

    fn sse(data: Value) -> ProviderEvent {
        ProviderEvent::from_data(None, &data.to_string())
    }

    #[test]
    fn sse_text_chunks() {
        let chunks = decode_sse_event(&sse(json!({
            "candidates": [{"content": {"parts": [{"text": "bon"}]}}]
        })));
        assert_eq!(chunks, vec![StreamChunk::text("bon")]);
    }

    #[test]
    fn sse_complete_function_call() {
        let chunks = decode_sse_event(&sse(json!({
            "candidates": [{"content": {"parts": [
                {"functionCall": {"name": "get_weather", "args": {"location": "Paris"}}}
            ]}}]
        })));
        match &chunks[0] {
            StreamChunk::ToolCall { name, arguments, .. } => {
                assert_eq!(name, "get_weather");
                assert_eq!(arguments, &json!({"location": "Paris"}));
            }
            other => panic!("unexpected: {other:?}"),
        }
    }

    #[test]
    fn sse_finish_reason_with_usage() {
        let chunks = decode_sse_event(&sse(json!({
            "candidates": [{
                "content": {"parts": [{"text": "fin"}]},
                "finishReason": "MAX_TOKENS"
            }],
            "usageMetadata": {"promptTokenCount": 5, "candidatesTokenCount": 99}
        })));
        assert_eq!(chunks.len(), 2);
        match &chunks[1] {
            StreamChunk::Meta(meta) => {
                assert_eq!(meta.finish_reason, Some(FinishReason::Length));
                assert_eq!(meta.usage.as_ref().unwrap().output_tokens, 99);
                assert!(!meta.terminal);
            }
            other => panic!("unexpected: {other:?}"),
        }
    }

    #[test]
    fn redact_url_key_hides_secret() {
        let url = "https://g.test/v1beta/models/m:generateContent?key=sk-secret&alt=sse";
        let redacted = redact_url_key(url);
        assert!(!redacted.contains("sk-secret"));
        assert!(redacted.contains("key=[REDACTED]&alt=sse"));
    }

    #[test]
    fn embeddings_codec() {
        let provider = GoogleProvider;
        let m = mp_catalog::Catalog::builtin()
            .resolve_spec("google:text-embedding-004")
            .unwrap();
        let body = provider
            .encode_embed_body(&m, &["hello".into(), "world".into()], &Default::default())
            .unwrap();
        assert_eq!(body["requests"].as_array().unwrap().len(), 2);
        assert_eq!(body["requests"][0]["model"], "models/text-embedding-004");

        let raw = json!({"embeddings": [
            {"values": [0.1, 0.2]},
            {"values": [0.3, 0.4]}
        ]});
        let decoded = provider.decode_embed_response(&raw, &m).unwrap();
        assert_eq!(decoded.vectors, vec![vec![0.1, 0.2], vec![0.3, 0.4]]);
    }
}
