//! The canonical response types returned by every provider.

use crate::context::Context;
use crate::message::Message;
use crate::tool::ToolCall;
use crate::usage::Usage;
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Why the model stopped generating. Vendor-specific values are normalized
/// into this closed set.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FinishReason {
    Stop,
    Length,
    ToolCalls,
    ContentFilter,
    Error,
    Other,
}

/// A completed (non-streaming) response.
///
/// `message` is the assistant message synthesized from the decoded content
/// parts; it is also appended to `context`, so `context` always holds the
/// full conversation including this turn.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Response {
    pub id: String,
    pub model: String,
    pub context: Context,
    pub message: Option<Message>,
    pub usage: Usage,
    pub finish_reason: FinishReason,
    #[serde(default, skip_serializing_if = "serde_json::Map::is_empty")]
    pub provider_meta: serde_json::Map<String, Value>,
}

impl Response {
    /// Joined text of the assistant message, if any.
    pub fn text(&self) -> Option<String> {
        self.message.as_ref().map(|m| m.extract_all_text())
    }

    /// Tool calls carried by the assistant message.
    pub fn tool_calls(&self) -> &[ToolCall] {
        self.message
            .as_ref()
            .map(|m| m.tool_calls.as_slice())
            .unwrap_or(&[])
    }
}

/// The result of an embedding call: one vector per input.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EmbedResponse {
    pub model: String,
    pub vectors: Vec<Vec<f32>>,
    pub usage: Usage,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn finish_reason_serde() {
        for (reason, s) in [
            (FinishReason::Stop, "\"stop\""),
            (FinishReason::ToolCalls, "\"tool_calls\""),
            (FinishReason::ContentFilter, "\"content_filter\""),
        ] {
            assert_eq!(serde_json::to_string(&reason).unwrap(), s);
            let back: FinishReason = serde_json::from_str(s).unwrap();
            assert_eq!(back, reason);
        }
    }

    #[test]
    fn text_joins_assistant_parts() {
        let resp = Response {
            id: "r1".into(),
            model: "m".into(),
            context: Context::default(),
            message: Some(Message::assistant("pong")),
            usage: Usage::default(),
            finish_reason: FinishReason::Stop,
            provider_meta: Default::default(),
        };
        assert_eq!(resp.text().as_deref(), Some("pong"));
    }
}
