//! Streaming chunks (provider-agnostic).
//!
//! Codecs decode each SSE event into zero or more chunks; the streaming
//! runtime accumulates tool-call argument fragments and guarantees exactly
//! one terminal [`MetaChunk`] per stream.

use crate::response::FinishReason;
use crate::usage::Usage;
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Events emitted while a response streams.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum StreamChunk {
    /// A text delta.
    Text { text: String },
    /// A chain-of-thought delta.
    Thinking { text: String },
    /// A tool invocation. Emitted once when the vendor announces the call
    /// (possibly with empty arguments) and again, synthesized with the full
    /// argument object, just before the terminal meta chunk.
    ToolCall {
        name: String,
        arguments: Value,
        meta: ToolCallChunkMeta,
    },
    /// Out-of-band stream state: usage, finish reason, argument fragments,
    /// errors, termination.
    Meta(MetaChunk),
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct ToolCallChunkMeta {
    pub id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub index: Option<u32>,
}

/// A fragment of a tool call's JSON arguments, addressed by the call's
/// position within the assistant turn.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolCallFragment {
    pub index: u32,
    pub fragment: String,
}

/// An in-band stream error. Does not abort the stream by itself.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StreamError {
    /// Stable machine-readable reason, e.g. `"invalid_tool_arguments"`.
    pub reason: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub index: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct MetaChunk {
    /// When true, no further chunks follow.
    #[serde(default)]
    pub terminal: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub finish_reason: Option<FinishReason>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub usage: Option<Usage>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub model: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tool_call_args: Option<ToolCallFragment>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<StreamError>,
}

impl StreamChunk {
    pub fn text(text: impl Into<String>) -> Self {
        StreamChunk::Text { text: text.into() }
    }

    pub fn thinking(text: impl Into<String>) -> Self {
        StreamChunk::Thinking { text: text.into() }
    }

    pub fn tool_call_args(index: u32, fragment: impl Into<String>) -> Self {
        StreamChunk::Meta(MetaChunk {
            tool_call_args: Some(ToolCallFragment {
                index,
                fragment: fragment.into(),
            }),
            ..Default::default()
        })
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, StreamChunk::Meta(m) if m.terminal)
    }

    pub fn as_text(&self) -> Option<&str> {
        match self {
            StreamChunk::Text { text } => Some(text),
            _ => None,
        }
    }
}

impl MetaChunk {
    pub fn terminal(finish_reason: Option<FinishReason>) -> Self {
        Self {
            terminal: true,
            finish_reason,
            ..Default::default()
        }
    }

    pub fn with_usage(mut self, usage: Usage) -> Self {
        self.usage = Some(usage);
        self
    }
}
