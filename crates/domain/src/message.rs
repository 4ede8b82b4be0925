//! Conversation value types: roles, content parts, and messages.
//!
//! Every provider adapter converts between these provider-agnostic types and
//! its own wire format. A message body is always a list of tagged content
//! parts; a plain-text body is a single `text` part.

use crate::error::{Error, Result};
use crate::tool::ToolCall;
use serde::{Deserialize, Serialize};
use serde_json::Value;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    System,
    User,
    Assistant,
    Tool,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::System => "system",
            Role::User => "user",
            Role::Assistant => "assistant",
            Role::Tool => "tool",
        }
    }
}

/// A tagged unit of content within a message.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ContentPart {
    Text { text: String },
    /// A remotely hosted image.
    ImageUrl { url: String },
    /// Inline image bytes.
    Image { data: Vec<u8>, media_type: String },
    /// An arbitrary attached file.
    File {
        data: Vec<u8>,
        media_type: String,
        filename: String,
    },
    /// Model-emitted chain-of-thought. Assistant messages only.
    Thinking { text: String },
    /// A model-initiated tool invocation with parsed arguments.
    ToolCall {
        id: String,
        name: String,
        input: Value,
    },
    /// An environment-supplied tool result. `tool`-role messages only.
    ToolResult {
        tool_call_id: String,
        tool_name: String,
        output: Value,
    },
}

impl ContentPart {
    pub fn text(text: impl Into<String>) -> Self {
        ContentPart::Text { text: text.into() }
    }

    pub fn thinking(text: impl Into<String>) -> Self {
        ContentPart::Thinking { text: text.into() }
    }

    /// Alias for [`ContentPart::thinking`]; some vendors call the
    /// chain-of-thought segment "reasoning".
    pub fn reasoning(text: impl Into<String>) -> Self {
        Self::thinking(text)
    }

    pub fn image_url(url: impl Into<String>) -> Self {
        ContentPart::ImageUrl { url: url.into() }
    }

    pub fn is_text(&self) -> bool {
        matches!(self, ContentPart::Text { .. })
    }
}

/// A message in the conversation (provider-agnostic).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Message {
    pub role: Role,
    pub content: Vec<ContentPart>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    /// For `tool`-role messages: the id of the call being answered.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tool_call_id: Option<String>,
    /// Tool calls emitted alongside assistant content.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tool_calls: Vec<ToolCall>,
    #[serde(default, skip_serializing_if = "serde_json::Map::is_empty")]
    pub metadata: serde_json::Map<String, Value>,
}

// ── Convenience constructors ───────────────────────────────────────

impl Message {
    pub fn new(role: Role, content: Vec<ContentPart>) -> Self {
        Self {
            role,
            content,
            name: None,
            tool_call_id: None,
            tool_calls: Vec::new(),
            metadata: serde_json::Map::new(),
        }
    }

    pub fn system(text: impl Into<String>) -> Self {
        Self::new(Role::System, vec![ContentPart::text(text)])
    }

    pub fn user(text: impl Into<String>) -> Self {
        Self::new(Role::User, vec![ContentPart::text(text)])
    }

    pub fn user_parts(parts: Vec<ContentPart>) -> Self {
        Self::new(Role::User, parts)
    }

    pub fn assistant(text: impl Into<String>) -> Self {
        Self::new(Role::Assistant, vec![ContentPart::text(text)])
    }

    pub fn assistant_parts(parts: Vec<ContentPart>) -> Self {
        Self::new(Role::Assistant, parts)
    }

    /// A `tool`-role message carrying the result of an earlier tool call.
    pub fn tool_result(
        tool_call_id: impl Into<String>,
        tool_name: impl Into<String>,
        output: Value,
    ) -> Self {
        let id = tool_call_id.into();
        let name = tool_name.into();
        let mut msg = Self::new(
            Role::Tool,
            vec![ContentPart::ToolResult {
                tool_call_id: id.clone(),
                tool_name: name,
                output,
            }],
        );
        msg.tool_call_id = Some(id);
        msg
    }

    /// A message combining text and a hosted image.
    pub fn with_image(role: Role, text: impl Into<String>, url: impl Into<String>) -> Self {
        Self::new(
            role,
            vec![ContentPart::text(text), ContentPart::image_url(url)],
        )
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    pub fn with_metadata(mut self, metadata: serde_json::Map<String, Value>) -> Self {
        self.metadata = metadata;
        self
    }

    // ── Accessors ──────────────────────────────────────────────────

    /// The first text part, if any.
    pub fn text(&self) -> Option<&str> {
        self.content.iter().find_map(|p| match p {
            ContentPart::Text { text } => Some(text.as_str()),
            _ => None,
        })
    }

    /// Join all text parts with `"\n"`. Non-text parts are skipped.
    pub fn extract_all_text(&self) -> String {
        self.content
            .iter()
            .filter_map(|p| match p {
                ContentPart::Text { text } => Some(text.as_str()),
                _ => None,
            })
            .collect::<Vec<_>>()
            .join("\n")
    }

    /// All tool-call parts of this message, in order.
    pub fn tool_call_parts(&self) -> impl Iterator<Item = (&str, &str, &Value)> {
        self.content.iter().filter_map(|p| match p {
            ContentPart::ToolCall { id, name, input } => {
                Some((id.as_str(), name.as_str(), input))
            }
            _ => None,
        })
    }

    /// Validate the per-message invariants.
    pub fn validate(&self) -> Result<()> {
        if self.content.is_empty() {
            return Err(Error::Validation(format!(
                "{} message has no content parts",
                self.role.as_str()
            )));
        }
        if self.role == Role::Tool
            && self.tool_call_id.as_deref().unwrap_or("").is_empty()
        {
            return Err(Error::Validation(
                "tool message requires a non-empty tool_call_id".into(),
            ));
        }
        if self.role != Role::Assistant {
            if self.content.iter().any(|p| matches!(p, ContentPart::Thinking { .. })) {
                return Err(Error::Validation(format!(
                    "thinking content is only valid on assistant messages, found on {}",
                    self.role.as_str()
                )));
            }
            if !self.tool_calls.is_empty()
                || self.content.iter().any(|p| matches!(p, ContentPart::ToolCall { .. }))
            {
                return Err(Error::Validation(format!(
                    "tool calls are only valid on assistant messages, found on {}",
                    self.role.as_str()
                )));
            }
        }
        Ok(())
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Tests
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
