//! Tool declarations and tool calls.
//!
//! A [`Tool`] is what the caller declares; a [`ToolCall`] is what the model
//! emits. Tool calls match the common wire shape
//! `{id, type: "function", function: {name, arguments}}` where `arguments`
//! is a string of JSON.

use crate::error::{Error, Result};
use crate::schema::Schema;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;
use std::sync::Arc;

/// Handle invoked by callers that execute tools locally. The core never
/// calls it; it is carried opaquely for the surrounding application.
pub type ToolCallback = Arc<dyn Fn(Value) -> Result<Value> + Send + Sync>;

/// Maximum length of a tool identifier.
const MAX_TOOL_NAME_LEN: usize = 64;

/// A tool definition exposed to the model.
#[derive(Clone)]
pub struct Tool {
    pub name: String,
    pub description: String,
    /// Declarative parameter schema, compiled to JSON Schema on the wire.
    pub schema: Schema,
    pub callback: Option<ToolCallback>,
}

impl Tool {
    /// Create a tool, validating the identifier: 1..=64 chars, alphanumeric
    /// or underscore, not digit-leading.
    pub fn new(
        name: impl Into<String>,
        description: impl Into<String>,
        schema: Schema,
    ) -> Result<Self> {
        let name = name.into();
        validate_tool_name(&name)?;
        Ok(Self {
            name,
            description: description.into(),
            schema,
            callback: None,
        })
    }

    pub fn with_callback(mut self, callback: ToolCallback) -> Self {
        self.callback = Some(callback);
        self
    }
}

impl fmt::Debug for Tool {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Tool")
            .field("name", &self.name)
            .field("description", &self.description)
            .field("schema", &self.schema)
            .field("callback", &self.callback.as_ref().map(|_| "<fn>"))
            .finish()
    }
}

pub(crate) fn validate_tool_name(name: &str) -> Result<()> {
    if name.is_empty() || name.len() > MAX_TOOL_NAME_LEN {
        return Err(Error::Validation(format!(
            "tool name must be 1..={MAX_TOOL_NAME_LEN} chars, got {} ({name:?})",
            name.len()
        )));
    }
    if name.starts_with(|c: char| c.is_ascii_digit()) {
        return Err(Error::Validation(format!(
            "tool name must not start with a digit: {name:?}"
        )));
    }
    if let Some(bad) = name
        .chars()
        .find(|c| !c.is_ascii_alphanumeric() && *c != '_')
    {
        return Err(Error::Validation(format!(
            "tool name contains invalid character {bad:?}: {name:?}"
        )));
    }
    Ok(())
}

/// A model-initiated invocation of a declared tool.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ToolCall {
    pub id: String,
    pub name: String,
    /// The raw argument object as a string of JSON, exactly as the vendor
    /// sent it.
    pub arguments_json: String,
}

impl ToolCall {
    /// Create a tool call. When `id` is `None` a fresh `call_<uuid>` id is
    /// generated.
    pub fn new(
        id: Option<String>,
        name: impl Into<String>,
        arguments_json: impl Into<String>,
    ) -> Self {
        Self {
            id: id.unwrap_or_else(generate_call_id),
            name: name.into(),
            arguments_json: arguments_json.into(),
        }
    }

    /// Parse the argument string. An empty string parses to `{}`.
    pub fn arguments(&self) -> Result<Value> {
        if self.arguments_json.trim().is_empty() {
            return Ok(Value::Object(Default::default()));
        }
        let v: Value = serde_json::from_str(&self.arguments_json)?;
        Ok(v)
    }

    /// Serialize to the `{id, type: "function", function: {...}}` wire form.
    pub fn to_wire(&self) -> Value {
        serde_json::json!({
            "id": self.id,
            "type": "function",
            "function": {
                "name": self.name,
                "arguments": self.arguments_json,
            }
        })
    }

    /// Parse the wire form back into a [`ToolCall`]. Returns `None` when the
    /// value does not look like a function call.
    pub fn from_wire(v: &Value) -> Option<Self> {
        let func = v.get("function")?;
        let name = func.get("name")?.as_str()?;
        let arguments = func.get("arguments").and_then(|a| a.as_str()).unwrap_or("{}");
        let id = v.get("id").and_then(|i| i.as_str()).map(String::from);
        Some(Self::new(id, name, arguments))
    }
}

/// Generate a fresh `call_<uuid>` tool-call id.
pub fn generate_call_id() -> String {
    format!("call_{}", uuid::Uuid::new_v4())
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Tests
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
