//! The request option bag.
//!
//! The set of recognized options is closed; provider-specific extras travel
//! under `provider_options`, an opaque map handed to the provider codec
//! untouched. Options a vendor does not support are silently dropped during
//! encoding (never passed through).

use crate::error::{Error, Result};
use crate::tool::Tool;
use serde_json::Value;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

/// How the model may use the declared tools.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ToolChoice {
    /// The model decides.
    Auto,
    /// Tools are declared but must not be called.
    None,
    /// The model must call some tool.
    Required,
    /// The model must call this specific tool.
    Tool { name: String },
}

#[derive(Debug, Clone, PartialEq)]
pub enum ResponseFormat {
    Text,
    JsonObject,
    JsonSchema { name: String, schema: Value },
}

/// Options for `generate_text` / `stream_text` and friends.
#[derive(Debug, Clone, Default)]
pub struct GenerateOptions {
    pub temperature: Option<f64>,
    pub top_p: Option<f64>,
    pub top_k: Option<u32>,
    pub max_tokens: Option<u32>,
    /// Stop sequences, at most 4.
    pub stop: Vec<String>,
    pub seed: Option<u64>,
    pub frequency_penalty: Option<f64>,
    pub presence_penalty: Option<f64>,
    pub tools: Vec<Tool>,
    pub tool_choice: Option<ToolChoice>,
    pub response_format: Option<ResponseFormat>,
    /// Opaque provider-specific options, passed through untouched.
    pub provider_options: serde_json::Map<String, Value>,
    /// Call deadline. Defaults to the transport's request timeout.
    pub timeout: Option<Duration>,
    /// Cooperative cancellation. Cancelling aborts the request at the
    /// transport level and discards partial responses.
    pub cancel: Option<CancellationToken>,
}

impl GenerateOptions {
    /// Validate the option bag against the closed-set rules.
    pub fn validate(&self) -> Result<()> {
        if self.stop.len() > 4 {
            return Err(Error::Validation(format!(
                "at most 4 stop sequences are supported, got {}",
                self.stop.len()
            )));
        }
        if let Some(t) = self.temperature {
            if !(0.0..=2.0).contains(&t) {
                return Err(Error::Validation(format!(
                    "temperature must be within 0.0..=2.0, got {t}"
                )));
            }
        }
        if let Some(p) = self.top_p {
            if !(0.0..=1.0).contains(&p) {
                return Err(Error::Validation(format!(
                    "top_p must be within 0.0..=1.0, got {p}"
                )));
            }
        }
        if self.max_tokens == Some(0) {
            return Err(Error::Validation("max_tokens must be positive".into()));
        }
        let mut names: Vec<&str> = self.tools.iter().map(|t| t.name.as_str()).collect();
        names.sort_unstable();
        if names.windows(2).any(|w| w[0] == w[1]) {
            return Err(Error::Validation("duplicate tool names".into()));
        }
        if let Some(ToolChoice::Tool { name }) = &self.tool_choice {
            if !self.tools.iter().any(|t| &t.name == name) {
                return Err(Error::Validation(format!(
                    "tool_choice names undeclared tool {name:?}"
                )));
            }
        }
        Ok(())
    }

    /// A provider-specific option, read from the opaque escape hatch.
    pub fn provider_option(&self, key: &str) -> Option<&Value> {
        self.provider_options.get(key)
    }
}

/// Options for `embed`.
#[derive(Debug, Clone, Default)]
pub struct EmbedOptions {
    pub provider_options: serde_json::Map<String, Value>,
    pub timeout: Option<Duration>,
    pub cancel: Option<CancellationToken>,
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Tests
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
