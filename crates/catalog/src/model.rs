//! The resolved model record: limits, pricing, capabilities, API flavor.

use mp_domain::usage::ModelCost;
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Context and output token limits for a model.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct ModelLimits {
    pub context: u32,
    pub output: u32,
}

/// Capability flags advertised per model.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct ModelCapabilities {
    #[serde(default)]
    pub reasoning: bool,
    #[serde(default)]
    pub tool_call: bool,
    #[serde(default)]
    pub temperature: bool,
    #[serde(default)]
    pub embedding: bool,
}

/// Which wire API a provider family uses for this model. Only meaningful
/// for providers with multiple endpoints (OpenAI Chat vs Responses).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ApiFlavor {
    #[default]
    Chat,
    Responses,
}

/// A fully resolved model. Immutable once constructed; built per call by
/// [`crate::Catalog::resolve`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Model {
    pub provider: String,
    pub id: String,
    pub limits: ModelLimits,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cost: Option<ModelCost>,
    pub capabilities: ModelCapabilities,
    /// Caller-imposed output cap; falls back to `limits.output`.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_tokens: Option<u32>,
    #[serde(default)]
    pub api: ApiFlavor,
    /// Catalog classification, e.g. `"deep_research"`.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub category: Option<String>,
    /// Catalog fields the core does not interpret.
    #[serde(default, skip_serializing_if = "serde_json::Map::is_empty")]
    pub metadata: serde_json::Map<String, Value>,
}

impl Model {
    /// The spec string (`provider:model`) this model resolves from.
    pub fn spec(&self) -> String {
        format!("{}:{}", self.provider, self.id)
    }

    /// Effective output token cap for requests that set none.
    pub fn default_max_tokens(&self) -> u32 {
        self.max_tokens.unwrap_or(self.limits.output)
    }
}
