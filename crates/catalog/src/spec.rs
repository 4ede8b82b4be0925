//! Model spec strings: `"provider:model"`.

use mp_domain::error::{Error, Result};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// A parsed `provider:model` pair. Splitting happens on the first `:` so
/// model ids may themselves contain colons (e.g. versioned ids).
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ModelSpec {
    pub provider: String,
    pub model: String,
}

impl ModelSpec {
    pub fn new(provider: impl Into<String>, model: impl Into<String>) -> Self {
        Self {
            provider: provider.into(),
            model: model.into(),
        }
    }

    /// Parse a spec string. The provider id must match `[a-z][a-z0-9_]*`;
    /// the model id must be non-empty.
    pub fn parse(spec: &str) -> Result<Self> {
        let Some((provider, model)) = spec.split_once(':') else {
            return Err(Error::Validation(format!(
                "invalid model spec {spec:?}: expected \"provider:model\""
            )));
        };
        if !is_provider_id(provider) {
            return Err(Error::Validation(format!(
                "invalid model spec {spec:?}: provider id must match [a-z][a-z0-9_]*"
            )));
        }
        if model.is_empty() {
            return Err(Error::Validation(format!(
                "invalid model spec {spec:?}: empty model id"
            )));
        }
        Ok(Self::new(provider, model))
    }
}

/// `[a-z][a-z0-9_]*`
pub(crate) fn is_provider_id(id: &str) -> bool {
    let mut chars = id.chars();
    match chars.next() {
        Some(c) if c.is_ascii_lowercase() => {}
        _ => return false,
    }
    chars.all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '_')
}

impl fmt::Display for ModelSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.provider, self.model)
    }
}

impl FromStr for ModelSpec {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        Self::parse(s)
    }
}
