//! Catalog loading and model resolution.
//!
//! One JSON file per provider (`models/<provider_id>.json`) describes the
//! provider (base URL, credential env vars) and its models (limits, pricing,
//! capabilities). Patch files in a `models_local/` directory may override or
//! add models and list excluded model ids; exclusions are recorded for the
//! test harness and never filter runtime resolution.

use crate::model::{ApiFlavor, Model, ModelCapabilities, ModelLimits};
use crate::spec::ModelSpec;
use mp_domain::error::{Error, Result};
use mp_domain::usage::ModelCost;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;
use std::path::Path;

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Catalog file schema
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProviderInfo {
    pub id: String,
    pub name: String,
    pub base_url: String,
    /// Env var names checked, in order, for the API key.
    #[serde(default)]
    pub env: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub doc: Option<String>,
    /// Wire-format family this provider is compatible with, for providers
    /// without a native adapter (e.g. `"openai"`).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub compat: Option<String>,
}

/// Per-model pricing as written in catalog files (dollars per 1M tokens).
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct CostEntry {
    pub input: f64,
    pub output: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cached_input: Option<f64>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModelEntry {
    pub id: String,
    #[serde(default)]
    pub limit: ModelLimits,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cost: Option<CostEntry>,
    #[serde(default)]
    pub capabilities: ModelCapabilities,
    #[serde(default, rename = "type", skip_serializing_if = "Option::is_none")]
    pub model_type: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub category: Option<String>,
    #[serde(default)]
    pub api: ApiFlavor,
    /// Fields the core does not interpret (modalities, release dates, ...).
    #[serde(flatten)]
    pub extra: serde_json::Map<String, Value>,
}

impl ModelEntry {
    fn to_model(&self, provider_id: &str) -> Model {
        let mut metadata = self.extra.clone();
        if let Some(t) = &self.model_type {
            metadata.insert("type".into(), Value::String(t.clone()));
        }
        Model {
            provider: provider_id.to_string(),
            id: self.id.clone(),
            limits: self.limit,
            cost: self.cost.map(|c| ModelCost {
                input_per_m: c.input,
                output_per_m: c.output,
                cached_input_per_m: c.cached_input,
            }),
            capabilities: self.capabilities,
            max_tokens: None,
            api: self.api,
            category: self.category.clone(),
            metadata,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct CatalogFile {
    pub provider: ProviderInfo,
    #[serde(default)]
    pub models: Vec<ModelEntry>,
}

#[derive(Debug, Clone, Deserialize)]
struct PatchProviderRef {
    id: String,
}

/// A `models_local/` patch: overrides/additions plus an exclusion list.
#[derive(Debug, Clone, Deserialize)]
pub struct PatchFile {
    provider: PatchProviderRef,
    #[serde(default)]
    models: Vec<ModelEntry>,
    #[serde(default)]
    exclude: Vec<String>,
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Catalog
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[derive(Debug, Clone)]
struct ProviderModels {
    info: ProviderInfo,
    models: Vec<ModelEntry>,
    exclusions: Vec<String>,
}

/// Read-only registry of providers and their models. Loaded once at
/// startup; catalog read errors are fatal at that point, while per-request
/// resolution failures surface as validation errors.
#[derive(Debug, Clone, Default)]
pub struct Catalog {
    providers: HashMap<String, ProviderModels>,
}

const BUILTIN_FILES: &[&str] = &[
    include_str!("../models/anthropic.json"),
    include_str!("../models/openai.json"),
    include_str!("../models/google.json"),
    include_str!("../models/groq.json"),
];

impl Catalog {
    /// The catalog shipped with the library.
    pub fn builtin() -> Self {
        let mut catalog = Catalog::default();
        for raw in BUILTIN_FILES {
            let file: CatalogFile =
                serde_json::from_str(raw).expect("embedded model catalog is valid JSON");
            catalog.insert_file(file);
        }
        catalog
    }

    /// Load every `*.json` catalog file in `dir`.
    pub fn load_dir(dir: &Path) -> Result<Self> {
        let mut catalog = Catalog::default();
        let mut entries: Vec<_> = std::fs::read_dir(dir)?
            .collect::<std::io::Result<Vec<_>>>()?
            .into_iter()
            .map(|e| e.path())
            .filter(|p| p.extension().is_some_and(|ext| ext == "json"))
            .collect();
        entries.sort();
        for path in entries {
            let raw = std::fs::read_to_string(&path)?;
            let file: CatalogFile = serde_json::from_str(&raw).map_err(|e| {
                Error::Validation(format!("catalog file {}: {e}", path.display()))
            })?;
            catalog.insert_file(file);
        }
        Ok(catalog)
    }

    /// Load a catalog directory, then overlay patch files from an optional
    /// `models_local/` directory.
    pub fn load(models_dir: &Path, local_dir: Option<&Path>) -> Result<Self> {
        let mut catalog = Self::load_dir(models_dir)?;
        if let Some(local) = local_dir {
            if local.is_dir() {
                catalog.apply_patch_dir(local)?;
            }
        }
        Ok(catalog)
    }

    fn insert_file(&mut self, file: CatalogFile) {
        let id = file.provider.id.clone();
        self.providers.insert(
            id,
            ProviderModels {
                info: file.provider,
                models: file.models,
                exclusions: Vec::new(),
            },
        );
    }

    /// Apply every patch file in `dir`.
    pub fn apply_patch_dir(&mut self, dir: &Path) -> Result<()> {
        let mut entries: Vec<_> = std::fs::read_dir(dir)?
            .collect::<std::io::Result<Vec<_>>>()?
            .into_iter()
            .map(|e| e.path())
            .filter(|p| p.extension().is_some_and(|ext| ext == "json"))
            .collect();
        entries.sort();
        for path in entries {
            let raw = std::fs::read_to_string(&path)?;
            let patch: PatchFile = serde_json::from_str(&raw).map_err(|e| {
                Error::Validation(format!("patch file {}: {e}", path.display()))
            })?;
            self.apply_patch(patch);
        }
        Ok(())
    }

    /// Apply one patch: models override by id or append; exclusions are
    /// recorded for the test harness.
    pub fn apply_patch(&mut self, patch: PatchFile) {
        let Some(entry) = self.providers.get_mut(&patch.provider.id) else {
            tracing::warn!(
                provider = %patch.provider.id,
                "patch references unknown provider, skipping"
            );
            return;
        };
        for model in patch.models {
            match entry.models.iter_mut().find(|m| m.id == model.id) {
                Some(existing) => *existing = model,
                None => entry.models.push(model),
            }
        }
        entry.exclusions.extend(patch.exclude);
    }

    // ── Lookup ─────────────────────────────────────────────────────

    pub fn provider(&self, id: &str) -> Option<&ProviderInfo> {
        self.providers.get(id).map(|p| &p.info)
    }

    pub fn provider_ids(&self) -> Vec<&str> {
        let mut ids: Vec<&str> = self.providers.keys().map(String::as_str).collect();
        ids.sort_unstable();
        ids
    }

    pub fn model_ids(&self, provider: &str) -> Vec<&str> {
        self.providers
            .get(provider)
            .map(|p| p.models.iter().map(|m| m.id.as_str()).collect())
            .unwrap_or_default()
    }

    /// Model ids excluded via local patches. Consumed only by the fixture
    /// harness; runtime resolution ignores them.
    pub fn exclusions(&self, provider: &str) -> &[String] {
        self.providers
            .get(provider)
            .map(|p| p.exclusions.as_slice())
            .unwrap_or(&[])
    }

    /// Resolve a parsed spec to an immutable [`Model`].
    pub fn resolve(&self, spec: &ModelSpec) -> Result<Model> {
        let entry = self.providers.get(&spec.provider).ok_or_else(|| {
            Error::Validation(format!("unknown provider {:?}", spec.provider))
        })?;
        let model = entry
            .models
            .iter()
            .find(|m| m.id == spec.model)
            .ok_or_else(|| {
                Error::Validation(format!(
                    "model {:?} not found under provider {:?}",
                    spec.model, spec.provider
                ))
            })?;
        Ok(model.to_model(&spec.provider))
    }

    /// Parse and resolve a `provider:model` spec string.
    pub fn resolve_spec(&self, spec: &str) -> Result<Model> {
        self.resolve(&ModelSpec::parse(spec)?)
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Tests
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
