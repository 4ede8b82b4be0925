//! The model and provider registry: spec parsing, catalog metadata, and
//! resolution of `provider:model` strings to executable [`Model`] records.

mod catalog;
mod model;
mod spec;

pub use catalog::{Catalog, CatalogFile, CostEntry, ModelEntry, PatchFile, ProviderInfo};
pub use model::{ApiFlavor, Model, ModelCapabilities, ModelLimits};
pub use spec::ModelSpec;
