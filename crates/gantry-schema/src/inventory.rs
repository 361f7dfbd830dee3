use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs;
use std::path::Path;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum InventoryError {
    #[error("failed to read inventory file: {0}")]
    Io(#[from] std::io::Error),
    #[error("failed to parse inventory: {0}")]
    ParseToml(#[from] toml::de::Error),
    #[error("unsupported inventory_version: {0}, expected 1")]
    UnsupportedVersion(u32),
    #[error("invalid resource id '{0}': expected a positive integer key")]
    InvalidId(String),
    #[error("duplicate resource id {0}")]
    DuplicateId(u32),
    #[error("resource {id}: name must not be empty")]
    EmptyName { id: String },
    #[error("resource {id}: template must not be empty")]
    EmptyTemplate { id: String },
}

/// Raw on-disk inventory document, keyed by string-encoded container id.
///
/// This is the parse-time shape only; [`crate::ResourceSpec`] is the
/// validated form the engine consumes.
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq, Eq)]
#[serde(deny_unknown_fields)]
pub struct InventoryV1 {
    pub inventory_version: u32,
    #[serde(default)]
    pub resources: BTreeMap<String, ResourceEntry>,
}

#[derive(Debug, Clone, Deserialize, Serialize, PartialEq, Eq)]
#[serde(deny_unknown_fields)]
pub struct ResourceEntry {
    pub name: String,
    pub template: String,
    #[serde(default)]
    pub role: crate::Role,
    /// Comma-separated non-negative device indices, e.g. `"0,1"`.
    /// Empty or absent means no passthrough. Tokens are validated at
    /// planning time so one bad assignment fails only its resource.
    #[serde(default)]
    pub device_assignment: String,
    #[serde(default)]
    pub features: Vec<String>,
    #[serde(default)]
    pub resource_limits: LimitsSection,
    pub network: NetworkSection,
}

#[derive(Debug, Clone, Default, Deserialize, Serialize, PartialEq, Eq)]
#[serde(deny_unknown_fields)]
pub struct LimitsSection {
    #[serde(default)]
    pub memory_mb: Option<u64>,
    #[serde(default)]
    pub cores: Option<u32>,
    #[serde(default)]
    pub disk_gb: Option<u64>,
}

#[derive(Debug, Clone, Deserialize, Serialize, PartialEq, Eq)]
#[serde(deny_unknown_fields)]
pub struct NetworkSection {
    pub address: String,
    pub gateway: String,
}

pub fn parse_inventory_str(input: &str) -> Result<InventoryV1, InventoryError> {
    Ok(toml::from_str(input)?)
}

pub fn parse_inventory_file(path: impl AsRef<Path>) -> Result<InventoryV1, InventoryError> {
    let content = fs::read_to_string(path)?;
    parse_inventory_str(&content)
}
