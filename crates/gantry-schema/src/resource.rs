use crate::inventory::{InventoryError, InventoryV1};
use crate::types::{CtId, Role, Tier};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::Path;

/// Validated, immutable specification of one container.
///
/// Built once by [`load_inventory`]; the engine never mutates it. The
/// lifecycle state is deliberately absent: it is re-derived from the
/// live container on every run, never stored here.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ResourceSpec {
    pub id: CtId,
    pub name: String,
    pub role: Role,
    pub template: String,
    /// Raw comma-separated device indices; parsed by the passthrough
    /// planner so a malformed token fails only this resource.
    pub device_assignment: String,
    pub features: Vec<String>,
    pub limits: ResourceLimits,
    pub network: NetworkConfig,
}

impl ResourceSpec {
    pub fn tier(&self) -> Tier {
        self.id.tier()
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct ResourceLimits {
    pub memory_mb: Option<u64>,
    pub cores: Option<u32>,
    pub disk_gb: Option<u64>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct NetworkConfig {
    pub address: String,
    pub gateway: String,
}

impl InventoryV1 {
    /// Validate the raw document into the spec map the engine consumes.
    ///
    /// All-or-nothing: any invalid entry rejects the whole load so a
    /// run never starts from a partially populated inventory.
    pub fn into_specs(self) -> Result<BTreeMap<CtId, ResourceSpec>, InventoryError> {
        if self.inventory_version != 1 {
            return Err(InventoryError::UnsupportedVersion(self.inventory_version));
        }

        let mut specs = BTreeMap::new();
        for (key, entry) in self.resources {
            // Digits only: `u32::from_str` would also accept `+5`, and
            // a leading zero would alias another key.
            let trimmed = key.trim();
            if trimmed.is_empty()
                || !trimmed.bytes().all(|b| b.is_ascii_digit())
                || (trimmed.len() > 1 && trimmed.starts_with('0'))
            {
                return Err(InventoryError::InvalidId(key.clone()));
            }
            let id: CtId = trimmed
                .parse()
                .map_err(|_| InventoryError::InvalidId(key.clone()))?;
            if id.as_u32() == 0 {
                return Err(InventoryError::InvalidId(key.clone()));
            }

            let name = entry.name.trim().to_owned();
            if name.is_empty() {
                return Err(InventoryError::EmptyName { id: key.clone() });
            }
            let template = entry.template.trim().to_owned();
            if template.is_empty() {
                return Err(InventoryError::EmptyTemplate { id: key.clone() });
            }

            let mut features = entry
                .features
                .iter()
                .map(|f| f.trim().to_owned())
                .filter(|f| !f.is_empty())
                .collect::<Vec<_>>();
            features.sort();
            features.dedup();

            let previous = specs.insert(
                id,
                ResourceSpec {
                    id,
                    name,
                    role: entry.role,
                    template,
                    device_assignment: entry.device_assignment.trim().to_owned(),
                    features,
                    limits: ResourceLimits {
                        memory_mb: entry.resource_limits.memory_mb,
                        cores: entry.resource_limits.cores,
                        disk_gb: entry.resource_limits.disk_gb,
                    },
                    network: NetworkConfig {
                        address: entry.network.address.trim().to_owned(),
                        gateway: entry.network.gateway.trim().to_owned(),
                    },
                },
            );
            if previous.is_some() {
                return Err(InventoryError::DuplicateId(id.as_u32()));
            }
        }
        Ok(specs)
    }
}

/// Parse and validate an inventory file into the spec map.
pub fn load_inventory(path: impl AsRef<Path>) -> Result<BTreeMap<CtId, ResourceSpec>, InventoryError> {
    crate::inventory::parse_inventory_file(path)?.into_specs()
}

/// In-memory variant of [`load_inventory`], used by tests and `--json`
/// tooling that already hold the document text.
pub fn load_inventory_str(input: &str) -> Result<BTreeMap<CtId, ResourceSpec>, InventoryError> {
    crate::inventory::parse_inventory_str(input)?.into_specs()
}
