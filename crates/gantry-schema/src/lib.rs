//! Inventory parsing, validation, and resource specifications for Gantry.
//!
//! This crate defines the declarative layer: TOML inventory parsing
//! (`InventoryV1`), validated immutable resource specifications
//! (`ResourceSpec`), container id and role types, and priority tier
//! derivation. Loading is pure and all-or-nothing: a single malformed
//! entry rejects the whole inventory.

pub mod inventory;
pub mod resource;
pub mod types;

pub use inventory::{
    parse_inventory_file, parse_inventory_str, InventoryError, InventoryV1, LimitsSection,
    NetworkSection, ResourceEntry,
};
pub use resource::{load_inventory, load_inventory_str, NetworkConfig, ResourceLimits, ResourceSpec};
pub use types::{CtId, Role, Tier, CORE_TIER_IDS};
