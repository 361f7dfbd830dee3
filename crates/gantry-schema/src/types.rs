//! Identifier and classification types shared across the engine.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::ops::RangeInclusive;
use std::str::FromStr;

/// Reserved id range for core-infrastructure containers. Everything in
/// this range is reconciled before any standard-tier container.
pub const CORE_TIER_IDS: RangeInclusive<u32> = 990..=999;

/// Numeric container identifier, unique within an inventory.
///
/// Serializes as a plain integer. Ordering is numeric, which the
/// scheduler relies on for its deterministic tie-break.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CtId(u32);

impl CtId {
    /// Create an id from a raw integer. Zero is not a valid container
    /// id; the inventory loader rejects it before construction.
    pub fn new(id: u32) -> Self {
        Self(id)
    }

    pub fn as_u32(self) -> u32 {
        self.0
    }

    /// Priority tier this id belongs to.
    pub fn tier(self) -> Tier {
        if CORE_TIER_IDS.contains(&self.0) {
            Tier::Core
        } else {
            Tier::Standard
        }
    }
}

impl fmt::Display for CtId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for CtId {
    type Err = std::num::ParseIntError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        s.parse::<u32>().map(Self)
    }
}

/// Priority partition. Core-tier containers host shared services
/// (registry, build manager) that standard-tier hooks may depend on.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(rename_all = "lowercase")]
pub enum Tier {
    Core,
    Standard,
}

impl fmt::Display for Tier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Core => f.write_str("core"),
            Self::Standard => f.write_str("standard"),
        }
    }
}

/// Declared workload role of a container, keying the extension hook
/// that configures and validates it. `None` means no hook runs.
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(rename_all = "kebab-case")]
pub enum Role {
    CoreInfra,
    InferenceWorker,
    Agent,
    #[default]
    None,
}

impl Role {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::CoreInfra => "core-infra",
            Self::InferenceWorker => "inference-worker",
            Self::Agent => "agent",
            Self::None => "none",
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
