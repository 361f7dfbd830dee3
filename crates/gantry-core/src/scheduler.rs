//! Priority-tier scheduling.
//!
//! Core-tier containers (reserved id range) are reconciled to
//! completion before any standard-tier container begins, because
//! standard-tier hooks may depend on artifacts the core tier produces
//! (a shared registry, a pulled base image). Within a tier, ascending
//! id is the deterministic tie-break.

use gantry_schema::{CtId, ResourceSpec, Tier};
use std::collections::BTreeMap;

/// Order the inventory for reconciliation: core tier first, then
/// standard, each ascending by id. Empty tiers are fine.
pub fn plan_order(specs: &BTreeMap<CtId, ResourceSpec>) -> Vec<&ResourceSpec> {
    // BTreeMap iteration is already ascending by id.
    let mut core = Vec::new();
    let mut standard = Vec::new();
    for spec in specs.values() {
        match spec.tier() {
            Tier::Core => core.push(spec),
            Tier::Standard => standard.push(spec),
        }
    }
    core.extend(standard);
    core
}

#[cfg(test)]
mod tests {
    use super::*;
    use gantry_schema::{NetworkConfig, ResourceLimits, Role};

    fn spec(id: u32, role: Role) -> ResourceSpec {
        ResourceSpec {
            id: CtId::new(id),
            name: format!("ct-{id}"),
            role,
            template: "local:vztmpl/base.tar.zst".to_owned(),
            device_assignment: String::new(),
            features: Vec::new(),
            limits: ResourceLimits::default(),
            network: NetworkConfig {
                address: "dhcp".to_owned(),
                gateway: "auto".to_owned(),
            },
        }
    }

    fn inventory(ids: &[(u32, Role)]) -> BTreeMap<CtId, ResourceSpec> {
        ids.iter()
            .map(|&(id, role)| (CtId::new(id), spec(id, role)))
            .collect()
    }

    fn planned_ids(specs: &BTreeMap<CtId, ResourceSpec>) -> Vec<u32> {
        plan_order(specs).iter().map(|s| s.id.as_u32()).collect()
    }

    #[test]
    fn core_tier_precedes_standard_regardless_of_numeric_order() {
        let specs = inventory(&[(900, Role::Agent), (999, Role::CoreInfra)]);
        assert_eq!(planned_ids(&specs), vec![999, 900]);
    }

    #[test]
    fn ascending_within_each_tier() {
        let specs = inventory(&[
            (993, Role::CoreInfra),
            (990, Role::CoreInfra),
            (300, Role::Agent),
            (101, Role::InferenceWorker),
            (1200, Role::None),
        ]);
        assert_eq!(planned_ids(&specs), vec![990, 993, 101, 300, 1200]);
    }

    #[test]
    fn empty_partitions_produce_empty_subsequences() {
        assert!(plan_order(&BTreeMap::new()).is_empty());

        let core_only = inventory(&[(991, Role::CoreInfra)]);
        assert_eq!(planned_ids(&core_only), vec![991]);

        let standard_only = inventory(&[(101, Role::Agent), (102, Role::Agent)]);
        assert_eq!(planned_ids(&standard_only), vec![101, 102]);
    }

    #[test]
    fn order_is_reproducible() {
        let specs = inventory(&[
            (999, Role::CoreInfra),
            (101, Role::InferenceWorker),
            (900, Role::Agent),
        ]);
        assert_eq!(planned_ids(&specs), planned_ids(&specs));
    }
}
