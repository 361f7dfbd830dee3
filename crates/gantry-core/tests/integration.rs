//! End-to-end engine behavior against the mock backend.

use gantry_core::hooks::{HookContext, HookError, HookRegistry, RoleHook};
use gantry_core::{Engine, EngineConfig, LifecycleState, RetryPolicy, RollbackPolicy};
use gantry_runtime::conf::{conf_path, read_directives};
use gantry_runtime::mock::MockBackend;
use gantry_runtime::passthrough::device_grant;
use gantry_schema::{load_inventory_str, CtId, Role, Tier};
use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

struct OkHook;
impl RoleHook for OkHook {
    fn configure(&self, _ctx: &HookContext<'_>) -> Result<(), HookError> {
        Ok(())
    }
}

/// Fails configuration forever, counting invocations.
struct BrokenHook(Arc<AtomicUsize>);
impl RoleHook for BrokenHook {
    fn configure(&self, _ctx: &HookContext<'_>) -> Result<(), HookError> {
        self.0.fetch_add(1, Ordering::SeqCst);
        Err(HookError("vllm service failed to come up".to_owned()))
    }
}

fn registry_all() -> HookRegistry {
    let mut r = HookRegistry::new();
    r.register(Role::CoreInfra, Box::new(OkHook));
    r.register(Role::InferenceWorker, Box::new(OkHook));
    r.register(Role::Agent, Box::new(OkHook));
    r
}

fn engine_with(backend: MockBackend, hooks: HookRegistry, dir: &Path, rollback: bool) -> Engine {
    Engine::new(
        Box::new(backend),
        hooks,
        EngineConfig {
            conf_dir: dir.to_path_buf(),
            retry: RetryPolicy::immediate(3),
            rollback: RollbackPolicy {
                rollback_on_failure: rollback,
            },
            halt_on_core_failure: false,
        },
    )
}

const INVENTORY: &str = r#"
inventory_version = 1

[resources.999]
name = "registry"
template = "local:vztmpl/base.tar.zst"
role = "core-infra"

[resources.999.network]
address = "10.0.0.9/24"
gateway = "10.0.0.1"

[resources.900]
name = "agent-0"
template = "local:vztmpl/base.tar.zst"
role = "agent"

[resources.900.network]
address = "10.0.0.90/24"
gateway = "10.0.0.1"

[resources.101]
name = "vllm-a"
template = "local:vztmpl/base.tar.zst"
role = "inference-worker"
device_assignment = "0,1"

[resources.101.network]
address = "10.0.0.101/24"
gateway = "10.0.0.1"
"#;

#[test]
fn planned_order_puts_core_tier_first() {
    let dir = tempfile::tempdir().unwrap();
    let specs = load_inventory_str(INVENTORY).unwrap();
    let engine = engine_with(MockBackend::new(), registry_all(), dir.path(), false);

    let report = engine.reconcile(&specs);
    let ids: Vec<u32> = report.outcomes.iter().map(|o| o.id.as_u32()).collect();
    assert_eq!(ids, vec![999, 101, 900]);
    assert_eq!(report.outcomes[0].tier, Tier::Core);
    assert!(report.success());
}

#[test]
fn full_run_leaves_device_grant_on_disk() {
    let dir = tempfile::tempdir().unwrap();
    let specs = load_inventory_str(INVENTORY).unwrap();
    let engine = engine_with(MockBackend::new(), registry_all(), dir.path(), false);

    let report = engine.reconcile(&specs);
    assert!(report.success());

    let conf = conf_path(dir.path(), CtId::new(101));
    assert_eq!(read_directives(&conf).unwrap(), device_grant(&[0, 1]));
    // Containers without an assignment get no config file at all.
    assert!(!conf_path(dir.path(), CtId::new(900)).exists());
}

#[test]
fn rerun_resumes_without_recreating() {
    let dir = tempfile::tempdir().unwrap();
    let specs = load_inventory_str(INVENTORY).unwrap();

    // All containers already exist and run, as after a prior partial
    // run; reconciliation must still validate everything.
    let backend = MockBackend::new();
    for spec in specs.values() {
        backend.seed(spec.id, true);
    }
    // Any create would fail, proving none is attempted.
    backend.fail_next("create", u32::MAX);
    let engine = engine_with(backend, registry_all(), dir.path(), false);

    let report = engine.reconcile(&specs);
    assert!(report.success());
    assert_eq!(report.validated_count(), 3);
}

#[test]
fn hook_failure_rolls_back_exactly_once_with_unchanged_reason() {
    let dir = tempfile::tempdir().unwrap();
    let specs = load_inventory_str(INVENTORY).unwrap();

    let invocations = Arc::new(AtomicUsize::new(0));
    let mut hooks = registry_all();
    hooks.register(
        Role::InferenceWorker,
        Box::new(BrokenHook(Arc::clone(&invocations))),
    );

    let backend = MockBackend::new();
    let engine = engine_with(backend, hooks, dir.path(), true);
    let report = engine.reconcile(&specs);

    assert!(!report.success());
    // Three retry attempts of the configure hook.
    assert_eq!(invocations.load(Ordering::SeqCst), 3);

    let failed = report.first_failure().expect("one failed container");
    assert_eq!(failed.id, CtId::new(101));
    assert_eq!(failed.state, LifecycleState::Failed);
    let detail = failed.failure.as_ref().unwrap();
    assert_eq!(detail.operation, "configure-hook");
    assert!(detail.error.contains("vllm service failed to come up"));

    // Rollback did not cascade: the other two containers validated.
    assert_eq!(report.validated_count(), 2);
}

#[test]
fn core_tier_failure_does_not_block_standard_tier_by_default() {
    let dir = tempfile::tempdir().unwrap();
    let specs = load_inventory_str(INVENTORY).unwrap();

    let backend = MockBackend::new();
    // Core-tier container 999 is reconciled first; exhaust its create
    // budget so it fails terminally.
    backend.fail_next("create", 3);
    let engine = engine_with(backend, registry_all(), dir.path(), false);
    let report = engine.reconcile(&specs);

    assert!(!report.success());
    assert_eq!(report.first_failure().unwrap().id, CtId::new(999));
    // Standard tier still attempted and succeeded independently.
    assert_eq!(report.validated_count(), 2);
    assert!(report.outcomes.iter().all(|o| o.skipped.is_none()));
}

#[test]
fn core_tier_failure_halts_standard_tier_when_configured() {
    let dir = tempfile::tempdir().unwrap();
    let specs = load_inventory_str(INVENTORY).unwrap();

    let backend = MockBackend::new();
    backend.fail_next("create", 3);
    let engine = Engine::new(
        Box::new(backend),
        registry_all(),
        EngineConfig {
            conf_dir: dir.path().to_path_buf(),
            retry: RetryPolicy::immediate(3),
            rollback: RollbackPolicy::default(),
            halt_on_core_failure: true,
        },
    );
    let report = engine.reconcile(&specs);

    assert_eq!(report.first_failure().unwrap().id, CtId::new(999));
    let skipped: Vec<u32> = report
        .outcomes
        .iter()
        .filter(|o| o.skipped.is_some())
        .map(|o| o.id.as_u32())
        .collect();
    assert_eq!(skipped, vec![101, 900]);
}

#[test]
fn malformed_assignment_fails_only_its_container() {
    let dir = tempfile::tempdir().unwrap();
    let inventory = INVENTORY.replace("device_assignment = \"0,1\"", "device_assignment = \"0,x\"");
    let specs = load_inventory_str(&inventory).unwrap();

    let engine = engine_with(MockBackend::new(), registry_all(), dir.path(), false);
    let report = engine.reconcile(&specs);

    let failed = report.first_failure().unwrap();
    assert_eq!(failed.id, CtId::new(101));
    assert_eq!(failed.failure.as_ref().unwrap().operation, "plan-passthrough");
    assert_eq!(report.validated_count(), 2);
    // No partial grant was written.
    assert!(read_directives(&conf_path(dir.path(), CtId::new(101)))
        .unwrap()
        .is_empty());
}

#[test]
fn unregistered_role_fails_only_its_container() {
    let dir = tempfile::tempdir().unwrap();
    let specs = load_inventory_str(INVENTORY).unwrap();

    let mut hooks = HookRegistry::new();
    hooks.register(Role::CoreInfra, Box::new(OkHook));
    hooks.register(Role::Agent, Box::new(OkHook));
    // inference-worker deliberately unregistered.

    let engine = engine_with(MockBackend::new(), hooks, dir.path(), false);
    let report = engine.reconcile(&specs);

    let failed = report.first_failure().unwrap();
    assert_eq!(failed.id, CtId::new(101));
    assert_eq!(failed.failure.as_ref().unwrap().operation, "resolve-hook");
    assert!(failed
        .failure
        .as_ref()
        .unwrap()
        .error
        .contains("inference-worker"));
    assert_eq!(report.validated_count(), 2);
}

#[test]
fn report_serializes_to_json() {
    let dir = tempfile::tempdir().unwrap();
    let specs = load_inventory_str(INVENTORY).unwrap();
    let engine = engine_with(MockBackend::new(), registry_all(), dir.path(), false);

    let report = engine.reconcile(&specs);
    let json = serde_json::to_string_pretty(&report).unwrap();
    assert!(json.contains("\"validated\""));
    assert!(json.contains("\"999\"") || json.contains("999"));

    let back: gantry_core::RunReport = serde_json::from_str(&json).unwrap();
    assert_eq!(back.outcomes.len(), report.outcomes.len());
}
