//! Per-container lifecycle driver.
//!
//! The driver never trusts remembered state: before acting it
//! re-derives the container's lifecycle position from observable facts
//! (existence, running, init-system readiness), so a re-run after a
//! partial failure resumes exactly where reality says it should.

use crate::hooks::{HookContext, HookRegistry};
use crate::retry::{with_retry, RetryPolicy};
use crate::CoreError;
use gantry_runtime::conf::{apply_plan, conf_path, read_directives};
use gantry_runtime::passthrough::{parse_assignment, plan_passthrough};
use gantry_runtime::ContainerBackend;
use gantry_schema::{CtId, ResourceSpec};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::Path;
use tracing::{debug, info};

/// Projection of a container's position in the lifecycle. Transitions
/// are strictly forward except `Failed`, reachable from any state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LifecycleState {
    Absent,
    Created,
    Running,
    Configured,
    Validated,
    Failed,
}

impl fmt::Display for LifecycleState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Absent => "absent",
            Self::Created => "created",
            Self::Running => "running",
            Self::Configured => "configured",
            Self::Validated => "validated",
            Self::Failed => "failed",
        };
        f.write_str(s)
    }
}

/// Terminal failure of one container's reconciliation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DriveFailure {
    /// Name of the operation whose retry budget ran out.
    pub operation: String,
    pub error: String,
    /// The furthest state the container had reached.
    pub last_state: LifecycleState,
}

pub struct Driver<'a> {
    backend: &'a dyn ContainerBackend,
    hooks: &'a HookRegistry,
    conf_dir: &'a Path,
    retry: RetryPolicy,
}

impl<'a> Driver<'a> {
    pub fn new(
        backend: &'a dyn ContainerBackend,
        hooks: &'a HookRegistry,
        conf_dir: &'a Path,
        retry: RetryPolicy,
    ) -> Self {
        Self {
            backend,
            hooks,
            conf_dir,
            retry,
        }
    }

    /// Derive the container's current state from the control surface.
    /// Only `Absent`, `Created`, and `Running` are observable;
    /// `Configured` and `Validated` are earned within a run.
    pub fn observe(&self, id: CtId) -> Result<LifecycleState, gantry_runtime::RuntimeError> {
        if !self.backend.exists(id)? {
            return Ok(LifecycleState::Absent);
        }
        if self.backend.is_running(id)? {
            Ok(LifecycleState::Running)
        } else {
            Ok(LifecycleState::Created)
        }
    }

    /// Drive the container to `Validated`, or report the terminal
    /// failure. Mutates the container and its config file; never the
    /// spec.
    pub fn advance(&self, spec: &ResourceSpec) -> Result<(), DriveFailure> {
        let id = spec.id;

        // A declared role with no registered hook is a configuration
        // bug; surface it before touching the container at all.
        if let Err(e) = self.hooks.resolve(id, spec.role) {
            return Err(DriveFailure {
                operation: "resolve-hook".to_owned(),
                error: e.to_string(),
                last_state: LifecycleState::Absent,
            });
        }

        let mut state = self
            .observe(id)
            .map_err(|e| DriveFailure {
                operation: "observe".to_owned(),
                error: e.to_string(),
                last_state: LifecycleState::Absent,
            })?;
        info!("container {id} ({}) observed {state}", spec.name);

        if state == LifecycleState::Absent {
            self.create(spec).map_err(|e| fail(e, state))?;
            state = LifecycleState::Created;
        }

        if state == LifecycleState::Created {
            self.start_and_probe(id).map_err(|e| fail(e, state))?;
            state = LifecycleState::Running;
        }

        if state == LifecycleState::Running {
            self.configure(spec).map_err(|e| fail(e, state))?;
            state = LifecycleState::Configured;
        }

        self.validate(spec).map_err(|e| fail(e, state))?;
        info!("container {id} ({}) validated", spec.name);
        Ok(())
    }

    fn create(&self, spec: &ResourceSpec) -> Result<(), CoreError> {
        let id = spec.id;
        with_retry(self.retry, "create", || {
            debug!("creating container {id} from {}", spec.template);
            self.backend.create(id, spec)
        })
    }

    /// Start the container and wait for its init system to settle.
    /// Each attempt re-checks the running flag so a retry after a
    /// slow-but-successful start does not start twice.
    fn start_and_probe(&self, id: CtId) -> Result<(), CoreError> {
        with_retry(self.retry, "start", || -> Result<(), String> {
            if !self.backend.is_running(id).map_err(|e| e.to_string())? {
                self.backend.start(id).map_err(|e| e.to_string())?;
            }
            self.probe_ready(id)
        })
    }

    fn probe_ready(&self, id: CtId) -> Result<(), String> {
        let out = self
            .backend
            .exec_command(
                id,
                &["systemctl".to_owned(), "is-system-running".to_owned()],
            )
            .map_err(|e| e.to_string())?;
        let status = out.stdout.trim();
        if status == "running" || status == "degraded" {
            Ok(())
        } else {
            Err(format!("init system not ready: '{status}'"))
        }
    }

    /// Running -> Configured: apply the device grant if it changed,
    /// restart when the on-disk grant changed, then run the role's
    /// configure hook.
    fn configure(&self, spec: &ResourceSpec) -> Result<(), CoreError> {
        let id = spec.id;

        // Malformed assignments are rejected outright, never retried
        // and never partially granted.
        let indices = parse_assignment(id, &spec.device_assignment)?;

        let conf = conf_path(self.conf_dir, id);
        let restart_required = with_retry(self.retry, "apply-passthrough", || {
            let current = read_directives(&conf)?;
            let plan = plan_passthrough(&indices, &current);
            if plan.is_empty() {
                debug!("container {id}: passthrough grant unchanged");
                return Ok::<_, gantry_runtime::RuntimeError>(false);
            }
            info!(
                "container {id}: passthrough diff -{} +{}",
                plan.to_remove.len(),
                plan.to_add.len()
            );
            apply_plan(&conf, &plan)?;
            Ok(plan.restart_required())
        })?;

        if restart_required {
            // A restart resets the init system; the hook must not run
            // until it has settled again.
            with_retry(self.retry, "restart", || -> Result<(), String> {
                if self.backend.is_running(id).map_err(|e| e.to_string())? {
                    self.backend.stop(id).map_err(|e| e.to_string())?;
                }
                self.backend.start(id).map_err(|e| e.to_string())?;
                self.probe_ready(id)
            })?;
        }

        let ctx = HookContext {
            id,
            spec,
            backend: self.backend,
        };
        with_retry(self.retry, "configure-hook", || {
            self.hooks.dispatch_configure(&ctx)
        })
    }

    /// Configured -> Validated: the role's verification checks.
    fn validate(&self, spec: &ResourceSpec) -> Result<(), CoreError> {
        let ctx = HookContext {
            id: spec.id,
            spec,
            backend: self.backend,
        };
        with_retry(self.retry, "validate-hook", || {
            self.hooks.dispatch_verify(&ctx)
        })
    }
}

fn fail(error: CoreError, last_state: LifecycleState) -> DriveFailure {
    let operation = match &error {
        CoreError::OperationFailed { operation, .. } => operation.clone(),
        CoreError::Runtime(gantry_runtime::RuntimeError::InvalidDeviceAssignment { .. }) => {
            "plan-passthrough".to_owned()
        }
        _ => "reconcile".to_owned(),
    };
    DriveFailure {
        operation,
        error: error.to_string(),
        last_state,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::hooks::{HookError, RoleHook};
    use gantry_runtime::mock::MockBackend;
    use gantry_runtime::passthrough::device_grant;
    use gantry_schema::{NetworkConfig, ResourceLimits, Role};

    struct OkHook;
    impl RoleHook for OkHook {
        fn configure(&self, _ctx: &HookContext<'_>) -> Result<(), HookError> {
            Ok(())
        }
    }

    fn spec(id: u32, role: Role, devices: &str) -> ResourceSpec {
        ResourceSpec {
            id: CtId::new(id),
            name: format!("ct-{id}"),
            role,
            template: "local:vztmpl/base.tar.zst".to_owned(),
            device_assignment: devices.to_owned(),
            features: Vec::new(),
            limits: ResourceLimits::default(),
            network: NetworkConfig {
                address: "dhcp".to_owned(),
                gateway: "auto".to_owned(),
            },
        }
    }

    fn registry() -> HookRegistry {
        let mut r = HookRegistry::new();
        r.register(Role::Agent, Box::new(OkHook));
        r
    }

    #[test]
    fn absent_container_reaches_validated() {
        let dir = tempfile::tempdir().unwrap();
        let backend = MockBackend::new();
        let hooks = registry();
        let driver = Driver::new(&backend, &hooks, dir.path(), RetryPolicy::immediate(3));

        let s = spec(101, Role::Agent, "0");
        driver.advance(&s).unwrap();

        assert!(backend.is_running(s.id).unwrap());
        let conf = conf_path(dir.path(), s.id);
        assert_eq!(read_directives(&conf).unwrap(), device_grant(&[0]));
        // Grant changed, so the container was restarted once.
        assert_eq!(backend.call_count("stop"), 1);
    }

    #[test]
    fn running_container_skips_create_and_start() {
        let dir = tempfile::tempdir().unwrap();
        let backend = MockBackend::new();
        backend.seed(CtId::new(101), true);
        let hooks = registry();
        let driver = Driver::new(&backend, &hooks, dir.path(), RetryPolicy::immediate(3));

        driver.advance(&spec(101, Role::Agent, "")).unwrap();

        assert_eq!(backend.call_count("create"), 0);
        assert_eq!(backend.call_count("start"), 0);
    }

    #[test]
    fn second_advance_applies_no_passthrough_diff() {
        let dir = tempfile::tempdir().unwrap();
        let backend = MockBackend::new();
        let hooks = registry();
        let driver = Driver::new(&backend, &hooks, dir.path(), RetryPolicy::immediate(3));

        let s = spec(101, Role::Agent, "0,1");
        driver.advance(&s).unwrap();
        let stops_after_first = backend.call_count("stop");

        driver.advance(&s).unwrap();
        // No grant change on the second run, so no further restart.
        assert_eq!(backend.call_count("stop"), stops_after_first);
    }

    #[test]
    fn transient_create_failure_is_retried() {
        let dir = tempfile::tempdir().unwrap();
        let backend = MockBackend::new();
        backend.fail_next("create", 2);
        let hooks = registry();
        let driver = Driver::new(&backend, &hooks, dir.path(), RetryPolicy::immediate(3));

        driver.advance(&spec(101, Role::Agent, "")).unwrap();
        assert_eq!(backend.call_count("create"), 3);
    }

    #[test]
    fn exhausted_create_reports_operation_and_state() {
        let dir = tempfile::tempdir().unwrap();
        let backend = MockBackend::new();
        backend.fail_next("create", 3);
        let hooks = registry();
        let driver = Driver::new(&backend, &hooks, dir.path(), RetryPolicy::immediate(3));

        let failure = driver.advance(&spec(101, Role::Agent, "")).unwrap_err();
        assert_eq!(failure.operation, "create");
        assert_eq!(failure.last_state, LifecycleState::Absent);
        assert!(failure.error.contains("3 attempt"));
    }

    #[test]
    fn malformed_assignment_fails_without_partial_grant() {
        let dir = tempfile::tempdir().unwrap();
        let backend = MockBackend::new();
        let hooks = registry();
        let driver = Driver::new(&backend, &hooks, dir.path(), RetryPolicy::immediate(3));

        let s = spec(101, Role::Agent, "0,x");
        let failure = driver.advance(&s).unwrap_err();
        assert_eq!(failure.operation, "plan-passthrough");
        assert_eq!(failure.last_state, LifecycleState::Running);
        assert!(failure.error.contains("'x'"));
        // Nothing was written to the config file.
        let conf = conf_path(dir.path(), s.id);
        assert!(read_directives(&conf).unwrap().is_empty());
    }

    #[test]
    fn unregistered_role_fails_before_any_container_work() {
        let dir = tempfile::tempdir().unwrap();
        let backend = MockBackend::new();
        let hooks = HookRegistry::new();
        let driver = Driver::new(&backend, &hooks, dir.path(), RetryPolicy::immediate(3));

        let failure = driver
            .advance(&spec(101, Role::InferenceWorker, ""))
            .unwrap_err();
        assert_eq!(failure.operation, "resolve-hook");
        assert!(backend.calls().is_empty());
    }

    #[test]
    fn restart_after_grant_change_reprobes_readiness() {
        let dir = tempfile::tempdir().unwrap();
        let backend = MockBackend::new();
        let hooks = registry();
        let driver = Driver::new(&backend, &hooks, dir.path(), RetryPolicy::immediate(3));

        driver.advance(&spec(101, Role::Agent, "0")).unwrap();

        // One probe after the initial start, one after the restart the
        // grant change triggered.
        assert_eq!(backend.call_count("stop"), 1);
        assert_eq!(backend.call_count("exec"), 2);
    }

    #[test]
    fn unassignment_strips_grant_and_restarts() {
        let dir = tempfile::tempdir().unwrap();
        let backend = MockBackend::new();
        let hooks = registry();
        let driver = Driver::new(&backend, &hooks, dir.path(), RetryPolicy::immediate(3));

        driver.advance(&spec(101, Role::Agent, "0")).unwrap();
        let conf = conf_path(dir.path(), CtId::new(101));
        assert!(!read_directives(&conf).unwrap().is_empty());

        driver.advance(&spec(101, Role::Agent, "")).unwrap();
        assert!(read_directives(&conf).unwrap().is_empty());
        assert_eq!(backend.call_count("stop"), 2);
    }
}
