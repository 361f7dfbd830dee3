use crate::driver::{DriveFailure, Driver, LifecycleState};
use crate::hooks::HookRegistry;
use crate::retry::RetryPolicy;
use crate::rollback::{self, RollbackPolicy};
use crate::scheduler::plan_order;
use crate::CoreError;
use gantry_runtime::conf::{conf_path, read_directives};
use gantry_runtime::passthrough::{parse_assignment, plan_passthrough, PassthroughPlan};
use gantry_runtime::ContainerBackend;
use gantry_schema::{load_inventory, CtId, ResourceSpec, Role, Tier};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tracing::{info, warn};

/// Run-wide knobs, resolved once at startup instead of read from the
/// environment mid-run.
#[derive(Debug, Clone)]
pub struct EngineConfig {
    /// Directory holding per-container config files (`<id>.conf`).
    pub conf_dir: PathBuf,
    pub retry: RetryPolicy,
    pub rollback: RollbackPolicy,
    /// Skip the standard tier once a core-tier container fails
    /// terminally. Off by default: each failure surfaces on its own.
    pub halt_on_core_failure: bool,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            conf_dir: PathBuf::from("/etc/pve/lxc"),
            retry: RetryPolicy::default(),
            rollback: RollbackPolicy::default(),
            halt_on_core_failure: false,
        }
    }
}

/// Sequential reconciliation engine.
///
/// One engine instance per inventory at a time is assumed, not
/// enforced: the only write contention point is each container's own
/// config file, which only this engine mutates.
pub struct Engine {
    backend: Box<dyn ContainerBackend>,
    hooks: HookRegistry,
    config: EngineConfig,
    cancel: Arc<AtomicBool>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FailureDetail {
    pub operation: String,
    pub error: String,
}

/// Final state of one container after a run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResourceOutcome {
    pub id: CtId,
    pub name: String,
    pub role: Role,
    pub tier: Tier,
    pub state: LifecycleState,
    /// Reason this container was not attempted, if any.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub skipped: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub failure: Option<FailureDetail>,
}

/// Summary of a whole reconciliation run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunReport {
    pub started_at: String,
    pub finished_at: String,
    pub interrupted: bool,
    pub outcomes: Vec<ResourceOutcome>,
}

impl RunReport {
    pub fn success(&self) -> bool {
        !self.interrupted
            && self
                .outcomes
                .iter()
                .all(|o| o.state == LifecycleState::Validated)
    }

    pub fn first_failure(&self) -> Option<&ResourceOutcome> {
        self.outcomes
            .iter()
            .find(|o| o.state == LifecycleState::Failed)
    }

    pub fn validated_count(&self) -> usize {
        self.outcomes
            .iter()
            .filter(|o| o.state == LifecycleState::Validated)
            .count()
    }
}

/// One entry of a dry-run plan: where the container is now and what
/// the passthrough apply step would change.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PlannedAction {
    pub id: CtId,
    pub name: String,
    pub role: Role,
    pub tier: Tier,
    /// `None` when the control surface could not be probed.
    pub current_state: Option<LifecycleState>,
    pub passthrough: Result<PassthroughPlan, String>,
}

impl Engine {
    pub fn new(backend: Box<dyn ContainerBackend>, hooks: HookRegistry, config: EngineConfig) -> Self {
        Self {
            backend,
            hooks,
            config,
            cancel: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Flag checked between containers; set it (e.g. from a signal
    /// handler) to abort before the next container starts.
    pub fn cancel_flag(&self) -> Arc<AtomicBool> {
        Arc::clone(&self.cancel)
    }

    /// Load, order, and reconcile an inventory file. Only an invalid
    /// inventory aborts before any container is touched; per-container
    /// failures are reported in the [`RunReport`].
    pub fn reconcile_file(&self, inventory: &Path) -> Result<RunReport, CoreError> {
        info!("loading inventory from {}", inventory.display());
        let specs = load_inventory(inventory)?;
        Ok(self.reconcile(&specs))
    }

    pub fn reconcile(&self, specs: &BTreeMap<CtId, ResourceSpec>) -> RunReport {
        let order = plan_order(specs);
        info!(
            "reconciling {} container(s) via {} backend",
            order.len(),
            self.backend.name()
        );

        let driver = Driver::new(
            self.backend.as_ref(),
            &self.hooks,
            &self.config.conf_dir,
            self.config.retry,
        );

        let started_at = chrono::Utc::now().to_rfc3339();
        let mut outcomes = Vec::with_capacity(order.len());
        let mut interrupted = false;
        let mut core_tier_failed = false;

        for spec in order {
            if self.cancel.load(Ordering::SeqCst) {
                interrupted = true;
                outcomes.push(self.skipped(&driver, spec, "run interrupted"));
                continue;
            }
            if core_tier_failed
                && self.config.halt_on_core_failure
                && spec.tier() == Tier::Standard
            {
                outcomes.push(self.skipped(&driver, spec, "core tier failed to validate"));
                continue;
            }

            match driver.advance(spec) {
                Ok(()) => outcomes.push(outcome(spec, LifecycleState::Validated, None, None)),
                Err(failure) => {
                    warn!(
                        "container {} failed at {}: {}",
                        spec.id, failure.operation, failure.error
                    );
                    if spec.tier() == Tier::Core {
                        core_tier_failed = true;
                    }
                    // Rollback is best-effort and cannot change the
                    // reported failure.
                    rollback::on_failure(self.backend.as_ref(), spec, self.config.rollback);
                    outcomes.push(failed_outcome(spec, failure));
                }
            }
        }

        RunReport {
            started_at,
            finished_at: chrono::Utc::now().to_rfc3339(),
            interrupted,
            outcomes,
        }
    }

    /// Dry run: planned order plus the passthrough diff each container
    /// would receive. No side effects.
    pub fn plan(&self, specs: &BTreeMap<CtId, ResourceSpec>) -> Vec<PlannedAction> {
        let driver = Driver::new(
            self.backend.as_ref(),
            &self.hooks,
            &self.config.conf_dir,
            self.config.retry,
        );
        plan_order(specs)
            .into_iter()
            .map(|spec| {
                let passthrough = parse_assignment(spec.id, &spec.device_assignment)
                    .and_then(|indices| {
                        let conf = conf_path(&self.config.conf_dir, spec.id);
                        let current = read_directives(&conf)?;
                        Ok(plan_passthrough(&indices, &current))
                    })
                    .map_err(|e| e.to_string());
                PlannedAction {
                    id: spec.id,
                    name: spec.name.clone(),
                    role: spec.role,
                    tier: spec.tier(),
                    current_state: driver.observe(spec.id).ok(),
                    passthrough,
                }
            })
            .collect()
    }

    fn skipped(&self, driver: &Driver<'_>, spec: &ResourceSpec, reason: &str) -> ResourceOutcome {
        info!("container {} skipped: {reason}", spec.id);
        let state = driver.observe(spec.id).unwrap_or(LifecycleState::Absent);
        outcome(spec, state, Some(reason.to_owned()), None)
    }
}

fn outcome(
    spec: &ResourceSpec,
    state: LifecycleState,
    skipped: Option<String>,
    failure: Option<FailureDetail>,
) -> ResourceOutcome {
    ResourceOutcome {
        id: spec.id,
        name: spec.name.clone(),
        role: spec.role,
        tier: spec.tier(),
        state,
        skipped,
        failure,
    }
}

fn failed_outcome(spec: &ResourceSpec, failure: DriveFailure) -> ResourceOutcome {
    outcome(
        spec,
        LifecycleState::Failed,
        None,
        Some(FailureDetail {
            operation: failure.operation,
            error: failure.error,
        }),
    )
}
