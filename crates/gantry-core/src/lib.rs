//! Reconciliation engine for Gantry container fleets.
//!
//! This crate ties inventory specs and the container control surface
//! together into the `Engine`: priority-tier scheduling, the per-container
//! lifecycle driver with bounded retries, extension hook dispatch,
//! rollback on terminal failure, and the run report. Execution is
//! strictly sequential; the tier ordering is a dependency ordering, not
//! a parallelism opportunity.

pub mod driver;
pub mod engine;
pub mod hooks;
pub mod interrupt;
pub mod retry;
pub mod rollback;
pub mod scheduler;

pub use driver::{Driver, DriveFailure, LifecycleState};
pub use engine::{Engine, EngineConfig, FailureDetail, PlannedAction, ResourceOutcome, RunReport};
pub use hooks::{HookContext, HookError, HookRegistry, RoleHook, ScriptHook};
pub use interrupt::install_signal_handler;
pub use retry::{with_retry, AttemptRecord, Backoff, RetryPolicy};
pub use rollback::RollbackPolicy;
pub use scheduler::plan_order;

use gantry_schema::{CtId, Role};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum CoreError {
    #[error("inventory error: {0}")]
    Inventory(#[from] gantry_schema::InventoryError),
    #[error("runtime error: {0}")]
    Runtime(#[from] gantry_runtime::RuntimeError),
    #[error("no hook registered for role '{role}' of container {id}")]
    UnregisteredRole { id: CtId, role: Role },
    #[error("{operation} failed after {attempts} attempt(s): {last_error}")]
    OperationFailed {
        operation: String,
        attempts: u32,
        last_error: String,
    },
    #[error("{phase} hook for role '{role}' failed: {detail}")]
    HookFailed {
        role: Role,
        phase: &'static str,
        detail: String,
    },
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}
