//! Rollback of terminally failed containers.
//!
//! Best-effort by contract: destroy-time errors are logged and never
//! re-raised, so the original failure is always the one the caller
//! sees. Rollback never cascades to containers that already validated.

use gantry_runtime::ContainerBackend;
use gantry_schema::ResourceSpec;
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
pub struct RollbackPolicy {
    /// Destroy a container that reached `Failed`. Off by default:
    /// partial state is left for operator inspection.
    pub rollback_on_failure: bool,
}

/// Handle one container's terminal failure according to policy.
pub fn on_failure(backend: &dyn ContainerBackend, spec: &ResourceSpec, policy: RollbackPolicy) {
    let id = spec.id;
    if !policy.rollback_on_failure {
        info!("container {id} left in failed state for inspection");
        return;
    }

    info!("rolling back container {id}");
    match backend.is_running(id) {
        Ok(true) => {
            if let Err(e) = backend.stop(id) {
                warn!("rollback: stop of container {id} failed: {e}");
            }
        }
        Ok(false) => {}
        Err(e) => warn!("rollback: running probe for container {id} failed: {e}"),
    }
    match backend.exists(id) {
        Ok(true) => {
            if let Err(e) = backend.destroy(id) {
                warn!("rollback of container {id} failed: {e}");
            }
        }
        Ok(false) => {}
        Err(e) => warn!("rollback: existence probe for container {id} failed: {e}"),
    }
}
