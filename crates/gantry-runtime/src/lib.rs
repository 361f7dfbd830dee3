//! Container control surface and device passthrough for Gantry.
//!
//! This crate implements the execution layer: the pluggable
//! `ContainerBackend` trait with an LXC (`pct`) backend and an
//! in-memory mock, the passthrough planner that diffs typed device
//! directives against a container's current config, and the
//! line-oriented apply step that rewrites only the managed directives
//! of a container config file.

pub mod backend;
pub mod conf;
pub mod lxc;
pub mod mock;
pub mod passthrough;

pub use backend::{select_backend, ContainerBackend, ExecOutput};
pub use conf::{apply_plan, read_directives};
pub use passthrough::{parse_assignment, plan_passthrough, Directive, PassthroughPlan};

use gantry_schema::CtId;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum RuntimeError {
    #[error("runtime I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("backend '{0}' is not available on this system")]
    BackendUnavailable(String),
    #[error("container {0} does not exist")]
    NotFound(CtId),
    #[error("invalid device assignment for container {id}: token '{token}'")]
    InvalidDeviceAssignment { id: CtId, token: String },
    #[error("{program} failed for container {id}: {detail}")]
    CommandFailed {
        program: String,
        id: CtId,
        detail: String,
    },
    #[error("exec in container {id} failed: {detail}")]
    ExecFailed { id: CtId, detail: String },
}
