use crate::RuntimeError;
use gantry_schema::{CtId, ResourceSpec};

/// Captured result of a command run inside a container.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExecOutput {
    pub stdout: String,
    pub exit_code: i32,
}

impl ExecOutput {
    pub fn success(&self) -> bool {
        self.exit_code == 0
    }
}

/// The seven operations the engine needs from a container runtime.
///
/// Everything the reconciler does to a container goes through this
/// trait; the `pct` CLI backend and the in-memory mock are the only
/// implementations. Probes (`exists`, `is_running`) must be side-effect
/// free so lifecycle state can be re-derived on every run.
pub trait ContainerBackend: Send + Sync {
    fn name(&self) -> &str;

    fn available(&self) -> bool;

    fn exists(&self, id: CtId) -> Result<bool, RuntimeError>;

    fn is_running(&self, id: CtId) -> Result<bool, RuntimeError>;

    /// Create the container from its template. The container is left
    /// stopped; device passthrough is applied later, against the
    /// config file the runtime wrote.
    fn create(&self, id: CtId, spec: &ResourceSpec) -> Result<(), RuntimeError>;

    fn start(&self, id: CtId) -> Result<(), RuntimeError>;

    fn stop(&self, id: CtId) -> Result<(), RuntimeError>;

    fn destroy(&self, id: CtId) -> Result<(), RuntimeError>;

    /// Run a command inside the container, capturing stdout and the
    /// exit code. A non-zero exit is a normal `Ok` result; `Err` means
    /// the command could not be run at all.
    fn exec_command(&self, id: CtId, command: &[String]) -> Result<ExecOutput, RuntimeError>;
}

pub fn select_backend(name: &str) -> Result<Box<dyn ContainerBackend>, RuntimeError> {
    match name {
        "lxc" => Ok(Box::new(crate::lxc::LxcBackend::new())),
        "mock" => Ok(Box::new(crate::mock::MockBackend::new())),
        other => Err(RuntimeError::BackendUnavailable(other.to_owned())),
    }
}
