//! In-memory backend for engine and CLI tests.
//!
//! Tracks per-container existence and running state, records every
//! call, and can be scripted to fail the next N invocations of an
//! operation so retry and rollback paths are exercisable without a
//! container host.

use crate::backend::{ContainerBackend, ExecOutput};
use crate::RuntimeError;
use gantry_schema::{CtId, ResourceSpec};
use std::collections::HashMap;
use std::sync::Mutex;

#[derive(Debug, Clone, Copy, Default)]
struct MockContainer {
    running: bool,
}

#[derive(Default)]
pub struct MockBackend {
    state: Mutex<HashMap<CtId, MockContainer>>,
    failures: Mutex<HashMap<String, u32>>,
    calls: Mutex<Vec<String>>,
}

impl MockBackend {
    pub fn new() -> Self {
        Self::default()
    }

    /// Seed a container as already existing, optionally running, so
    /// resume-from-partial-run behavior can be tested.
    pub fn seed(&self, id: CtId, running: bool) {
        let mut state = self.state.lock().expect("mock state lock");
        state.insert(id, MockContainer { running });
    }

    /// Script the next `times` invocations of `op` to fail. `op` is one
    /// of `create`, `start`, `stop`, `destroy`, `exec`.
    pub fn fail_next(&self, op: &str, times: u32) {
        let mut failures = self.failures.lock().expect("mock failures lock");
        *failures.entry(op.to_owned()).or_insert(0) += times;
    }

    /// Every operation invoked so far, as `"<op> <id>"` strings.
    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().expect("mock calls lock").clone()
    }

    pub fn call_count(&self, prefix: &str) -> usize {
        self.calls()
            .iter()
            .filter(|c| c.starts_with(prefix))
            .count()
    }

    fn record(&self, op: &str, id: CtId) {
        self.calls
            .lock()
            .expect("mock calls lock")
            .push(format!("{op} {id}"));
    }

    fn should_fail(&self, op: &str) -> bool {
        let mut failures = self.failures.lock().expect("mock failures lock");
        match failures.get_mut(op) {
            Some(remaining) if *remaining > 0 => {
                *remaining -= 1;
                true
            }
            _ => false,
        }
    }

    fn fail(&self, op: &str, id: CtId) -> RuntimeError {
        RuntimeError::CommandFailed {
            program: "mock".to_owned(),
            id,
            detail: format!("scripted {op} failure"),
        }
    }
}

impl ContainerBackend for MockBackend {
    fn name(&self) -> &str {
        "mock"
    }

    fn available(&self) -> bool {
        true
    }

    fn exists(&self, id: CtId) -> Result<bool, RuntimeError> {
        let state = self.state.lock().expect("mock state lock");
        Ok(state.contains_key(&id))
    }

    fn is_running(&self, id: CtId) -> Result<bool, RuntimeError> {
        let state = self.state.lock().expect("mock state lock");
        Ok(state.get(&id).is_some_and(|c| c.running))
    }

    fn create(&self, id: CtId, _spec: &ResourceSpec) -> Result<(), RuntimeError> {
        self.record("create", id);
        if self.should_fail("create") {
            return Err(self.fail("create", id));
        }
        let mut state = self.state.lock().expect("mock state lock");
        state.insert(id, MockContainer { running: false });
        Ok(())
    }

    fn start(&self, id: CtId) -> Result<(), RuntimeError> {
        self.record("start", id);
        if self.should_fail("start") {
            return Err(self.fail("start", id));
        }
        let mut state = self.state.lock().expect("mock state lock");
        match state.get_mut(&id) {
            Some(container) => {
                container.running = true;
                Ok(())
            }
            None => Err(RuntimeError::NotFound(id)),
        }
    }

    fn stop(&self, id: CtId) -> Result<(), RuntimeError> {
        self.record("stop", id);
        if self.should_fail("stop") {
            return Err(self.fail("stop", id));
        }
        let mut state = self.state.lock().expect("mock state lock");
        match state.get_mut(&id) {
            Some(container) => {
                container.running = false;
                Ok(())
            }
            None => Err(RuntimeError::NotFound(id)),
        }
    }

    fn destroy(&self, id: CtId) -> Result<(), RuntimeError> {
        self.record("destroy", id);
        if self.should_fail("destroy") {
            return Err(self.fail("destroy", id));
        }
        let mut state = self.state.lock().expect("mock state lock");
        state.remove(&id);
        Ok(())
    }

    fn exec_command(&self, id: CtId, command: &[String]) -> Result<ExecOutput, RuntimeError> {
        self.record("exec", id);
        {
            let state = self.state.lock().expect("mock state lock");
            if !state.get(&id).is_some_and(|c| c.running) {
                return Err(RuntimeError::NotFound(id));
            }
        }
        if self.should_fail("exec") {
            return Ok(ExecOutput {
                stdout: "starting\n".to_owned(),
                exit_code: 1,
            });
        }
        // The driver's readiness probe expects `running` on stdout.
        let stdout = if command.first().is_some_and(|c| c == "systemctl") {
            "running\n".to_owned()
        } else {
            format!("mock-exec: {}\n", command.join(" "))
        };
        Ok(ExecOutput {
            stdout,
            exit_code: 0,
        })
    }
}
