//! LXC backend driving the Proxmox `pct` tool.
//!
//! Every operation shells out to `pct`; gantry keeps no state of its
//! own about containers. Requires root on a Proxmox host, which is why
//! all engine tests run against the mock backend instead.

use crate::backend::{ContainerBackend, ExecOutput};
use crate::RuntimeError;
use gantry_schema::{CtId, ResourceSpec};
use std::process::{Command, Output};
use tracing::debug;

pub struct LxcBackend {
    program: String,
}

impl Default for LxcBackend {
    fn default() -> Self {
        Self {
            program: "pct".to_owned(),
        }
    }
}

impl LxcBackend {
    pub fn new() -> Self {
        Self::default()
    }

    /// Use a different control binary, e.g. a wrapper script.
    pub fn with_program(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
        }
    }

    fn run(&self, id: CtId, args: &[String]) -> Result<Output, RuntimeError> {
        debug!("{} {}", self.program, args.join(" "));
        let output = Command::new(&self.program).args(args).output()?;
        if output.status.success() {
            Ok(output)
        } else {
            Err(RuntimeError::CommandFailed {
                program: self.program.clone(),
                id,
                detail: command_failure_detail(&output),
            })
        }
    }

    fn status_output(&self, id: CtId) -> Result<Option<String>, RuntimeError> {
        let output = Command::new(&self.program)
            .args(["status", &id.to_string()])
            .output()?;
        if output.status.success() {
            return Ok(Some(String::from_utf8_lossy(&output.stdout).into_owned()));
        }
        let stderr = String::from_utf8_lossy(&output.stderr);
        if stderr.contains("does not exist") {
            return Ok(None);
        }
        Err(RuntimeError::CommandFailed {
            program: self.program.clone(),
            id,
            detail: command_failure_detail(&output),
        })
    }
}

fn command_failure_detail(output: &Output) -> String {
    let stderr = String::from_utf8_lossy(&output.stderr);
    let stderr = stderr.trim();
    match output.status.code() {
        Some(code) if stderr.is_empty() => format!("exit code {code}"),
        Some(code) => format!("exit code {code}: {stderr}"),
        None => format!("killed by signal: {stderr}"),
    }
}

fn create_args(id: CtId, spec: &ResourceSpec) -> Vec<String> {
    let mut args = vec![
        "create".to_owned(),
        id.to_string(),
        spec.template.clone(),
        "--hostname".to_owned(),
        spec.name.clone(),
        "--net0".to_owned(),
        format!(
            "name=eth0,bridge=vmbr0,ip={},gw={}",
            spec.network.address, spec.network.gateway
        ),
        "--unprivileged".to_owned(),
        "0".to_owned(),
    ];
    if let Some(memory_mb) = spec.limits.memory_mb {
        args.push("--memory".to_owned());
        args.push(memory_mb.to_string());
    }
    if let Some(cores) = spec.limits.cores {
        args.push("--cores".to_owned());
        args.push(cores.to_string());
    }
    if let Some(disk_gb) = spec.limits.disk_gb {
        args.push("--rootfs".to_owned());
        args.push(format!("local-lvm:{disk_gb}"));
    }
    if !spec.features.is_empty() {
        let features: Vec<String> = spec.features.iter().map(|f| format!("{f}=1")).collect();
        args.push("--features".to_owned());
        args.push(features.join(","));
    }
    args
}

impl ContainerBackend for LxcBackend {
    fn name(&self) -> &str {
        "lxc"
    }

    fn available(&self) -> bool {
        Command::new(&self.program)
            .arg("--version")
            .output()
            .map(|o| o.status.success())
            .unwrap_or(false)
    }

    fn exists(&self, id: CtId) -> Result<bool, RuntimeError> {
        Ok(self.status_output(id)?.is_some())
    }

    fn is_running(&self, id: CtId) -> Result<bool, RuntimeError> {
        match self.status_output(id)? {
            Some(status) => Ok(status.contains("status: running")),
            None => Ok(false),
        }
    }

    fn create(&self, id: CtId, spec: &ResourceSpec) -> Result<(), RuntimeError> {
        self.run(id, &create_args(id, spec)).map(|_| ())
    }

    fn start(&self, id: CtId) -> Result<(), RuntimeError> {
        self.run(id, &["start".to_owned(), id.to_string()]).map(|_| ())
    }

    fn stop(&self, id: CtId) -> Result<(), RuntimeError> {
        self.run(id, &["stop".to_owned(), id.to_string()]).map(|_| ())
    }

    fn destroy(&self, id: CtId) -> Result<(), RuntimeError> {
        self.run(
            id,
            &[
                "destroy".to_owned(),
                id.to_string(),
                "--purge".to_owned(),
                "--force".to_owned(),
            ],
        )
        .map(|_| ())
    }

    fn exec_command(&self, id: CtId, command: &[String]) -> Result<ExecOutput, RuntimeError> {
        let mut args = vec!["exec".to_owned(), id.to_string(), "--".to_owned()];
        args.extend_from_slice(command);
        debug!("{} {}", self.program, args.join(" "));
        let output = Command::new(&self.program)
            .args(&args)
            .output()
            .map_err(RuntimeError::Io)?;
        // Non-zero exit from the inner command is a result, not an error.
        Ok(ExecOutput {
            stdout: String::from_utf8_lossy(&output.stdout).into_owned(),
            exit_code: output.status.code().unwrap_or(-1),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use gantry_schema::{NetworkConfig, ResourceLimits, Role};

    fn spec() -> ResourceSpec {
        ResourceSpec {
            id: CtId::new(101),
            name: "vllm-a".to_owned(),
            role: Role::InferenceWorker,
            template: "local:vztmpl/base.tar.zst".to_owned(),
            device_assignment: "0".to_owned(),
            features: vec!["keyctl".to_owned(), "nesting".to_owned()],
            limits: ResourceLimits {
                memory_mb: Some(65536),
                cores: Some(16),
                disk_gb: Some(256),
            },
            network: NetworkConfig {
                address: "10.0.0.101/24".to_owned(),
                gateway: "10.0.0.1".to_owned(),
            },
        }
    }

    #[test]
    fn create_args_layout() {
        let args = create_args(CtId::new(101), &spec());
        assert_eq!(args[0], "create");
        assert_eq!(args[1], "101");
        assert_eq!(args[2], "local:vztmpl/base.tar.zst");
        assert!(args.contains(&"--memory".to_owned()));
        assert!(args.contains(&"65536".to_owned()));
        assert!(args.contains(&"local-lvm:256".to_owned()));
        assert!(args.contains(&"keyctl=1,nesting=1".to_owned()));
        assert!(args
            .iter()
            .any(|a| a.contains("ip=10.0.0.101/24,gw=10.0.0.1")));
    }

    #[test]
    fn create_args_omit_unset_limits() {
        let mut s = spec();
        s.limits = ResourceLimits::default();
        s.features.clear();
        let args = create_args(CtId::new(101), &s);
        assert!(!args.contains(&"--memory".to_owned()));
        assert!(!args.contains(&"--cores".to_owned()));
        assert!(!args.contains(&"--rootfs".to_owned()));
        assert!(!args.contains(&"--features".to_owned()));
    }

    #[test]
    fn unavailable_without_pct() {
        let backend = LxcBackend::with_program("definitely-not-a-real-binary");
        assert!(!backend.available());
    }
}
