//! Extension hook dispatch.
//!
//! Role-specific setup and validation live outside the engine: the
//! registry maps a declared role to an opaque callable and the
//! dispatcher's only logic is lookup, invoke, and uniform error
//! wrapping. Registration happens once at startup, so a role without a
//! hook is caught as a configuration error rather than silently
//! skipped at call time.

use crate::CoreError;
use gantry_runtime::ContainerBackend;
use gantry_schema::{CtId, ResourceSpec, Role};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::process::Command;
use thiserror::Error;
use tracing::{debug, info};

/// Free-form diagnostic failure from a hook.
#[derive(Debug, Error)]
#[error("{0}")]
pub struct HookError(pub String);

/// Everything a hook may use: the container id, its spec, and the
/// control surface for in-container commands.
pub struct HookContext<'a> {
    pub id: CtId,
    pub spec: &'a ResourceSpec,
    pub backend: &'a dyn ContainerBackend,
}

/// A role-specific setup/validation routine. The engine interprets
/// success or failure; it never knows what a hook does.
pub trait RoleHook: Send + Sync {
    /// Configure the workload after the container is running and its
    /// device grant is applied.
    fn configure(&self, ctx: &HookContext<'_>) -> Result<(), HookError>;

    /// Validate the configured workload. Default: nothing to check.
    fn verify(&self, _ctx: &HookContext<'_>) -> Result<(), HookError> {
        Ok(())
    }
}

/// Startup-time mapping from role to hook.
#[derive(Default)]
pub struct HookRegistry {
    hooks: BTreeMap<Role, Box<dyn RoleHook>>,
}

impl HookRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, role: Role, hook: Box<dyn RoleHook>) {
        self.hooks.insert(role, hook);
    }

    /// Resolve the hook for a declared role. `Role::None` declares no
    /// hook and resolves to `Ok(None)`; any other unregistered role is
    /// a specification bug surfaced before configuration starts.
    pub fn resolve(&self, id: CtId, role: Role) -> Result<Option<&dyn RoleHook>, CoreError> {
        if role == Role::None {
            return Ok(None);
        }
        match self.hooks.get(&role) {
            Some(hook) => Ok(Some(hook.as_ref())),
            None => Err(CoreError::UnregisteredRole { id, role }),
        }
    }

    pub fn dispatch_configure(&self, ctx: &HookContext<'_>) -> Result<(), CoreError> {
        match self.resolve(ctx.id, ctx.spec.role)? {
            Some(hook) => {
                debug!("dispatching configure hook for role {}", ctx.spec.role);
                hook.configure(ctx).map_err(|e| CoreError::HookFailed {
                    role: ctx.spec.role,
                    phase: "configure",
                    detail: e.0,
                })
            }
            None => Ok(()),
        }
    }

    pub fn dispatch_verify(&self, ctx: &HookContext<'_>) -> Result<(), CoreError> {
        match self.resolve(ctx.id, ctx.spec.role)? {
            Some(hook) => {
                debug!("dispatching verify hook for role {}", ctx.spec.role);
                hook.verify(ctx).map_err(|e| CoreError::HookFailed {
                    role: ctx.spec.role,
                    phase: "verify",
                    detail: e.0,
                })
            }
            None => Ok(()),
        }
    }

    /// Build a registry from a hooks directory: `<dir>/<role>.setup`
    /// registers a [`ScriptHook`] for that role, with an optional
    /// sibling `<role>.verify`. Roles without a setup script stay
    /// unregistered.
    pub fn from_dir(dir: &Path) -> Self {
        let mut registry = Self::new();
        for role in [Role::CoreInfra, Role::InferenceWorker, Role::Agent] {
            let setup = dir.join(format!("{role}.setup"));
            if !setup.exists() {
                continue;
            }
            let verify = dir.join(format!("{role}.verify"));
            let verify = verify.exists().then_some(verify);
            info!("registered script hook for role {role}");
            registry.register(role, Box::new(ScriptHook::new(setup, verify)));
        }
        registry
    }
}

/// Hook that runs operator-supplied host executables, the narrow
/// interface to the per-workload installation recipes. The scripts get
/// the container identity in the environment and typically shell back
/// into the container themselves.
pub struct ScriptHook {
    setup: PathBuf,
    verify: Option<PathBuf>,
}

impl ScriptHook {
    pub fn new(setup: PathBuf, verify: Option<PathBuf>) -> Self {
        Self { setup, verify }
    }

    fn run(program: &Path, ctx: &HookContext<'_>) -> Result<(), HookError> {
        let output = Command::new(program)
            .env("GANTRY_CT_ID", ctx.id.to_string())
            .env("GANTRY_CT_NAME", &ctx.spec.name)
            .env("GANTRY_CT_ROLE", ctx.spec.role.as_str())
            .output()
            .map_err(|e| HookError(format!("cannot run {}: {e}", program.display())))?;
        if output.status.success() {
            Ok(())
        } else {
            let stderr = String::from_utf8_lossy(&output.stderr);
            Err(HookError(format!(
                "{} exited with {}: {}",
                program.display(),
                output
                    .status
                    .code()
                    .map_or_else(|| "signal".to_owned(), |c| c.to_string()),
                stderr.trim()
            )))
        }
    }
}

impl RoleHook for ScriptHook {
    fn configure(&self, ctx: &HookContext<'_>) -> Result<(), HookError> {
        Self::run(&self.setup, ctx)
    }

    fn verify(&self, ctx: &HookContext<'_>) -> Result<(), HookError> {
        match &self.verify {
            Some(script) => Self::run(script, ctx),
            None => Ok(()),
        }
    }
}
