//! Device passthrough planning.
//!
//! Directives are typed value objects rather than raw config lines, so
//! the desired and current grants can be diffed as sets. The diff is
//! replace-not-append: every managed directive not in the desired set
//! is removed, which keeps repeated runs from growing the config and
//! lets a resource be un-assigned its devices.

use crate::RuntimeError;
use gantry_schema::CtId;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fmt;

/// Char-device major for the NVIDIA frontend (`/dev/nvidia<N>`,
/// `/dev/nvidiactl`, `/dev/nvidia-modeset`).
pub const NVIDIA_FRONTEND_MAJOR: u32 = 195;
/// Char-device major for `/dev/nvidia-uvm` and `/dev/nvidia-uvm-tools`.
pub const NVIDIA_UVM_MAJOR: u32 = 511;

const NVIDIACTL_MINOR: u32 = 255;
const NVIDIA_MODESET_MINOR: u32 = 254;
const DEVICE_MODE: &str = "rwm";
const MOUNT_OPTIONS: &str = "none bind,optional,create=file";

/// Majors whose device-allow directives gantry owns in a container
/// config. Anything else in the file is preserved verbatim.
const MANAGED_MAJORS: [u32; 2] = [NVIDIA_FRONTEND_MAJOR, NVIDIA_UVM_MAJOR];
const MANAGED_MOUNT_PREFIX: &str = "/dev/nvidia";

/// Minor selector of a cgroup device-allow rule.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum Minor {
    Num(u32),
    Any,
}

impl fmt::Display for Minor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Num(n) => write!(f, "{n}"),
            Self::Any => f.write_str("*"),
        }
    }
}

/// One line of a container's passthrough configuration.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum Directive {
    /// `lxc.cgroup2.devices.allow: c <major>:<minor> <mode>`
    DeviceAllow {
        major: u32,
        minor: Minor,
        mode: String,
    },
    /// `lxc.mount.entry: <host> <guest> none bind,optional,create=file`
    MountEntry {
        host_path: String,
        guest_path: String,
    },
}

impl Directive {
    fn allow(major: u32, minor: Minor) -> Self {
        Self::DeviceAllow {
            major,
            minor,
            mode: DEVICE_MODE.to_owned(),
        }
    }

    fn bind(host: &str) -> Self {
        Self::MountEntry {
            host_path: host.to_owned(),
            // LXC mount entry targets are relative to the rootfs.
            guest_path: host.trim_start_matches('/').to_owned(),
        }
    }

    /// Whether this directive belongs to the passthrough grant gantry
    /// manages. Only managed directives are ever removed or rewritten.
    pub fn is_managed(&self) -> bool {
        match self {
            Self::DeviceAllow { major, .. } => MANAGED_MAJORS.contains(major),
            Self::MountEntry { host_path, .. } => host_path.starts_with(MANAGED_MOUNT_PREFIX),
        }
    }

    /// Serialize back to the exact config-line form.
    pub fn to_line(&self) -> String {
        match self {
            Self::DeviceAllow { major, minor, mode } => {
                format!("lxc.cgroup2.devices.allow: c {major}:{minor} {mode}")
            }
            Self::MountEntry {
                host_path,
                guest_path,
            } => format!("lxc.mount.entry: {host_path} {guest_path} {MOUNT_OPTIONS}"),
        }
    }

    /// Parse a config line into a directive. Returns `None` for lines
    /// gantry does not model (options, comments, foreign mounts with
    /// unexpected shapes); such lines pass through rewrites untouched.
    pub fn parse_line(line: &str) -> Option<Self> {
        let line = line.trim();
        if let Some(rest) = line.strip_prefix("lxc.cgroup2.devices.allow:") {
            let mut parts = rest.split_whitespace();
            let dev_type = parts.next()?;
            if dev_type != "c" {
                return None;
            }
            let (major_raw, minor_raw) = parts.next()?.split_once(':')?;
            let major = major_raw.parse().ok()?;
            let minor = if minor_raw == "*" {
                Minor::Any
            } else {
                Minor::Num(minor_raw.parse().ok()?)
            };
            let mode = parts.next()?.to_owned();
            if parts.next().is_some() {
                return None;
            }
            return Some(Self::DeviceAllow { major, minor, mode });
        }
        if let Some(rest) = line.strip_prefix("lxc.mount.entry:") {
            let mut parts = rest.split_whitespace();
            let host_path = parts.next()?.to_owned();
            let guest_path = parts.next()?.to_owned();
            let tail: Vec<&str> = parts.collect();
            if tail.join(" ") != MOUNT_OPTIONS {
                return None;
            }
            return Some(Self::MountEntry {
                host_path,
                guest_path,
            });
        }
        None
    }
}

impl fmt::Display for Directive {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_line())
    }
}

/// Pure diff between the desired grant and a container's current
/// directives. Applying it is a separate step ([`crate::apply_plan`]).
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PassthroughPlan {
    pub to_remove: BTreeSet<Directive>,
    pub to_add: BTreeSet<Directive>,
}

impl PassthroughPlan {
    pub fn is_empty(&self) -> bool {
        self.to_remove.is_empty() && self.to_add.is_empty()
    }

    /// The container must be restarted whenever the on-disk grant
    /// changed at all.
    pub fn restart_required(&self) -> bool {
        !self.is_empty()
    }
}

/// Parse a comma-separated device assignment into device indices.
///
/// Rejects the whole assignment on any malformed token — a grant is
/// never partially applied. Duplicate indices are collapsed, order
/// preserved.
pub fn parse_assignment(id: CtId, raw: &str) -> Result<Vec<u32>, RuntimeError> {
    let raw = raw.trim();
    if raw.is_empty() {
        return Ok(Vec::new());
    }
    let mut indices = Vec::new();
    for token in raw.split(',') {
        let token = token.trim();
        if token.is_empty() || !token.bytes().all(|b| b.is_ascii_digit()) {
            return Err(RuntimeError::InvalidDeviceAssignment {
                id,
                token: token.to_owned(),
            });
        }
        let index: u32 = token
            .parse()
            .map_err(|_| RuntimeError::InvalidDeviceAssignment {
                id,
                token: token.to_owned(),
            })?;
        if !indices.contains(&index) {
            indices.push(index);
        }
    }
    Ok(indices)
}

/// The full directive set granting access to the given device indices.
/// Empty input means no passthrough and yields the empty set.
pub fn device_grant(indices: &[u32]) -> BTreeSet<Directive> {
    let mut grant = BTreeSet::new();
    if indices.is_empty() {
        return grant;
    }

    for &index in indices {
        grant.insert(Directive::allow(NVIDIA_FRONTEND_MAJOR, Minor::Num(index)));
        grant.insert(Directive::bind(&format!("/dev/nvidia{index}")));
    }

    // Shared control devices, granted once per non-empty assignment.
    grant.insert(Directive::allow(
        NVIDIA_FRONTEND_MAJOR,
        Minor::Num(NVIDIACTL_MINOR),
    ));
    grant.insert(Directive::allow(
        NVIDIA_FRONTEND_MAJOR,
        Minor::Num(NVIDIA_MODESET_MINOR),
    ));
    grant.insert(Directive::allow(NVIDIA_UVM_MAJOR, Minor::Any));
    grant.insert(Directive::bind("/dev/nvidiactl"));
    grant.insert(Directive::bind("/dev/nvidia-modeset"));
    grant.insert(Directive::bind("/dev/nvidia-uvm"));
    grant.insert(Directive::bind("/dev/nvidia-uvm-tools"));

    grant
}

/// Diff the desired grant against the container's current directives.
///
/// Only managed directives participate: foreign lines are invisible to
/// the plan. Set difference in both directions gives replace semantics
/// and makes a second run against the applied state an empty plan.
pub fn plan_passthrough(indices: &[u32], current: &BTreeSet<Directive>) -> PassthroughPlan {
    let desired = device_grant(indices);
    let managed: BTreeSet<Directive> = current.iter().filter(|d| d.is_managed()).cloned().collect();

    PassthroughPlan {
        to_remove: managed.difference(&desired).cloned().collect(),
        to_add: desired.difference(&managed).cloned().collect(),
    }
}
