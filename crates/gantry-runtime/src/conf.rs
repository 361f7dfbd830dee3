//! Whole-file rewrite of a container's passthrough configuration.
//!
//! The config file (`<conf_dir>/<id>.conf`) is line oriented and mostly
//! owned by the container runtime. Gantry owns only the managed
//! passthrough directives; every other line is preserved verbatim, in
//! its original position.

use crate::passthrough::{Directive, PassthroughPlan};
use crate::RuntimeError;
use gantry_schema::CtId;
use std::collections::BTreeSet;
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use tracing::debug;

/// Path of the config file gantry rewrites for a container.
pub fn conf_path(conf_dir: &Path, id: CtId) -> PathBuf {
    conf_dir.join(format!("{id}.conf"))
}

/// All directives currently present in the container's config file.
/// A missing file reads as the empty set.
pub fn read_directives(path: &Path) -> Result<BTreeSet<Directive>, RuntimeError> {
    if !path.exists() {
        return Ok(BTreeSet::new());
    }
    let content = fs::read_to_string(path)?;
    Ok(content.lines().filter_map(Directive::parse_line).collect())
}

/// Apply a passthrough plan to the config file.
///
/// Foreign lines keep their order; the resulting managed directive set
/// is serialized sorted at the end of the file. The rewrite goes
/// through a temp file in the same directory and an atomic rename, so
/// a crash never leaves a half-written config.
pub fn apply_plan(path: &Path, plan: &PassthroughPlan) -> Result<(), RuntimeError> {
    if plan.is_empty() {
        return Ok(());
    }

    let content = if path.exists() {
        fs::read_to_string(path)?
    } else {
        String::new()
    };

    let mut kept_managed: BTreeSet<Directive> = BTreeSet::new();
    let mut foreign_lines: Vec<&str> = Vec::new();
    for line in content.lines() {
        match Directive::parse_line(line) {
            Some(d) if d.is_managed() => {
                if !plan.to_remove.contains(&d) {
                    kept_managed.insert(d);
                }
            }
            _ => foreign_lines.push(line),
        }
    }
    kept_managed.extend(plan.to_add.iter().cloned());

    let mut out = String::new();
    for line in &foreign_lines {
        out.push_str(line);
        out.push('\n');
    }
    for directive in &kept_managed {
        out.push_str(&directive.to_line());
        out.push('\n');
    }

    let dir = path.parent().unwrap_or_else(|| Path::new("."));
    fs::create_dir_all(dir)?;
    let mut tmp = tempfile::NamedTempFile::new_in(dir)?;
    tmp.write_all(out.as_bytes())?;
    tmp.persist(path).map_err(|e| RuntimeError::Io(e.error))?;

    debug!(
        "rewrote {}: -{} +{} directives",
        path.display(),
        plan.to_remove.len(),
        plan.to_add.len()
    );
    Ok(())
}
