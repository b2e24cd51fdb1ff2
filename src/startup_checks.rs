//! Startup requirement validation for herakles-top.
//!
//! This module validates that the proc filesystem can be read before sampling
//! starts.

use nix::unistd::geteuid;
use std::fs;
use std::path::Path;
use tracing::{debug, info, warn};

/// Validate all runtime requirements
pub fn validate_requirements(proc_root: &Path) -> Result<(), ValidationError> {
    debug!("Validating runtime requirements for {}", proc_root.display());

    check_user_privileges();
    check_proc_root(proc_root)?;
    check_cpu_stat(proc_root)?;

    info!("All runtime requirements validated");
    Ok(())
}

/// Non-root users still see every process, but some fields of foreign processes
/// may be hidden depending on `hidepid`.
fn check_user_privileges() {
    if !geteuid().is_root() {
        debug!("Not running as root - processes hidden by hidepid will not be listed");
    }
}

fn check_proc_root(proc_root: &Path) -> Result<(), ValidationError> {
    let entries = fs::read_dir(proc_root).map_err(|e| ValidationError::ProcUnreadable {
        path: proc_root.display().to_string(),
        reason: e.to_string(),
    })?;

    let has_pid = entries
        .flatten()
        .any(|e| e.file_name().to_str().is_some_and(|n| n.chars().all(|c| c.is_ascii_digit())));
    if !has_pid {
        warn!("No process directories found under {}", proc_root.display());
        return Err(ValidationError::NoProcesses(proc_root.display().to_string()));
    }
    Ok(())
}

fn check_cpu_stat(proc_root: &Path) -> Result<(), ValidationError> {
    let path = proc_root.join("stat");
    let content = fs::read_to_string(&path).map_err(|e| ValidationError::ProcUnreadable {
        path: path.display().to_string(),
        reason: e.to_string(),
    })?;
    herakles_top::source::parse_cpu_counters(&content)
        .map_err(|e| ValidationError::CpuStat(e.to_string()))?;
    Ok(())
}

#[derive(Debug, thiserror::Error)]
pub enum ValidationError {
    #[error("Cannot read {path}: {reason}")]
    ProcUnreadable { path: String, reason: String },

    #[error("No process directories under {0}")]
    NoProcesses(String),

    #[error("Invalid aggregate CPU line: {0}")]
    CpuStat(String),
}
