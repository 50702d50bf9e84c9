//! Ingester pid-file management with stale-file detection.

use std::path::Path;

use tracing::{debug, warn};

use crate::errors::DaemonError;

/// Pid of a live ingester recorded at `pid_path`, if any. A pid file whose
/// process is gone is stale and reported as absent.
pub fn check_running(pid_path: &Path) -> Option<u32> {
    let content = std::fs::read_to_string(pid_path).ok()?;
    let pid: u32 = content.trim().parse().ok()?;

    let alive = nix::sys::signal::kill(nix::unistd::Pid::from_raw(pid as i32), None).is_ok();
    if alive {
        Some(pid)
    } else {
        debug!(event = "daemon.pid.stale_file", pid, path = %pid_path.display());
        None
    }
}

pub fn write_pid_file(pid_path: &Path) -> Result<(), DaemonError> {
    if let Some(parent) = pid_path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    std::fs::write(pid_path, std::process::id().to_string())?;
    Ok(())
}

pub fn remove_pid_file(pid_path: &Path) {
    if let Err(e) = std::fs::remove_file(pid_path)
        && e.kind() != std::io::ErrorKind::NotFound
    {
        warn!(event = "daemon.pid.remove_failed", path = %pid_path.display(), error = %e);
    }
}
