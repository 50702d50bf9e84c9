//! Process liveness and identity checks.

use sysinfo::{Pid, ProcessRefreshKind, ProcessesToUpdate, System};

/// Zero-signal probe: true if a process with this pid exists and is
/// signallable by us.
pub fn is_process_running(pid: u32) -> bool {
    let Ok(pid) = i32::try_from(pid) else {
        return false;
    };
    nix::sys::signal::kill(nix::unistd::Pid::from_raw(pid), None).is_ok()
}

/// Name and start time of a live process, for pid-reuse protection.
///
/// The pair is captured at spawn and re-verified before a kill: a recycled
/// pid will carry a different name or start time.
pub fn get_process_info(pid: u32) -> Option<(String, u64)> {
    let mut system = System::new();
    let sys_pid = Pid::from_u32(pid);
    system.refresh_processes_specifics(
        ProcessesToUpdate::Some(&[sys_pid]),
        true,
        ProcessRefreshKind::nothing(),
    );
    let process = system.process(sys_pid)?;
    Some((
        process.name().to_string_lossy().into_owned(),
        process.start_time(),
    ))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_own_process_is_running() {
        assert!(is_process_running(std::process::id()));
    }

    #[test]
    fn test_dead_pid_is_not_running() {
        // Spawn and reap a child; its pid is no longer signallable.
        let child = std::process::Command::new("true").spawn().unwrap();
        let pid = child.id();
        let mut child = child;
        child.wait().unwrap();
        assert!(!is_process_running(pid));
    }

    #[test]
    fn test_get_process_info_for_self() {
        let info = get_process_info(std::process::id());
        assert!(info.is_some());
        let (name, start_time) = info.unwrap();
        assert!(!name.is_empty());
        assert!(start_time > 0);
    }
}
