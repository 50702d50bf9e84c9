//! Spawning and tracking detached worker processes.
//!
//! Workers are launched in their own process group with stdio detached so
//! they outlive a control-plane restart. The monitor never pipes worker
//! output into its own process; worker output reaches the control plane
//! only through the stream ingester. The in-memory table is a cache over
//! the durable daemon records.

use std::collections::HashMap;
use std::path::PathBuf;
use std::process::Stdio;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use nix::sys::signal::{Signal, kill};
use nix::unistd::Pid;
use tracing::{debug, info, warn};

use agentz_paths::ControlPlanePaths;
use agentz_protocol::{AgentType, DebugRunId, Nonce, SessionId};

use crate::process::errors::ProcessError;
use crate::process::liveness::{get_process_info, is_process_running};
use crate::process::record::DaemonRecord;

/// Grace period between SIGTERM and the follow-up SIGKILL.
const KILL_GRACE: Duration = Duration::from_secs(3);

/// Everything a worker needs on its command line (§6 boot contract).
#[derive(Debug, Clone)]
pub struct SpawnParams {
    pub session_id: SessionId,
    pub agent_type: AgentType,
    pub prompt_file: PathBuf,
    pub working_dir: PathBuf,
    pub model: Option<String>,
    pub stream_url: String,
    pub nonce: Nonce,
    pub cli_session_id: Option<String>,
    pub is_resume: bool,
    pub task_path: Option<String>,
    pub title: Option<String>,
    pub debug_run_id: Option<DebugRunId>,
    pub reconstructed_messages: Option<PathBuf>,
    pub attachments: Option<PathBuf>,
    /// Configured binary override for this agent type, if any.
    pub binary_override: Option<String>,
    /// Hard runtime cap; the worker is killed once it elapses.
    pub timeout_ms: u64,
}

/// The binary a given agent type launches.
fn agent_binary(agent_type: AgentType) -> &'static str {
    match agent_type {
        AgentType::Claude => "claude",
        AgentType::Codex => "codex",
        AgentType::Opencode => "opencode",
        AgentType::Cerebras => "cerebras",
        AgentType::Gemini => "gemini",
        AgentType::Mcporter => "mcporter",
    }
}

#[derive(Debug, Clone)]
pub struct ProcessMonitor {
    paths: ControlPlanePaths,
    table: Arc<Mutex<HashMap<SessionId, DaemonRecord>>>,
}

impl ProcessMonitor {
    pub fn new(paths: ControlPlanePaths) -> Self {
        Self {
            paths,
            table: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    /// Spawn a detached worker and record its binding.
    pub fn spawn_worker(&self, params: &SpawnParams) -> Result<DaemonRecord, ProcessError> {
        let binary_name = params
            .binary_override
            .as_deref()
            .unwrap_or_else(|| agent_binary(params.agent_type));
        let binary = which::which(binary_name).map_err(|_| ProcessError::BinaryNotFound {
            binary: binary_name.to_string(),
        })?;

        let mut command = std::process::Command::new(binary);
        command
            .current_dir(&params.working_dir)
            .arg("--session-id")
            .arg(params.session_id.as_ref())
            .arg("--agent-type")
            .arg(params.agent_type.as_str())
            .arg("--prompt-file")
            .arg(&params.prompt_file)
            .arg("--working-dir")
            .arg(&params.working_dir)
            .arg("--stream-url")
            .arg(&params.stream_url)
            .arg("--nonce")
            .arg(params.nonce.as_ref())
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::null());

        if let Some(model) = &params.model {
            command.arg("--model").arg(model);
        }
        if let Some(cli_session_id) = &params.cli_session_id {
            command.arg("--cli-session-id").arg(cli_session_id);
        }
        if params.is_resume {
            command.arg("--resume");
        }
        if let Some(task_path) = &params.task_path {
            command.arg("--task-path").arg(task_path);
        }
        if let Some(title) = &params.title {
            command.arg("--title").arg(title);
        }
        if let Some(debug_run_id) = &params.debug_run_id {
            command.arg("--debug-run-id").arg(debug_run_id.as_ref());
        }
        if let Some(messages) = &params.reconstructed_messages {
            command.arg("--reconstructed-messages").arg(messages);
        }
        if let Some(attachments) = &params.attachments {
            command.arg("--attachments").arg(attachments);
        }

        // New process group: the worker survives this process's exit and
        // never receives our terminal's signals.
        #[cfg(unix)]
        {
            use std::os::unix::process::CommandExt;
            command.process_group(0);
        }

        let mut child = command.spawn().map_err(|e| ProcessError::SpawnFailed {
            message: format!("{}: {}", binary_name, e),
        })?;
        let pid = child.id();
        // Reap off-thread so an exited worker never lingers as a zombie
        // while this process lives; if this process dies first the worker
        // is reparented and keeps running. The same thread enforces the
        // runtime cap while this process is around to do so.
        let timeout = Duration::from_millis(params.timeout_ms);
        let identity = get_process_info(pid);
        let spawn_identity = identity.clone();
        std::thread::spawn(move || {
            let reaper = std::thread::spawn(move || {
                let _ = child.wait();
            });
            std::thread::sleep(timeout);
            if !reaper.is_finished()
                && get_process_info(pid) == spawn_identity
            {
                warn!(event = "core.process.worker_timeout", pid);
                let _ = kill(Pid::from_raw(pid as i32), Signal::SIGTERM);
                std::thread::sleep(KILL_GRACE);
                if is_process_running(pid) {
                    let _ = kill(Pid::from_raw(pid as i32), Signal::SIGKILL);
                }
            }
        });

        let (process_name, process_start_time) = match identity {
            Some((name, start_time)) => (Some(name), Some(start_time)),
            None => (None, None),
        };

        let record = DaemonRecord {
            session_id: params.session_id.clone(),
            pid,
            nonce: params.nonce.clone(),
            started_at: chrono::Utc::now().to_rfc3339(),
            process_name,
            process_start_time,
        };

        record.write(&self.record_path(&params.session_id))?;
        self.table
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .insert(params.session_id.clone(), record.clone());

        info!(
            event = "core.process.worker_spawned",
            session_id = %params.session_id,
            agent = params.agent_type.as_str(),
            pid,
            resume = params.is_resume,
        );
        Ok(record)
    }

    fn record_path(&self, session_id: &SessionId) -> PathBuf {
        self.paths.daemon_record(session_id)
    }

    /// The daemon record for a session, from cache or disk.
    pub fn get_daemon(&self, session_id: &SessionId) -> Result<Option<DaemonRecord>, ProcessError> {
        if let Some(record) = self
            .table
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .get(session_id)
        {
            return Ok(Some(record.clone()));
        }
        let record = DaemonRecord::read(&self.record_path(session_id))?;
        if let Some(record) = &record {
            self.table
                .lock()
                .unwrap_or_else(|e| e.into_inner())
                .insert(session_id.clone(), record.clone());
        }
        Ok(record)
    }

    /// Whether a live worker exists for this session.
    ///
    /// Guards against pid reuse: a pid that is alive but carries a
    /// different process identity than recorded at spawn does not count.
    pub fn is_daemon_alive(&self, session_id: &SessionId) -> Result<bool, ProcessError> {
        let Some(record) = self.get_daemon(session_id)? else {
            return Ok(false);
        };
        Ok(record_is_alive(&record))
    }

    /// Live worker count across all sessions, for the concurrency cap.
    pub fn live_count(&self) -> usize {
        let Ok(entries) = std::fs::read_dir(self.paths.daemons_dir()) else {
            return 0;
        };
        entries
            .filter_map(|entry| entry.ok())
            .filter(|entry| entry.path().extension().and_then(|s| s.to_str()) == Some("json"))
            .filter_map(|entry| DaemonRecord::read(&entry.path()).ok().flatten())
            .filter(record_is_alive)
            .count()
    }

    /// SIGTERM the worker, untrack it, and schedule a SIGKILL after a grace
    /// period. Returns whether the worker was alive when the signal was sent.
    pub fn kill_daemon(&self, session_id: &SessionId) -> Result<bool, ProcessError> {
        let Some(record) = self.get_daemon(session_id)? else {
            return Ok(false);
        };

        self.untrack(session_id)?;

        if !record_is_alive(&record) {
            debug!(
                event = "core.process.kill_skipped_dead",
                session_id = %session_id,
                pid = record.pid,
            );
            return Ok(false);
        }

        let pid = Pid::from_raw(record.pid as i32);
        kill(pid, Signal::SIGTERM).map_err(|e| ProcessError::KillFailed {
            pid: record.pid,
            message: e.to_string(),
        })?;
        info!(
            event = "core.process.sigterm_sent",
            session_id = %session_id,
            pid = record.pid,
        );

        // Escalate off-thread so cancel can return as soon as SIGTERM is
        // delivered.
        let raw_pid = record.pid;
        std::thread::spawn(move || {
            std::thread::sleep(KILL_GRACE);
            if is_process_running(raw_pid) {
                warn!(event = "core.process.sigkill_escalation", pid = raw_pid);
                let _ = kill(Pid::from_raw(raw_pid as i32), Signal::SIGKILL);
            }
        });

        Ok(true)
    }

    /// Drop the session's record from the table and disk.
    pub fn untrack(&self, session_id: &SessionId) -> Result<(), ProcessError> {
        self.table
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .remove(session_id);
        DaemonRecord::delete(&self.record_path(session_id))
    }
}

fn record_is_alive(record: &DaemonRecord) -> bool {
    if !is_process_running(record.pid) {
        return false;
    }
    // Pid-reuse check: identity recorded at spawn must still match.
    if let (Some(recorded_name), Some(recorded_start)) =
        (&record.process_name, record.process_start_time)
        && let Some((current_name, current_start)) = get_process_info(record.pid)
    {
        return *recorded_name == current_name && recorded_start == current_start;
    }
    true
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn monitor_in(dir: &TempDir) -> ProcessMonitor {
        ProcessMonitor::new(ControlPlanePaths::for_repo(dir.path()))
    }

    fn fake_record(session_id: &str, pid: u32) -> DaemonRecord {
        DaemonRecord {
            session_id: SessionId::new(session_id),
            pid,
            nonce: Nonce::new("0123456789abcdef0123456789abcdef"),
            started_at: "2026-03-01T12:00:00Z".to_string(),
            process_name: None,
            process_start_time: None,
        }
    }

    #[test]
    fn test_get_daemon_reads_from_disk_after_restart() {
        let dir = TempDir::new().unwrap();
        let monitor = monitor_in(&dir);
        let record = fake_record("a1b2c3d4e5f6", 99999);
        record
            .write(&monitor.record_path(&SessionId::new("a1b2c3d4e5f6")))
            .unwrap();

        // Fresh monitor simulates a control-plane restart.
        let fresh = monitor_in(&dir);
        let read = fresh.get_daemon(&SessionId::new("a1b2c3d4e5f6")).unwrap();
        assert_eq!(read, Some(record));
    }

    #[test]
    fn test_get_daemon_absent() {
        let dir = TempDir::new().unwrap();
        let monitor = monitor_in(&dir);
        assert!(
            monitor
                .get_daemon(&SessionId::new("a1b2c3d4e5f6"))
                .unwrap()
                .is_none()
        );
    }

    #[test]
    fn test_kill_daemon_dead_pid_returns_false_and_untracks() {
        let dir = TempDir::new().unwrap();
        let monitor = monitor_in(&dir);
        let session_id = SessionId::new("a1b2c3d4e5f6");

        // A reaped child's pid is dead by the time we kill.
        let mut child = std::process::Command::new("true").spawn().unwrap();
        let pid = child.id();
        child.wait().unwrap();

        fake_record("a1b2c3d4e5f6", pid)
            .write(&monitor.record_path(&session_id))
            .unwrap();

        let was_alive = monitor.kill_daemon(&session_id).unwrap();
        assert!(!was_alive);
        assert!(monitor.get_daemon(&session_id).unwrap().is_none());
    }

    #[test]
    fn test_kill_daemon_live_process() {
        let dir = TempDir::new().unwrap();
        let monitor = monitor_in(&dir);
        let session_id = SessionId::new("a1b2c3d4e5f6");

        let child = std::process::Command::new("sleep").arg("30").spawn().unwrap();
        let pid = child.id();
        let (name, start) = get_process_info(pid).unwrap();
        DaemonRecord {
            process_name: Some(name),
            process_start_time: Some(start),
            ..fake_record("a1b2c3d4e5f6", pid)
        }
        .write(&monitor.record_path(&session_id))
        .unwrap();

        let was_alive = monitor.kill_daemon(&session_id).unwrap();
        assert!(was_alive);

        // SIGTERM delivery is immediate; reap and confirm.
        let mut child = child;
        let status = child.wait().unwrap();
        assert!(!status.success());
    }

    #[test]
    fn test_live_count_ignores_dead_records() {
        let dir = TempDir::new().unwrap();
        let monitor = monitor_in(&dir);

        let mut reaped = std::process::Command::new("true").spawn().unwrap();
        let dead_pid = reaped.id();
        reaped.wait().unwrap();
        fake_record("aaaaaaaaaaaa", dead_pid)
            .write(&monitor.record_path(&SessionId::new("aaaaaaaaaaaa")))
            .unwrap();

        let live = std::process::Command::new("sleep").arg("30").spawn().unwrap();
        fake_record("bbbbbbbbbbbb", live.id())
            .write(&monitor.record_path(&SessionId::new("bbbbbbbbbbbb")))
            .unwrap();

        assert_eq!(monitor.live_count(), 1);

        let mut live = live;
        let _ = kill(Pid::from_raw(live.id() as i32), Signal::SIGKILL);
        let _ = live.wait();
    }

    #[test]
    fn test_spawn_worker_unknown_binary() {
        let dir = TempDir::new().unwrap();
        let monitor = monitor_in(&dir);
        let params = SpawnParams {
            session_id: SessionId::new("a1b2c3d4e5f6"),
            agent_type: AgentType::Mcporter,
            prompt_file: dir.path().join("prompt"),
            working_dir: dir.path().to_path_buf(),
            model: None,
            stream_url: "tcp://127.0.0.1:7465".to_string(),
            nonce: Nonce::new("0123456789abcdef0123456789abcdef"),
            cli_session_id: None,
            is_resume: false,
            task_path: None,
            title: None,
            debug_run_id: None,
            reconstructed_messages: None,
            attachments: None,
            binary_override: None,
            timeout_ms: 3_600_000,
        };
        // mcporter is not installed in test environments.
        let err = monitor.spawn_worker(&params).unwrap_err();
        assert!(matches!(err, ProcessError::BinaryNotFound { .. }));
    }
}
