use std::path::{Path, PathBuf};

#[derive(Debug, thiserror::Error)]
pub enum PathError {
    #[error("home directory not found — set $HOME environment variable")]
    HomeNotFound,

    #[error("repository root has no parent directory: {path}")]
    NoRepoParent { path: PathBuf },
}

/// Directory name of the per-repo control-plane state, adjacent to nothing —
/// it lives inside the repository root.
pub const CONTROL_PLANE_DIR: &str = ".control-plane";

/// Directory name of the per-repo worktree pool, adjacent to the repository.
pub const WORKTREES_DIR: &str = ".agentz-worktrees";

/// Centralized path construction for the per-repo `.control-plane/` layout.
///
/// The on-disk stream layout is a compatibility surface: registry at
/// `.control-plane/streams/registry.log`, per-session streams at
/// `.control-plane/streams/sessions/<id>.log`, control streams at
/// `.control-plane/streams/control/<id>.log`. Single source of truth for
/// every path under it. Use `for_repo()` in production code and tests alike;
/// the repo root is always explicit.
#[derive(Debug, Clone)]
pub struct ControlPlanePaths {
    repo_root: PathBuf,
}

impl ControlPlanePaths {
    pub fn for_repo(repo_root: impl Into<PathBuf>) -> Self {
        Self {
            repo_root: repo_root.into(),
        }
    }

    pub fn repo_root(&self) -> &Path {
        &self.repo_root
    }

    pub fn control_plane_dir(&self) -> PathBuf {
        self.repo_root.join(CONTROL_PLANE_DIR)
    }

    // --- Streams ---

    pub fn streams_dir(&self) -> PathBuf {
        self.control_plane_dir().join("streams")
    }

    /// The single global registry stream.
    pub fn registry_stream(&self) -> PathBuf {
        self.streams_dir().join("registry.log")
    }

    pub fn sessions_dir(&self) -> PathBuf {
        self.streams_dir().join("sessions")
    }

    pub fn session_stream(&self, session_id: &str) -> PathBuf {
        self.sessions_dir().join(format!("{}.log", session_id))
    }

    pub fn control_dir(&self) -> PathBuf {
        self.streams_dir().join("control")
    }

    pub fn control_stream(&self, session_id: &str) -> PathBuf {
        self.control_dir().join(format!("{}.log", session_id))
    }

    // --- Daemon records ---

    /// Per-session worker records (pid, nonce, spawn metadata). Survive a
    /// control-plane restart so liveness checks and nonce validation keep
    /// working against already-running workers.
    pub fn daemons_dir(&self) -> PathBuf {
        self.control_plane_dir().join("daemons")
    }

    pub fn daemon_record(&self, session_id: &str) -> PathBuf {
        self.daemons_dir().join(format!("{}.json", session_id))
    }

    /// Spawn payload files handed to workers by path (prompts, reconstructed
    /// messages, attachments) — payloads can exceed argv limits.
    pub fn spawn_dir(&self) -> PathBuf {
        self.control_plane_dir().join("spawn")
    }

    pub fn prompt_file(&self, session_id: &str) -> PathBuf {
        self.spawn_dir().join(format!("{}.prompt", session_id))
    }

    pub fn reconstructed_messages_file(&self, session_id: &str) -> PathBuf {
        self.spawn_dir().join(format!("{}.messages.json", session_id))
    }

    pub fn attachments_file(&self, session_id: &str) -> PathBuf {
        self.spawn_dir().join(format!("{}.attachments.json", session_id))
    }

    pub fn ingester_pid_file(&self) -> PathBuf {
        self.control_plane_dir().join("ingester.pid")
    }

    /// File recording the ingester's bound address, read by spawn to build
    /// the worker's `--stream-url`.
    pub fn ingester_addr_file(&self) -> PathBuf {
        self.control_plane_dir().join("ingester.addr")
    }

    // --- Worktrees ---

    /// Base directory for session worktrees: `<repoRootParent>/.agentz-worktrees`.
    pub fn worktrees_base(&self) -> Result<PathBuf, PathError> {
        let parent = self.repo_root.parent().ok_or_else(|| PathError::NoRepoParent {
            path: self.repo_root.clone(),
        })?;
        Ok(parent.join(WORKTREES_DIR))
    }

    pub fn worktree_path(&self, session_id: &str) -> Result<PathBuf, PathError> {
        Ok(self.worktrees_base()?.join(session_id))
    }

    // --- Tasks ---

    pub fn tasks_dir(&self) -> PathBuf {
        self.repo_root.join("tasks")
    }

    pub fn task_archive_dir(&self, year_month: &str) -> PathBuf {
        self.tasks_dir().join("archive").join(year_month)
    }
}

/// User-level configuration paths (`~/.agentz/`).
#[derive(Debug, Clone)]
pub struct UserPaths {
    agentz_dir: PathBuf,
}

impl UserPaths {
    pub fn resolve() -> Result<Self, PathError> {
        let home = dirs::home_dir().ok_or(PathError::HomeNotFound)?;
        Ok(Self {
            agentz_dir: home.join(".agentz"),
        })
    }

    /// Create paths from an explicit base directory. Use in tests.
    pub fn from_dir(agentz_dir: PathBuf) -> Self {
        Self { agentz_dir }
    }

    pub fn agentz_dir(&self) -> &Path {
        &self.agentz_dir
    }

    pub fn user_config(&self) -> PathBuf {
        self.agentz_dir.join("config.toml")
    }

    /// Project-level config override, relative to a repo root.
    pub fn project_config(repo_root: &Path) -> PathBuf {
        repo_root.join(".agentz").join("config.toml")
    }
}
