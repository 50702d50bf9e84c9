use agentz_protocol::SessionId;

#[derive(Debug, thiserror::Error)]
pub enum SessionError {
    #[error("Session '{id}' not found")]
    NotFound { id: SessionId },

    #[error("Session is currently running")]
    Busy { id: SessionId },

    #[error("Rate limited: {reason}")]
    RateLimited {
        reason: String,
        retry_after_secs: Option<u64>,
    },

    #[error("Worker for session '{id}' is gone but no terminal event was recorded")]
    WorkerLost { id: SessionId },

    #[error("Concurrent agent limit reached ({limit})")]
    ConcurrencyLimit { limit: usize },

    #[error("Prompt matches a dangerous command pattern: '{pattern}'")]
    DangerousPrompt { pattern: String },

    #[error("Working directory '{working_dir}' is outside the allowed prefix '{prefix}'")]
    WorkingDirNotAllowed { working_dir: String, prefix: String },

    #[error("Debug run '{debug_run_id}' has sessions still running")]
    DebugRunNotTerminal { debug_run_id: String },

    #[error("Debug run '{debug_run_id}' not found")]
    DebugRunNotFound { debug_run_id: String },

    #[error("Stream ingester is not running (no address file); start the daemon first")]
    IngesterUnavailable,

    #[error("Stream store error: {source}")]
    StoreError {
        #[from]
        source: agentz_store::StoreError,
    },

    #[error("Git operation failed: {source}")]
    GitError {
        #[from]
        source: agentz_git::GitError,
    },

    #[error("Process operation failed: {source}")]
    ProcessError {
        #[from]
        source: crate::process::ProcessError,
    },

    #[error("Task operation failed: {source}")]
    TaskError {
        #[from]
        source: crate::tasks::TaskError,
    },

    #[error("IO operation failed: {source}")]
    IoError {
        #[from]
        source: std::io::Error,
    },
}
