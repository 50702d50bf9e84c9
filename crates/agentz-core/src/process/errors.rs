use std::path::PathBuf;

#[derive(Debug, thiserror::Error)]
pub enum ProcessError {
    #[error("Agent binary '{binary}' not found on PATH")]
    BinaryNotFound { binary: String },

    #[error("Failed to spawn worker: {message}")]
    SpawnFailed { message: String },

    #[error("Failed to kill process '{pid}': {message}")]
    KillFailed { pid: u32, message: String },

    #[error("Daemon record error at '{path}': {message}")]
    RecordError { path: PathBuf, message: String },

    #[error("IO operation failed: {source}")]
    IoError {
        #[from]
        source: std::io::Error,
    },
}
