#[derive(Debug, thiserror::Error)]
pub enum TaskError {
    #[error("Task not found: {path}")]
    NotFound { path: String },

    #[error("Task '{path}' changed underneath you (expected version {expected}, current {current})")]
    VersionConflict {
        path: String,
        expected: u64,
        current: u64,
    },

    #[error("Failed to parse task '{path}': {message}")]
    ParseError { path: String, message: String },

    #[error("Subtask '{id}' not found")]
    SubtaskNotFound { id: String },

    #[error("Task '{path}' is already archived")]
    AlreadyArchived { path: String },

    #[error("Task '{path}' is not archived")]
    NotArchived { path: String },

    #[error("IO operation failed: {source}")]
    IoError {
        #[from]
        source: std::io::Error,
    },
}
