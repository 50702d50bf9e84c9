use std::path::PathBuf;

#[derive(Debug, thiserror::Error)]
pub enum GitError {
    #[error("Not a git repository: {path}")]
    NotARepo { path: PathBuf },

    #[error("Invalid path '{path}': {message}")]
    InvalidPath { path: String, message: String },

    #[error("Invalid branch name: '{branch}'")]
    InvalidBranchName { branch: String },

    #[error("git exited with code {code}: {sanitized}")]
    GitFailure { code: i32, sanitized: String },

    #[error("Merge of '{source_branch}' into '{target_branch}' produced conflicts")]
    Conflict {
        target_branch: String,
        source_branch: String,
    },

    #[error("git did not finish within {timeout_secs}s")]
    Timeout { timeout_secs: u64 },

    #[error("Branch '{branch}' not found")]
    BranchNotFound { branch: String },

    #[error("No remote configured")]
    NoRemote,

    #[error("Worktree not found at path: {path}")]
    WorktreeNotFound { path: PathBuf },

    #[error("Failed to remove worktree at '{path}': {message}")]
    WorktreeRemovalFailed { path: PathBuf, message: String },

    #[error("Git operation failed: {message}")]
    OperationFailed { message: String },

    #[error("git2 error: {source}")]
    Git2Error {
        #[from]
        source: git2::Error,
    },

    #[error("IO operation failed: {source}")]
    IoError {
        #[from]
        source: std::io::Error,
    },
}
