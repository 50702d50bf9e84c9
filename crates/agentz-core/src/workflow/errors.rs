#[derive(Debug, thiserror::Error)]
pub enum WorkflowError {
    #[error("no uncommitted changes for task '{task_path}'")]
    NoUncommittedChanges { task_path: String },

    #[error("task '{task_path}' has uncommitted files in session working copies: {files:?}")]
    UncommittedTaskFiles {
        task_path: String,
        files: Vec<String>,
    },

    #[error("unrelated files are staged: {files:?}")]
    UnrelatedStagedFiles { files: Vec<String> },

    #[error("session '{session_id}' has no worktree branch to merge")]
    MissingWorktreeBranch { session_id: String },

    #[error("no merge with commit hash '{merge_hash}' recorded on task '{task_path}'")]
    MergeNotRecorded {
        task_path: String,
        merge_hash: String,
    },

    #[error("Git operation failed: {source}")]
    GitError {
        #[from]
        source: agentz_git::GitError,
    },

    #[error("Task operation failed: {source}")]
    TaskError {
        #[from]
        source: crate::tasks::TaskError,
    },

    #[error("{message}")]
    Internal { message: String },
}
