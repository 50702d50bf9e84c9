//! Task-scoped commit, merge-to-main, revert, and archive.

mod archive;
mod commit;
mod errors;
mod merge;

pub use archive::{ArchiveOutcome, archive_task};
pub use commit::{TaskCommitOutcome, commit_task_files};
pub use errors::WorkflowError;
pub use merge::{TaskMergeOutcome, merge_task_session, revert_task_merge};

use agentz_store::Session;

use crate::services::Services;
use crate::sessions;

/// Non-deleted sessions linked to a task, newest first.
pub(crate) fn task_sessions(
    services: &Services,
    task_path: &str,
) -> Result<Vec<Session>, WorkflowError> {
    Ok(sessions::list_sessions(services)
        .map_err(|e| WorkflowError::Internal {
            message: e.to_string(),
        })?
        .into_iter()
        .filter(|session| session.task_path.as_deref() == Some(task_path))
        .collect())
}

/// Repo-relative union of every file touched by the task's sessions.
pub(crate) fn task_touched_files(sessions: &[Session]) -> Vec<String> {
    let mut files: Vec<String> = Vec::new();
    for session in sessions {
        for info in agentz_store::derive_changed_files(session) {
            if !files.contains(&info.path) {
                files.push(info.path);
            }
        }
    }
    files
}
