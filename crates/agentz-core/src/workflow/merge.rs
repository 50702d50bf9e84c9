//! Merge a session's worktree branch to main, and revert such merges.

use serde::{Deserialize, Serialize};
use tracing::info;

use agentz_protocol::{SessionId, TaskMerge};

use crate::services::Services;
use crate::sessions;
use crate::tasks::TaskStore;
use crate::workflow::errors::WorkflowError;

const MAIN_BRANCH: &str = "main";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TaskMergeOutcome {
    pub merge_commit_hash: String,
}

/// Merge the session's worktree branch into main with `--no-ff`, then
/// record the merge on the owning task and mark it QA-pending.
///
/// On conflict the merge aborts with no partial state recorded anywhere —
/// the caller resolves manually.
pub fn merge_task_session(
    services: &Services,
    task_path: &str,
    session_id: &SessionId,
) -> Result<TaskMergeOutcome, WorkflowError> {
    let session = sessions::get_session(services, session_id)
        .map_err(|e| WorkflowError::Internal {
            message: e.to_string(),
        })?
        .ok_or_else(|| WorkflowError::Internal {
            message: format!("session '{}' not found", session_id),
        })?;

    let branch = session
        .worktree_branch
        .as_deref()
        .ok_or_else(|| WorkflowError::MissingWorktreeBranch {
            session_id: session_id.to_string(),
        })?;

    let outcome = agentz_git::merge_branch(services.repo_root(), MAIN_BRANCH, branch)?;

    let tasks = TaskStore::new(services.repo_root());
    tasks.record_merge(
        task_path,
        TaskMerge {
            session_id: session_id.clone(),
            commit_hash: outcome.merge_commit_hash.clone(),
            merged_at: chrono::Utc::now().to_rfc3339(),
            reverted_by: None,
        },
    )?;

    info!(
        event = "core.workflow.merge_completed",
        task_path,
        session_id = %session_id,
        hash = %outcome.merge_commit_hash,
    );
    Ok(TaskMergeOutcome {
        merge_commit_hash: outcome.merge_commit_hash,
    })
}

/// Revert a recorded merge and pair the revert hash with the merge record
/// (qaStatus becomes `fail`).
pub fn revert_task_merge(
    services: &Services,
    task_path: &str,
    merge_hash: &str,
) -> Result<String, WorkflowError> {
    let tasks = TaskStore::new(services.repo_root());
    let task = tasks.read_task(task_path)?;
    if !task
        .front_matter
        .merges
        .iter()
        .any(|m| m.commit_hash == merge_hash)
    {
        return Err(WorkflowError::MergeNotRecorded {
            task_path: task_path.to_string(),
            merge_hash: merge_hash.to_string(),
        });
    }

    let revert_hash = agentz_git::revert_merge(services.repo_root(), merge_hash)?;
    tasks.record_revert(task_path, merge_hash, &revert_hash)?;

    info!(
        event = "core.workflow.revert_completed",
        task_path,
        merge_hash,
        revert_hash = %revert_hash,
    );
    Ok(revert_hash)
}
