//! Task archive: worktree teardown, file move, rename commit.

use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::services::Services;
use crate::tasks::TaskStore;
use crate::workflow::errors::WorkflowError;
use crate::workflow::{task_sessions, task_touched_files};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ArchiveOutcome {
    pub archived_path: String,
    pub commit_hash: String,
    pub worktrees_removed: usize,
}

/// Archive a task: refuse while task files are uncommitted anywhere or
/// unrelated files are staged, force-delete the task's worktrees
/// (best-effort), move the file to `tasks/archive/YYYY-MM/`, and commit
/// the rename with a deterministic message.
pub fn archive_task(services: &Services, task_path: &str) -> Result<ArchiveOutcome, WorkflowError> {
    let sessions = task_sessions(services, task_path)?;
    let touched = task_touched_files(&sessions);

    // Uncommitted task files in any session working copy block the archive.
    for session in &sessions {
        let cwd = session
            .worktree_path
            .as_deref()
            .unwrap_or(&session.working_dir);
        let Ok(status) = agentz_git::status(std::path::Path::new(cwd)) else {
            continue;
        };
        let dirty: Vec<String> = touched
            .iter()
            .filter(|file| status.contains(file))
            .cloned()
            .collect();
        if !dirty.is_empty() {
            return Err(WorkflowError::UncommittedTaskFiles {
                task_path: task_path.to_string(),
                files: dirty,
            });
        }
    }

    // Staged-but-unrelated files at the repo root would ride along with the
    // rename commit.
    let root_status = agentz_git::status(services.repo_root())?;
    let unrelated: Vec<String> = root_status
        .staged
        .iter()
        .filter(|file| *file != task_path && !touched.contains(file))
        .cloned()
        .collect();
    if !unrelated.is_empty() {
        return Err(WorkflowError::UnrelatedStagedFiles { files: unrelated });
    }

    // Worktree teardown is best-effort; archive proceeds regardless.
    let mut worktrees_removed = 0;
    for session in &sessions {
        let Some(worktree_path) = session.worktree_path.as_deref() else {
            continue;
        };
        match agentz_git::delete_worktree(
            services.repo_root(),
            std::path::Path::new(worktree_path),
            false,
            true,
        ) {
            Ok(()) => worktrees_removed += 1,
            Err(e) => {
                warn!(
                    event = "core.workflow.archive_worktree_cleanup_failed",
                    task_path,
                    worktree = worktree_path,
                    error = %e,
                );
            }
        }
    }

    let year_month = chrono::Utc::now().format("%Y-%m").to_string();
    let tasks = TaskStore::new(services.repo_root());
    let archived_path = tasks.archive_task(task_path, &year_month)?;

    let file_name = std::path::Path::new(task_path)
        .file_name()
        .and_then(|n| n.to_str())
        .unwrap_or(task_path);
    let commit_hash = agentz_git::commit_scoped(
        services.repo_root(),
        &[task_path.to_string(), archived_path.clone()],
        &format!("chore: archive task {}", file_name),
    )?;

    info!(
        event = "core.workflow.archive_completed",
        task_path,
        archived_path = %archived_path,
        commit = %commit_hash,
        worktrees_removed,
    );
    Ok(ArchiveOutcome {
        archived_path,
        commit_hash,
        worktrees_removed,
    })
}
