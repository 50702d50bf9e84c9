//! Scoped commit of a task's files.

use serde::{Deserialize, Serialize};
use tracing::info;

use crate::services::Services;
use crate::workflow::errors::WorkflowError;
use crate::workflow::{task_sessions, task_touched_files};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TaskCommitOutcome {
    pub hash: String,
    pub files: Vec<String>,
}

/// Commit exactly the files the task's sessions touched (plus the task
/// file itself when modified), in the working copy of the task's most
/// recent session.
///
/// Every touched path must still be present in git status; a partially
/// clean union (some file reverted or already committed) refuses the whole
/// commit rather than silently narrowing its scope.
pub fn commit_task_files(
    services: &Services,
    task_path: &str,
    message: &str,
) -> Result<TaskCommitOutcome, WorkflowError> {
    let sessions = task_sessions(services, task_path)?;
    let mut files = task_touched_files(&sessions);

    // Newest session's working copy is where the edits live; without any
    // session the task file itself may still be dirty at the repo root.
    let cwd = sessions
        .first()
        .and_then(|session| session.worktree_path.clone())
        .map(std::path::PathBuf::from)
        .unwrap_or_else(|| services.repo_root().to_path_buf());

    let status = agentz_git::status(&cwd)?;
    if files.iter().any(|file| !status.contains(file)) {
        return Err(WorkflowError::NoUncommittedChanges {
            task_path: task_path.to_string(),
        });
    }
    if status.contains(task_path) && !files.iter().any(|f| f == task_path) {
        files.push(task_path.to_string());
    }
    if files.is_empty() {
        return Err(WorkflowError::NoUncommittedChanges {
            task_path: task_path.to_string(),
        });
    }

    let hash = agentz_git::commit_scoped(&cwd, &files, message)?;
    info!(
        event = "core.workflow.task_commit_completed",
        task_path,
        hash = %hash,
        files = files.len(),
    );
    Ok(TaskCommitOutcome { hash, files })
}

#[cfg(test)]
mod tests {
    use super::*;
    use agentz_config::ControlPlaneConfig;
    use agentz_protocol::{
        AgentOutputChunk, AgentType, ChunkKind, RegistryEvent, SCHEMA_VERSION, SessionEvent,
        SessionId,
    };
    use tempfile::TempDir;

    fn services_for_repo(dir: &TempDir) -> Services {
        let repo_root = dir.path().join("repo");
        std::fs::create_dir_all(&repo_root).unwrap();
        let repo = git2::Repository::init(&repo_root).unwrap();
        let mut config = repo.config().unwrap();
        config.set_str("user.name", "test").unwrap();
        config.set_str("user.email", "test@example.com").unwrap();
        std::fs::write(repo_root.join("base.txt"), "base\n").unwrap();
        agentz_git::commit_scoped(&repo_root, &["base.txt".to_string()], "base").unwrap();

        let mut config = ControlPlaneConfig::default();
        config.runtime.worktree_isolation = false;
        Services::new(&repo_root, config)
    }

    fn seed_session(services: &Services, id: &str, task_path: &str, touched: &[&str]) {
        services
            .store
            .append_registry(&RegistryEvent::SessionCreated {
                schema_version: SCHEMA_VERSION,
                session_id: SessionId::new(id),
                timestamp: "2026-03-01T12:00:00Z".to_string(),
                prompt: "p".to_string(),
                agent_type: AgentType::Claude,
                working_dir: services.repo_root().display().to_string(),
                title: None,
                task_path: Some(task_path.to_string()),
                source_file: None,
                source_line: None,
                debug_run_id: None,
                model: None,
                worktree_path: None,
                worktree_branch: None,
            })
            .unwrap();
        for file in touched {
            services
                .store
                .append_session(&SessionEvent::Output {
                    schema_version: SCHEMA_VERSION,
                    session_id: SessionId::new(id),
                    chunk: AgentOutputChunk::new(
                        ChunkKind::ToolUse,
                        format!(r#"{{"tool":"Write","input":{{"path":"{}"}}}}"#, file),
                        "t",
                    ),
                })
                .unwrap();
        }
    }

    #[test]
    fn test_commit_task_files_scopes_to_touched() {
        let dir = TempDir::new().unwrap();
        let services = services_for_repo(&dir);
        let repo_root = services.repo_root().to_path_buf();

        seed_session(&services, "aaaaaaaaaaaa", "tasks/t.md", &["src/x.rs"]);
        std::fs::create_dir_all(repo_root.join("src")).unwrap();
        std::fs::write(repo_root.join("src/x.rs"), "edited\n").unwrap();
        std::fs::write(repo_root.join("unrelated.txt"), "leave me\n").unwrap();

        let outcome = commit_task_files(&services, "tasks/t.md", "fix x").unwrap();
        assert_eq!(outcome.files, vec!["src/x.rs"]);
        assert!(outcome.hash.len() >= 7);

        // The unrelated file stays uncommitted.
        let status = agentz_git::status(&repo_root).unwrap();
        assert!(status.untracked.contains(&"unrelated.txt".to_string()));
    }

    #[test]
    fn test_commit_includes_modified_task_file() {
        let dir = TempDir::new().unwrap();
        let services = services_for_repo(&dir);
        let repo_root = services.repo_root().to_path_buf();

        // Commit the task file first so a later edit shows as modified.
        std::fs::create_dir_all(repo_root.join("tasks")).unwrap();
        std::fs::write(repo_root.join("tasks/t.md"), "# T\n").unwrap();
        agentz_git::commit_scoped(&repo_root, &["tasks/t.md".to_string()], "task").unwrap();

        seed_session(&services, "aaaaaaaaaaaa", "tasks/t.md", &[]);
        std::fs::write(repo_root.join("tasks/t.md"), "# T\n\nupdated\n").unwrap();

        let outcome = commit_task_files(&services, "tasks/t.md", "update task").unwrap();
        assert_eq!(outcome.files, vec!["tasks/t.md"]);
    }

    #[test]
    fn test_commit_refuses_partially_clean_union() {
        let dir = TempDir::new().unwrap();
        let services = services_for_repo(&dir);
        let repo_root = services.repo_root().to_path_buf();

        // The session touched both files, but only one is still dirty —
        // the other was reverted by hand. The whole commit is refused.
        seed_session(
            &services,
            "aaaaaaaaaaaa",
            "tasks/t.md",
            &["src/a.rs", "src/b.rs"],
        );
        std::fs::create_dir_all(repo_root.join("src")).unwrap();
        std::fs::write(repo_root.join("src/a.rs"), "edited\n").unwrap();

        let err = commit_task_files(&services, "tasks/t.md", "msg").unwrap_err();
        assert!(matches!(err, WorkflowError::NoUncommittedChanges { .. }));

        // Nothing was committed.
        let status = agentz_git::status(&repo_root).unwrap();
        assert!(status.untracked.contains(&"src/a.rs".to_string()));
    }

    #[test]
    fn test_commit_no_changes() {
        let dir = TempDir::new().unwrap();
        let services = services_for_repo(&dir);
        seed_session(&services, "aaaaaaaaaaaa", "tasks/t.md", &["src/x.rs"]);
        // src/x.rs was never actually written on disk.

        let err = commit_task_files(&services, "tasks/t.md", "msg").unwrap_err();
        assert!(matches!(err, WorkflowError::NoUncommittedChanges { .. }));
    }
}
