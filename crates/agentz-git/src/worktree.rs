//! Session worktree isolation.
//!
//! Each session gets a worktree at `<repoRootParent>/.agentz-worktrees/<id>`
//! on branch `agentz/session-<id>`. The git2 worktree name (the directory
//! under `.git/worktrees/`) cannot contain slashes, so it is decoupled from
//! the branch name via `WorktreeAddOptions::reference()`.

use std::path::{Path, PathBuf};

use git2::{BranchType, Repository, WorktreeAddOptions};
use serde::{Deserialize, Serialize};
use tracing::{debug, error, info, warn};

use agentz_paths::ControlPlanePaths;
use agentz_protocol::is_valid_session_id;

use crate::errors::GitError;
use crate::naming::{session_branch, session_id_from_branch};
use crate::runner::run_git;
use crate::status::status;

/// A session worktree as found on disk.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WorktreeInfo {
    pub path: PathBuf,
    pub branch: String,
}

/// One git-registered worktree with its bookkeeping state.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WorktreeDetails {
    pub path: PathBuf,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub branch: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub head: Option<String>,
    pub locked: bool,
    pub prunable: bool,
}

/// Flat, filesystem-safe git2 worktree name for a session.
fn admin_name(session_id: &str) -> String {
    format!("agentz-session-{}", session_id)
}

/// Create (or find) the isolated worktree for a session. Idempotent.
///
/// When isolation is disabled this is a no-op and the session runs directly
/// in the repository root. On a partial failure every created artifact
/// (branch, worktree registration, directory) is rolled back.
pub fn ensure_worktree(
    repo_root: &Path,
    session_id: &str,
    enabled: bool,
) -> Result<PathBuf, GitError> {
    if !enabled {
        debug!(
            event = "git.worktree.isolation_disabled",
            session_id,
            repo_root = %repo_root.display(),
        );
        return Ok(repo_root.to_path_buf());
    }

    if !is_valid_session_id(session_id) {
        return Err(GitError::OperationFailed {
            message: format!("Invalid session id: '{}'", session_id),
        });
    }

    if let Some(existing) = lookup(repo_root, session_id)? {
        debug!(
            event = "git.worktree.ensure_existing",
            session_id,
            path = %existing.path.display(),
        );
        return Ok(existing.path);
    }

    let paths = ControlPlanePaths::for_repo(repo_root);
    let worktree_path = paths
        .worktree_path(session_id)
        .map_err(|e| GitError::OperationFailed {
            message: e.to_string(),
        })?;
    let branch_name = session_branch(session_id);

    info!(
        event = "git.worktree.create_started",
        session_id,
        path = %worktree_path.display(),
        branch = %branch_name,
    );

    let repo = Repository::open(repo_root)?;

    let mut created_branch = false;
    if repo.find_branch(&branch_name, BranchType::Local).is_err() {
        let head_commit = repo.head()?.peel_to_commit()?;
        repo.branch(&branch_name, &head_commit, false)?;
        created_branch = true;
    }

    if let Some(parent) = worktree_path.parent() {
        std::fs::create_dir_all(parent).map_err(|e| GitError::IoError { source: e })?;
    }

    let result = (|| -> Result<(), GitError> {
        let branch_ref = repo
            .find_branch(&branch_name, BranchType::Local)?
            .into_reference();
        let mut opts = WorktreeAddOptions::new();
        opts.reference(Some(&branch_ref));
        repo.worktree(&admin_name(session_id), &worktree_path, Some(&opts))?;
        Ok(())
    })();

    if let Err(e) = result {
        // Roll back partial state so a retry starts clean.
        error!(
            event = "git.worktree.create_failed",
            session_id,
            error = %e,
        );
        if worktree_path.exists() {
            let _ = std::fs::remove_dir_all(&worktree_path);
        }
        if let Ok(worktree) = repo.find_worktree(&admin_name(session_id)) {
            let _ = worktree.prune(None);
        }
        if created_branch
            && let Ok(mut branch) = repo.find_branch(&branch_name, BranchType::Local)
        {
            let _ = branch.delete();
        }
        return Err(e);
    }

    info!(
        event = "git.worktree.create_completed",
        session_id,
        path = %worktree_path.display(),
    );
    Ok(worktree_path)
}

/// Find a session's worktree, if registered.
pub fn lookup(repo_root: &Path, session_id: &str) -> Result<Option<WorktreeInfo>, GitError> {
    let repo = Repository::open(repo_root)?;
    let Ok(worktree) = repo.find_worktree(&admin_name(session_id)) else {
        return Ok(None);
    };
    if !worktree.path().exists() {
        return Ok(None);
    }
    Ok(Some(WorktreeInfo {
        path: worktree.path().to_path_buf(),
        branch: session_branch(session_id),
    }))
}

/// Safety check: refuse to delete a path that is a main git repository
/// checkout.
///
/// A main checkout has a `.git` **directory** at its root, while worktrees
/// have a `.git` **file** pointing back at the main repo. This prevents
/// deletion of project roots via `remove_dir_all`.
fn assert_not_main_repo(worktree_path: &Path) -> Result<(), GitError> {
    let dot_git = worktree_path.join(".git");
    if dot_git.is_dir() {
        error!(
            event = "git.worktree.remove_blocked_main_repo",
            path = %worktree_path.display(),
        );
        return Err(GitError::WorktreeRemovalFailed {
            path: worktree_path.to_path_buf(),
            message: "Path is a main git repository, not a worktree".to_string(),
        });
    }
    Ok(())
}

/// Remove a worktree and, unless `keep_branch`, delete its branch when
/// fully merged (always when `force`).
///
/// Without `force`, a worktree with uncommitted changes is refused.
pub fn delete_worktree(
    repo_root: &Path,
    worktree_path: &Path,
    keep_branch: bool,
    force: bool,
) -> Result<(), GitError> {
    assert_not_main_repo(worktree_path)?;

    if !force
        && worktree_path.exists()
        && let Ok(wt_status) = status(worktree_path)
        && !wt_status.is_clean()
    {
        return Err(GitError::WorktreeRemovalFailed {
            path: worktree_path.to_path_buf(),
            message: "worktree has uncommitted changes (use force to discard)".to_string(),
        });
    }

    let repo = Repository::open(repo_root)?;
    let Some(found) = find_worktree_by_path(&repo, worktree_path) else {
        return Err(GitError::WorktreeNotFound {
            path: worktree_path.to_path_buf(),
        });
    };
    let (name, worktree) = found;

    let branch_name = name.strip_prefix("agentz-session-").map(session_branch);

    if worktree_path.exists() {
        std::fs::remove_dir_all(worktree_path).map_err(|e| GitError::IoError { source: e })?;
    }
    let mut prune_opts = git2::WorktreePruneOptions::new();
    prune_opts.working_tree(true).valid(true);
    worktree.prune(Some(&mut prune_opts))?;

    if !keep_branch
        && let Some(branch_name) = branch_name
    {
        delete_branch_if_safe(repo_root, &branch_name, force);
    }

    info!(
        event = "git.worktree.remove_completed",
        path = %worktree_path.display(),
    );
    Ok(())
}

/// `git branch -d` (or `-D` when forced); "not fully merged" refusals are
/// logged and swallowed — the branch outliving its worktree is fine.
fn delete_branch_if_safe(repo_root: &Path, branch: &str, force: bool) {
    let flag = if force { "-D" } else { "-d" };
    match run_git(repo_root, &["branch", flag, branch]) {
        Ok(output) if output.success() => {
            debug!(event = "git.worktree.branch_deleted", branch);
        }
        Ok(output) => {
            debug!(
                event = "git.worktree.branch_delete_skipped",
                branch,
                stderr = %output.stderr.trim(),
            );
        }
        Err(e) => {
            warn!(
                event = "git.worktree.branch_delete_failed",
                branch,
                error = %e,
            );
        }
    }
}

fn find_worktree_by_path(
    repo: &Repository,
    worktree_path: &Path,
) -> Option<(String, git2::Worktree)> {
    let names = repo.worktrees().ok()?;
    for name in names.iter().flatten() {
        if let Ok(worktree) = repo.find_worktree(name)
            && worktree.path() == worktree_path
        {
            return Some((name.to_string(), worktree));
        }
    }
    None
}

/// Every git-registered worktree with HEAD, branch, and lock/prune state.
pub fn list_worktrees_detailed(repo_root: &Path) -> Result<Vec<WorktreeDetails>, GitError> {
    let repo = Repository::open(repo_root)?;
    let names = repo.worktrees()?;

    let mut details = Vec::new();
    for name in names.iter().flatten() {
        let Ok(worktree) = repo.find_worktree(name) else {
            continue;
        };
        let path = worktree.path().to_path_buf();
        let locked = matches!(worktree.is_locked(), Ok(git2::WorktreeLockStatus::Locked(_)));
        let prunable = !path.exists();

        let (branch, head) = match Repository::open_from_worktree(&worktree) {
            Ok(wt_repo) => match wt_repo.head() {
                Ok(head_ref) => (
                    head_ref.shorthand().map(str::to_string),
                    head_ref.target().map(|oid| oid.to_string()),
                ),
                Err(_) => (None, None),
            },
            Err(_) => (None, None),
        };

        details.push(WorktreeDetails {
            path,
            branch,
            head,
            locked,
            prunable,
        });
    }
    Ok(details)
}

/// Remove every session worktree whose id is not in `active_session_ids`.
///
/// Orphans with uncommitted changes are skipped (not failed on) unless
/// `force` — the task-archive path forces. Returns the number removed.
pub fn cleanup_orphaned(
    repo_root: &Path,
    active_session_ids: &[String],
    force: bool,
) -> Result<usize, GitError> {
    let details = list_worktrees_detailed(repo_root)?;
    let mut removed = 0;

    for detail in details {
        let Some(branch) = detail.branch.as_deref() else {
            continue;
        };
        let Some(session_id) = session_id_from_branch(branch) else {
            // Not a session worktree; never touch it.
            continue;
        };
        if active_session_ids.iter().any(|id| id == session_id) {
            continue;
        }

        match delete_worktree(repo_root, &detail.path, false, force) {
            Ok(()) => {
                info!(
                    event = "git.worktree.orphan_removed",
                    session_id,
                    path = %detail.path.display(),
                );
                removed += 1;
            }
            Err(e) => {
                warn!(
                    event = "git.worktree.orphan_skipped",
                    session_id,
                    path = %detail.path.display(),
                    error = %e,
                );
            }
        }
    }

    Ok(removed)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::commit::commit_scoped;

    fn init_repo(dir: &Path) {
        let repo = Repository::init(dir).unwrap();
        let mut config = repo.config().unwrap();
        config.set_str("user.name", "test").unwrap();
        config.set_str("user.email", "test@example.com").unwrap();
        std::fs::write(dir.join("base.txt"), "base\n").unwrap();
        commit_scoped(dir, &["base.txt".to_string()], "base").unwrap();
    }

    /// Repo nested one level down so the worktree base has a writable parent.
    fn repo_in(dir: &tempfile::TempDir) -> PathBuf {
        let repo_root = dir.path().join("repo");
        std::fs::create_dir_all(&repo_root).unwrap();
        init_repo(&repo_root);
        repo_root
    }

    #[test]
    fn test_ensure_worktree_creates_branch_and_path() {
        let dir = tempfile::TempDir::new().unwrap();
        let repo_root = repo_in(&dir);

        let path = ensure_worktree(&repo_root, "a1b2c3d4e5f6", true).unwrap();
        assert_eq!(
            path,
            dir.path().join(".agentz-worktrees").join("a1b2c3d4e5f6")
        );
        assert!(path.exists());
        assert!(path.join("base.txt").exists());

        let repo = Repository::open(&repo_root).unwrap();
        assert!(
            repo.find_branch("agentz/session-a1b2c3d4e5f6", BranchType::Local)
                .is_ok()
        );
    }

    #[test]
    fn test_ensure_worktree_is_idempotent() {
        let dir = tempfile::TempDir::new().unwrap();
        let repo_root = repo_in(&dir);

        let first = ensure_worktree(&repo_root, "a1b2c3d4e5f6", true).unwrap();
        let second = ensure_worktree(&repo_root, "a1b2c3d4e5f6", true).unwrap();
        assert_eq!(first, second);
    }

    #[test]
    fn test_ensure_worktree_disabled_is_noop() {
        let dir = tempfile::TempDir::new().unwrap();
        let repo_root = repo_in(&dir);

        let path = ensure_worktree(&repo_root, "a1b2c3d4e5f6", false).unwrap();
        assert_eq!(path, repo_root);
        assert!(!dir.path().join(".agentz-worktrees").exists());
    }

    #[test]
    fn test_ensure_worktree_rejects_bad_session_id() {
        let dir = tempfile::TempDir::new().unwrap();
        let repo_root = repo_in(&dir);
        assert!(ensure_worktree(&repo_root, "not-hex", true).is_err());
    }

    #[test]
    fn test_lookup() {
        let dir = tempfile::TempDir::new().unwrap();
        let repo_root = repo_in(&dir);

        assert!(lookup(&repo_root, "a1b2c3d4e5f6").unwrap().is_none());

        let path = ensure_worktree(&repo_root, "a1b2c3d4e5f6", true).unwrap();
        let info = lookup(&repo_root, "a1b2c3d4e5f6").unwrap().unwrap();
        assert_eq!(info.path, path);
        assert_eq!(info.branch, "agentz/session-a1b2c3d4e5f6");
    }

    #[test]
    fn test_delete_worktree_refuses_dirty_without_force() {
        let dir = tempfile::TempDir::new().unwrap();
        let repo_root = repo_in(&dir);

        let path = ensure_worktree(&repo_root, "a1b2c3d4e5f6", true).unwrap();
        std::fs::write(path.join("dirty.txt"), "uncommitted").unwrap();

        let err = delete_worktree(&repo_root, &path, false, false).unwrap_err();
        assert!(matches!(err, GitError::WorktreeRemovalFailed { .. }));
        assert!(path.exists());

        delete_worktree(&repo_root, &path, false, true).unwrap();
        assert!(!path.exists());
    }

    #[test]
    fn test_delete_worktree_blocks_main_repo() {
        let dir = tempfile::TempDir::new().unwrap();
        let repo_root = repo_in(&dir);

        let err = delete_worktree(&repo_root, &repo_root, false, true).unwrap_err();
        assert!(matches!(err, GitError::WorktreeRemovalFailed { .. }));
        assert!(repo_root.exists());
    }

    #[test]
    fn test_list_worktrees_detailed() {
        let dir = tempfile::TempDir::new().unwrap();
        let repo_root = repo_in(&dir);

        ensure_worktree(&repo_root, "a1b2c3d4e5f6", true).unwrap();
        let details = list_worktrees_detailed(&repo_root).unwrap();
        assert_eq!(details.len(), 1);
        assert_eq!(
            details[0].branch.as_deref(),
            Some("agentz/session-a1b2c3d4e5f6")
        );
        assert!(details[0].head.is_some());
        assert!(!details[0].locked);
        assert!(!details[0].prunable);
    }

    #[test]
    fn test_cleanup_orphaned_skips_active_and_dirty() {
        let dir = tempfile::TempDir::new().unwrap();
        let repo_root = repo_in(&dir);

        let active = ensure_worktree(&repo_root, "aaaaaaaaaaaa", true).unwrap();
        let orphan_clean = ensure_worktree(&repo_root, "bbbbbbbbbbbb", true).unwrap();
        let orphan_dirty = ensure_worktree(&repo_root, "cccccccccccc", true).unwrap();
        std::fs::write(orphan_dirty.join("dirty.txt"), "x").unwrap();

        let removed =
            cleanup_orphaned(&repo_root, &["aaaaaaaaaaaa".to_string()], false).unwrap();
        assert_eq!(removed, 1);
        assert!(active.exists());
        assert!(!orphan_clean.exists());
        assert!(orphan_dirty.exists());

        // The archive path forces.
        let removed = cleanup_orphaned(&repo_root, &["aaaaaaaaaaaa".to_string()], true).unwrap();
        assert_eq!(removed, 1);
        assert!(!orphan_dirty.exists());
        assert!(active.exists());
    }
}
