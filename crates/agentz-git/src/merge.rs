//! Branch merges and merge reverts.

use std::path::Path;

use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::errors::GitError;
use crate::runner::{run_git, run_git_checked, sanitize_git_error};
use crate::validation::{ensure_in_repo, validate_branch_name};

/// Result of a successful merge.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MergeOutcome {
    pub merge_commit_hash: String,
}

fn branch_exists(cwd: &Path, branch: &str) -> Result<bool, GitError> {
    let ref_arg = format!("refs/heads/{}", branch);
    let output = run_git(cwd, &["show-ref", "--verify", "--quiet", ref_arg.as_str()])?;
    Ok(output.success())
}

fn current_branch(cwd: &Path) -> Result<String, GitError> {
    let output = run_git_checked(cwd, &["rev-parse", "--abbrev-ref", "HEAD"])?;
    Ok(output.stdout_text().trim().to_string())
}

/// Merge `source` into `target` with `--no-ff` and a deterministic message.
///
/// The repository is returned to the branch the caller started on, whether
/// the merge succeeds, conflicts, or fails. On conflict the merge is
/// aborted, no partial state is left behind, and `Conflict` is returned.
pub fn merge_branch(cwd: &Path, target: &str, source: &str) -> Result<MergeOutcome, GitError> {
    ensure_in_repo(cwd)?;
    validate_branch_name(target)?;
    validate_branch_name(source)?;

    for branch in [target, source] {
        if !branch_exists(cwd, branch)? {
            return Err(GitError::BranchNotFound {
                branch: branch.to_string(),
            });
        }
    }

    let starting_branch = current_branch(cwd)?;

    info!(
        event = "git.merge.started",
        target, source,
        cwd = %cwd.display(),
    );

    if starting_branch != target {
        run_git_checked(cwd, &["checkout", target])?;
    }

    let message = format!("Merge branch '{}' into {}", source, target);
    let merge_result = run_git(cwd, &["merge", "--no-ff", "-m", message.as_str(), source]);

    let outcome = match merge_result {
        Ok(output) if output.success() => {
            let hash = run_git_checked(cwd, &["rev-parse", "HEAD"])?
                .stdout_text()
                .trim()
                .to_string();
            info!(event = "git.merge.completed", target, source, hash = %hash);
            Ok(MergeOutcome {
                merge_commit_hash: hash,
            })
        }
        Ok(output) => {
            let conflicted = output.stdout_text().contains("CONFLICT")
                || output.stderr.contains("CONFLICT")
                || output.stderr.contains("Automatic merge failed");

            if conflicted {
                // Abort to leave the target branch exactly as it was.
                if let Err(e) = run_git_checked(cwd, &["merge", "--abort"]) {
                    warn!(
                        event = "git.merge.abort_failed",
                        target, source,
                        error = %e,
                    );
                }
                warn!(event = "git.merge.conflicts", target, source);
                Err(GitError::Conflict {
                    target_branch: target.to_string(),
                    source_branch: source.to_string(),
                })
            } else {
                Err(GitError::GitFailure {
                    code: output.code,
                    sanitized: sanitize_git_error(&output.stderr),
                })
            }
        }
        Err(e) => Err(e),
    };

    // Never leave the repo on a different branch than the caller started on.
    if starting_branch != target {
        if let Err(e) = run_git_checked(cwd, &["checkout", starting_branch.as_str()]) {
            warn!(
                event = "git.merge.restore_branch_failed",
                branch = %starting_branch,
                error = %e,
            );
        }
    }

    outcome
}

/// Revert a merge commit, keeping the first parent's line of history.
pub fn revert_merge(cwd: &Path, merge_hash: &str) -> Result<String, GitError> {
    ensure_in_repo(cwd)?;
    if merge_hash.is_empty() || !merge_hash.chars().all(|c| c.is_ascii_hexdigit()) {
        return Err(GitError::OperationFailed {
            message: format!("Invalid merge commit hash: '{}'", merge_hash),
        });
    }

    run_git_checked(cwd, &["revert", "-m", "1", "--no-edit", merge_hash])?;
    let hash = run_git_checked(cwd, &["rev-parse", "HEAD"])?
        .stdout_text()
        .trim()
        .to_string();

    info!(
        event = "git.merge.revert_completed",
        merge_hash,
        revert_hash = %hash,
    );
    Ok(hash)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::commit::commit_scoped;
    use crate::runner::run_git;

    fn init_repo(dir: &Path) {
        let repo = git2::Repository::init(dir).unwrap();
        let mut config = repo.config().unwrap();
        config.set_str("user.name", "test").unwrap();
        config.set_str("user.email", "test@example.com").unwrap();
        run_git(dir, &["checkout", "-b", "main"]).unwrap();
        std::fs::write(dir.join("base.txt"), "base\n").unwrap();
        commit_scoped(dir, &["base.txt".to_string()], "base").unwrap();
    }

    #[test]
    fn test_merge_no_ff_produces_two_parent_commit() {
        let dir = tempfile::TempDir::new().unwrap();
        init_repo(dir.path());

        run_git(dir.path(), &["checkout", "-b", "agentz/session-aaaaaaaaaaaa"]).unwrap();
        std::fs::write(dir.path().join("x.txt"), "x\n").unwrap();
        commit_scoped(dir.path(), &["x.txt".to_string()], "fix x").unwrap();
        run_git(dir.path(), &["checkout", "main"]).unwrap();
        let prior_head = run_git(dir.path(), &["rev-parse", "HEAD"])
            .unwrap()
            .stdout_text()
            .trim()
            .to_string();

        let outcome = merge_branch(dir.path(), "main", "agentz/session-aaaaaaaaaaaa").unwrap();
        assert_eq!(outcome.merge_commit_hash.len(), 40);

        // P8: two parents, parent 1 = prior HEAD of target.
        let parents = run_git(dir.path(), &["rev-list", "--parents", "-n", "1", "HEAD"])
            .unwrap()
            .stdout_text();
        let fields: Vec<&str> = parents.split_whitespace().collect();
        assert_eq!(fields.len(), 3);
        assert_eq!(fields[1], prior_head);

        assert_eq!(current_branch(dir.path()).unwrap(), "main");
    }

    #[test]
    fn test_merge_restores_starting_branch() {
        let dir = tempfile::TempDir::new().unwrap();
        init_repo(dir.path());

        run_git(dir.path(), &["checkout", "-b", "agentz/session-bbbbbbbbbbbb"]).unwrap();
        std::fs::write(dir.path().join("y.txt"), "y\n").unwrap();
        commit_scoped(dir.path(), &["y.txt".to_string()], "add y").unwrap();

        // Stay on the session branch while merging into main.
        merge_branch(dir.path(), "main", "agentz/session-bbbbbbbbbbbb").unwrap();
        assert_eq!(
            current_branch(dir.path()).unwrap(),
            "agentz/session-bbbbbbbbbbbb"
        );
    }

    #[test]
    fn test_merge_conflict_aborts_cleanly() {
        let dir = tempfile::TempDir::new().unwrap();
        init_repo(dir.path());

        run_git(dir.path(), &["checkout", "-b", "agentz/session-cccccccccccc"]).unwrap();
        std::fs::write(dir.path().join("base.txt"), "branch change\n").unwrap();
        commit_scoped(dir.path(), &["base.txt".to_string()], "branch side").unwrap();

        run_git(dir.path(), &["checkout", "main"]).unwrap();
        std::fs::write(dir.path().join("base.txt"), "main change\n").unwrap();
        commit_scoped(dir.path(), &["base.txt".to_string()], "main side").unwrap();
        let head_before = run_git(dir.path(), &["rev-parse", "HEAD"])
            .unwrap()
            .stdout_text();

        let err = merge_branch(dir.path(), "main", "agentz/session-cccccccccccc").unwrap_err();
        assert!(matches!(err, GitError::Conflict { .. }));

        // No partial state: HEAD unchanged, tree clean, still on main.
        let head_after = run_git(dir.path(), &["rev-parse", "HEAD"])
            .unwrap()
            .stdout_text();
        assert_eq!(head_before, head_after);
        assert!(crate::status::status(dir.path()).unwrap().is_clean());
        assert_eq!(current_branch(dir.path()).unwrap(), "main");
    }

    #[test]
    fn test_merge_requires_both_branches() {
        let dir = tempfile::TempDir::new().unwrap();
        init_repo(dir.path());
        let err = merge_branch(dir.path(), "main", "agentz/session-dddddddddddd").unwrap_err();
        assert!(matches!(err, GitError::BranchNotFound { .. }));
    }

    #[test]
    fn test_revert_merge() {
        let dir = tempfile::TempDir::new().unwrap();
        init_repo(dir.path());

        run_git(dir.path(), &["checkout", "-b", "agentz/session-eeeeeeeeeeee"]).unwrap();
        std::fs::write(dir.path().join("z.txt"), "z\n").unwrap();
        commit_scoped(dir.path(), &["z.txt".to_string()], "add z").unwrap();
        run_git(dir.path(), &["checkout", "main"]).unwrap();

        let outcome = merge_branch(dir.path(), "main", "agentz/session-eeeeeeeeeeee").unwrap();
        assert!(dir.path().join("z.txt").exists());

        let revert_hash = revert_merge(dir.path(), &outcome.merge_commit_hash).unwrap();
        assert_eq!(revert_hash.len(), 40);
        assert!(!dir.path().join("z.txt").exists());
    }

    #[test]
    fn test_revert_rejects_bad_hash() {
        let dir = tempfile::TempDir::new().unwrap();
        init_repo(dir.path());
        assert!(revert_merge(dir.path(), "not-a-hash").is_err());
        assert!(revert_merge(dir.path(), "").is_err());
    }
}
