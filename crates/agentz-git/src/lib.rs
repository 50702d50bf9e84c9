pub mod commit;
pub mod diff;
mod errors;
pub mod merge;
mod naming;
pub mod remote;
mod runner;
pub mod status;
mod validation;
pub mod worktree;

pub use commit::{CommitInfo, commit_scoped, commits_for_files};
pub use diff::{DiffView, FileDiff, diff_file};
pub use errors::GitError;
pub use merge::{MergeOutcome, merge_branch, revert_merge};
pub use naming::{SESSION_BRANCH_PREFIX, session_branch, session_id_from_branch};
pub use remote::{PushOptions, push};
pub use runner::{GIT_TIMEOUT, GitOutput, run_git, run_git_checked, sanitize_git_error};
pub use status::{GitStatus, status};
pub use validation::{
    ensure_in_repo, is_git_repo, is_valid_branch_name, validate_branch_name, validate_git_arg,
    validate_repo_relative_path,
};
pub use worktree::{
    WorktreeDetails, WorktreeInfo, cleanup_orphaned, delete_worktree, ensure_worktree,
    list_worktrees_detailed, lookup,
};
