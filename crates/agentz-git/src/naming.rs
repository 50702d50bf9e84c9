//! Branch-name derivation for session worktrees.
//!
//! `branch(sessionId)` is a pure function of the session id and the control
//! plane never renames it. The exact prefix is part of the external
//! contract.

use agentz_protocol::is_valid_session_id;

/// The git branch namespace used for session worktree branches.
pub const SESSION_BRANCH_PREFIX: &str = "agentz/session-";

/// Constructs the worktree branch name for a session.
///
/// Example: `"a1b2c3d4e5f6"` → `"agentz/session-a1b2c3d4e5f6"`.
pub fn session_branch(session_id: &str) -> String {
    format!("{}{}", SESSION_BRANCH_PREFIX, session_id)
}

/// Recover the session id from a session worktree branch name.
///
/// Returns `None` for branches outside the session namespace or with a
/// malformed id — orphan reclamation must only ever touch branches it can
/// attribute to a session.
pub fn session_id_from_branch(branch: &str) -> Option<&str> {
    let id = branch.strip_prefix(SESSION_BRANCH_PREFIX)?;
    is_valid_session_id(id).then_some(id)
}
