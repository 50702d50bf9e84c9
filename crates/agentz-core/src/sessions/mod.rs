//! The orchestrator request surface.

mod approve;
mod debug;
mod lifecycle;
mod query;
mod resume;
mod spawn;

pub use approve::approve;
pub use debug::{
    DebugRunRequest, DebugRunResponse, DebugRunStatus, OrchestrateOutcome, debug_with_agents,
    get_debug_run_status, orchestrate_debug_run,
};
pub use lifecycle::{CancelOutcome, cancel_session, delete_session};
pub use query::{
    DaemonStatus, SessionWithMetadata, daemon_status, get_changed_files, get_session,
    get_session_with_metadata, list_sessions,
};
pub use resume::{SendMessageRequest, send_message};
pub use spawn::{SpawnRequest, SpawnResponse, spawn_session};

use agentz_protocol::{Nonce, SessionId};

/// Current server timestamp in the registry's wire format.
pub(crate) fn now_rfc3339() -> String {
    chrono::Utc::now().to_rfc3339()
}

/// 12 lowercase hex chars from a v4 uuid.
pub(crate) fn generate_session_id() -> SessionId {
    let hex = uuid::Uuid::new_v4().simple().to_string();
    SessionId::new(&hex[..12])
}

/// 32 lowercase hex chars: the simple form of a v4 uuid.
pub(crate) fn generate_nonce() -> Nonce {
    Nonce::new(uuid::Uuid::new_v4().simple().to_string())
}
