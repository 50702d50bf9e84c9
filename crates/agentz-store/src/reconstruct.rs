//! Pure session reconstruction from event streams.
//!
//! `reconstruct_session` is a fold with no side effects: identical inputs
//! yield identical snapshots regardless of wall-clock. The registry is the
//! sole source of truth for status, title, and lifecycle timestamps;
//! per-session streams contribute output, the worker's resume handle, and
//! its last published conversation state.

use serde::{Deserialize, Serialize};

use agentz_protocol::{
    AgentOutputChunk, AgentSessionMetadata, AgentType, DebugRunId, RegistryEvent, SessionEvent,
    SessionId, SessionStatus, TokenUsage,
};

/// A session snapshot as reconstructed from the streams.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Session {
    pub id: SessionId,
    pub prompt: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    pub status: SessionStatus,
    pub working_dir: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub worktree_path: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub worktree_branch: Option<String>,
    pub agent_type: AgentType,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub model: Option<String>,
    pub started_at: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub completed_at: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tokens_used: Option<TokenUsage>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cli_session_id: Option<String>,
    /// Earlier resume handles, oldest first; the latest lives in
    /// `cli_session_id`.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub resume_history: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub task_path: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub source_file: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub source_line: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub debug_run_id: Option<DebugRunId>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub metadata: Option<AgentSessionMetadata>,
    pub resumable: bool,
    /// Output chunks in stream order.
    #[serde(default)]
    pub output: Vec<AgentOutputChunk>,
    /// The worker's latest published conversation snapshot, for resume.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub agent_state: Option<serde_json::Value>,
}

impl Session {
    pub fn is_terminal(&self) -> bool {
        self.status.is_terminal()
    }

    pub fn is_active(&self) -> bool {
        self.status.is_active()
    }
}

/// Reconstruct one session from the full registry sequence and its
/// per-session sequence.
///
/// Returns `None` ("absent") when no `session_created` exists for the id,
/// or when any `session_deleted` tombstone exists for it — regardless of
/// later events.
pub fn reconstruct_session(
    registry: &[RegistryEvent],
    session_events: &[SessionEvent],
    id: &SessionId,
) -> Option<Session> {
    let deleted = registry.iter().any(|event| {
        matches!(event, RegistryEvent::SessionDeleted { session_id, .. } if session_id == id)
    });
    if deleted {
        return None;
    }

    let mut session: Option<Session> = None;

    for event in registry.iter().filter(|event| event.session_id() == id) {
        match event {
            RegistryEvent::SessionCreated {
                session_id,
                timestamp,
                prompt,
                agent_type,
                working_dir,
                title,
                task_path,
                source_file,
                source_line,
                debug_run_id,
                model,
                worktree_path,
                worktree_branch,
                ..
            } => {
                // Duplicate creations are writer bugs; first one wins.
                if session.is_none() {
                    session = Some(Session {
                        id: session_id.clone(),
                        prompt: prompt.clone(),
                        title: title.clone(),
                        status: SessionStatus::Pending,
                        working_dir: working_dir.clone(),
                        worktree_path: worktree_path.clone(),
                        worktree_branch: worktree_branch.clone(),
                        agent_type: *agent_type,
                        model: model.clone(),
                        started_at: timestamp.clone(),
                        completed_at: None,
                        tokens_used: None,
                        cli_session_id: None,
                        resume_history: Vec::new(),
                        task_path: task_path.clone(),
                        source_file: source_file.clone(),
                        source_line: *source_line,
                        debug_run_id: debug_run_id.clone(),
                        error: None,
                        metadata: None,
                        resumable: true,
                        output: Vec::new(),
                        agent_state: None,
                    });
                }
            }
            RegistryEvent::SessionUpdated { status, .. } => {
                // Events before session_created are ignored (I2).
                if let Some(s) = session.as_mut() {
                    s.status = *status;
                }
            }
            RegistryEvent::SessionCompleted {
                timestamp,
                metadata,
                tokens_used,
                ..
            } => {
                if let Some(s) = session.as_mut() {
                    s.status = SessionStatus::Completed;
                    s.completed_at = Some(timestamp.clone());
                    s.metadata = metadata.clone();
                    s.tokens_used = *tokens_used;
                }
            }
            RegistryEvent::SessionFailed {
                timestamp,
                error,
                metadata,
                ..
            } => {
                if let Some(s) = session.as_mut() {
                    s.status = SessionStatus::Failed;
                    s.completed_at = Some(timestamp.clone());
                    s.error = Some(error.clone());
                    s.metadata = metadata.clone();
                }
            }
            RegistryEvent::SessionCancelled { timestamp, .. } => {
                if let Some(s) = session.as_mut() {
                    s.status = SessionStatus::Cancelled;
                    s.completed_at = Some(timestamp.clone());
                }
            }
            RegistryEvent::SessionDeleted { .. } => unreachable!("filtered above"),
        }
    }

    let mut session = session?;

    for event in session_events.iter().filter(|event| event.session_id() == id) {
        match event {
            SessionEvent::Output { chunk, .. } => session.output.push(chunk.clone()),
            SessionEvent::CliSessionId { cli_session_id, .. } => {
                if let Some(previous) = session.cli_session_id.take()
                    && previous != *cli_session_id
                {
                    session.resume_history.push(previous);
                }
                session.cli_session_id = Some(cli_session_id.clone());
            }
            SessionEvent::AgentState { state, .. } => {
                session.agent_state = Some(state.clone());
            }
        }
    }

    session.resumable = session.status != SessionStatus::Cancelled;
    Some(session)
}
