//! Resume a session by sending it a new message.
//!
//! A resume spawns a fresh worker carrying the previous worker's own resume
//! handle (`cli_session_id`), its last published conversation snapshot, and
//! the reconstructed message history. The new worker gets a fresh nonce;
//! the old one can never write again.

use serde::{Deserialize, Serialize};
use tracing::info;

use agentz_protocol::{
    AgentOutputChunk, ChunkKind, SCHEMA_VERSION, SessionEvent, SessionId,
};

use crate::errors::SessionError;
use crate::process::SpawnParams;
use crate::services::Services;
use crate::sessions::spawn::{stream_url, write_payload_file};
use crate::sessions::{generate_nonce, now_rfc3339};

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SendMessageRequest {
    pub session_id: SessionId,
    pub message: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub attachments: Vec<serde_json::Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub user_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub estimated_tokens: Option<u64>,
}

/// What the resumed worker is handed on its command line.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct ReconstructedConversation<'a> {
    message: &'a str,
    output: &'a [AgentOutputChunk],
    #[serde(skip_serializing_if = "Option::is_none")]
    agent_state: Option<&'a serde_json::Value>,
}

pub fn send_message(services: &Services, request: &SendMessageRequest) -> Result<u32, SessionError> {
    if let Some(user_id) = &request.user_id {
        let decision = services
            .limiter
            .check_limit(user_id, request.estimated_tokens);
        if !decision.allowed {
            return Err(SessionError::RateLimited {
                reason: decision.reason.unwrap_or_else(|| "rate limited".to_string()),
                retry_after_secs: decision.retry_after,
            });
        }
    }

    let session_id = &request.session_id;
    let session = crate::sessions::get_session(services, session_id)?.ok_or_else(|| {
        SessionError::NotFound {
            id: session_id.clone(),
        }
    })?;

    if services.monitor.is_daemon_alive(session_id)? {
        return Err(SessionError::Busy {
            id: session_id.clone(),
        });
    }

    // The user's message becomes part of the durable conversation before
    // the new worker starts.
    services.store.append_session(&SessionEvent::Output {
        schema_version: SCHEMA_VERSION,
        session_id: session_id.clone(),
        chunk: AgentOutputChunk {
            kind: ChunkKind::UserMessage,
            content: request.message.clone(),
            timestamp: now_rfc3339(),
            metadata: None,
            images: Vec::new(),
        },
    })?;

    let conversation = ReconstructedConversation {
        message: &request.message,
        output: &session.output,
        agent_state: session.agent_state.as_ref(),
    };
    let messages_path = write_payload_file(
        &services.paths.reconstructed_messages_file(session_id),
        &serde_json::to_vec(&conversation).unwrap_or_default(),
    )?;

    let attachments = if request.attachments.is_empty() {
        None
    } else {
        let json = serde_json::to_vec(&request.attachments).unwrap_or_default();
        Some(write_payload_file(
            &services.paths.attachments_file(session_id),
            &json,
        )?)
    };

    let prompt_file = write_payload_file(
        &services.paths.prompt_file(session_id),
        request.message.as_bytes(),
    )?;

    let params = SpawnParams {
        session_id: session_id.clone(),
        agent_type: session.agent_type,
        prompt_file,
        working_dir: session
            .worktree_path
            .as_deref()
            .unwrap_or(&session.working_dir)
            .into(),
        model: session.model.clone(),
        stream_url: stream_url(services),
        nonce: generate_nonce(),
        cli_session_id: session.cli_session_id.clone(),
        is_resume: true,
        task_path: session.task_path.clone(),
        title: session.title.clone(),
        debug_run_id: session.debug_run_id.clone(),
        reconstructed_messages: Some(messages_path),
        attachments,
        binary_override: services
            .config
            .agent_commands
            .get(session.agent_type.as_str())
            .cloned(),
        timeout_ms: services.config.runtime.cli_timeout_ms,
    };

    let record = services.monitor.spawn_worker(&params)?;

    if let Some(user_id) = &request.user_id {
        services
            .limiter
            .record_usage(user_id, request.estimated_tokens.unwrap_or(0));
    }

    info!(
        event = "core.session.resume_completed",
        session_id = %session_id,
        pid = record.pid,
        has_cli_session_id = session.cli_session_id.is_some(),
    );
    Ok(record.pid)
}
