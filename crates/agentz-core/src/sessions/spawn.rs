//! Session spawn: the entry point that starts work.

use std::path::PathBuf;

use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use agentz_config::DANGEROUS_COMMANDS;
use agentz_protocol::{
    AgentType, DebugRunId, RegistryEvent, SCHEMA_VERSION, SessionId, SessionStatus,
};

use crate::errors::SessionError;
use crate::process::SpawnParams;
use crate::services::Services;
use crate::sessions::{generate_nonce, generate_session_id, now_rfc3339};

/// Ingester address used when the daemon has not written its address file
/// yet; workers buffer and retry until it is reachable.
pub(crate) const DEFAULT_INGESTER_ADDR: &str = "tcp://127.0.0.1:7465";

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SpawnRequest {
    pub prompt: String,
    #[serde(default)]
    pub agent_type: Option<AgentType>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub model: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub task_path: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub source_file: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub source_line: Option<u32>,
    /// Base64 payloads handed to the worker via the attachments file.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub attachments: Vec<serde_json::Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub debug_run_id: Option<DebugRunId>,
    /// Rate-limit principal; mutations are gated when present.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub user_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub estimated_tokens: Option<u64>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SpawnResponse {
    pub session_id: SessionId,
    pub status: SessionStatus,
    pub pid: u32,
}

/// Spawn a new session: isolate a worktree, durably record the creation,
/// and launch a detached worker.
pub fn spawn_session(
    services: &Services,
    request: &SpawnRequest,
) -> Result<SpawnResponse, SessionError> {
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

    check_dangerous_patterns(&request.prompt)?;

    let limit = services.config.runtime.max_concurrent_agents;
    if services.monitor.live_count() >= limit {
        return Err(SessionError::ConcurrencyLimit { limit });
    }

    let session_id = generate_session_id();
    let nonce = generate_nonce();
    let agent_type = request
        .agent_type
        .or_else(|| {
            services
                .config
                .default_agent
                .as_deref()
                .and_then(|name| name.parse().ok())
        })
        .unwrap_or_default();

    let (working_dir, worktree_path, worktree_branch) = resolve_working_dir(services, &session_id)?;
    check_allowed_path(services, &working_dir)?;

    let prompt_file = write_payload_file(
        &services.paths.prompt_file(&session_id),
        request.prompt.as_bytes(),
    )?;
    let attachments = if request.attachments.is_empty() {
        None
    } else {
        let json = serde_json::to_vec(&request.attachments).unwrap_or_default();
        Some(write_payload_file(
            &services.paths.attachments_file(&session_id),
            &json,
        )?)
    };

    // Durable creation first: if the registry append fails, the spawn never
    // happened.
    services
        .store
        .append_registry(&RegistryEvent::SessionCreated {
            schema_version: SCHEMA_VERSION,
            session_id: session_id.clone(),
            timestamp: now_rfc3339(),
            prompt: request.prompt.clone(),
            agent_type,
            working_dir: working_dir.display().to_string(),
            title: request.title.clone(),
            task_path: request.task_path.clone(),
            source_file: request.source_file.clone(),
            source_line: request.source_line,
            debug_run_id: request.debug_run_id.clone(),
            model: request.model.clone(),
            worktree_path: worktree_path.as_ref().map(|p| p.display().to_string()),
            worktree_branch: worktree_branch.clone(),
        })?;

    let params = SpawnParams {
        session_id: session_id.clone(),
        agent_type,
        prompt_file,
        working_dir,
        model: request.model.clone(),
        stream_url: stream_url(services),
        nonce: nonce.clone(),
        cli_session_id: None,
        is_resume: false,
        task_path: request.task_path.clone(),
        title: request.title.clone(),
        debug_run_id: request.debug_run_id.clone(),
        reconstructed_messages: None,
        attachments,
        binary_override: services
            .config
            .agent_commands
            .get(agent_type.as_str())
            .cloned(),
        timeout_ms: services.config.runtime.cli_timeout_ms,
    };

    let record = match services.monitor.spawn_worker(&params) {
        Ok(record) => record,
        Err(e) => {
            // The session exists in the registry; record the failure there
            // rather than leaving it pending forever.
            warn!(
                event = "core.session.spawn_worker_failed",
                session_id = %session_id,
                error = %e,
            );
            services
                .store
                .append_registry(&RegistryEvent::SessionFailed {
                    schema_version: SCHEMA_VERSION,
                    session_id: session_id.clone(),
                    timestamp: now_rfc3339(),
                    error: format!("worker spawn failed: {}", e),
                    metadata: None,
                })?;
            return Err(e.into());
        }
    };

    if let Some(user_id) = &request.user_id {
        services
            .limiter
            .record_usage(user_id, request.estimated_tokens.unwrap_or(0));
    }

    info!(
        event = "core.session.spawn_completed",
        session_id = %session_id,
        agent = agent_type.as_str(),
        pid = record.pid,
    );

    Ok(SpawnResponse {
        session_id,
        status: SessionStatus::Pending,
        pid: record.pid,
    })
}

/// Spawn working directories must live under `ALLOWED_PATH_PREFIX`
/// (defaulting to the process working directory). The worktree base is
/// implicitly allowed: session worktrees live adjacent to the repository
/// by contract.
fn check_allowed_path(
    services: &Services,
    working_dir: &std::path::Path,
) -> Result<(), SessionError> {
    let prefix = match &services.config.runtime.allowed_path_prefix {
        Some(prefix) => PathBuf::from(prefix),
        None => match std::env::current_dir() {
            Ok(cwd) => cwd,
            Err(_) => return Ok(()),
        },
    };
    let worktree_base = services.paths.worktrees_base().ok();
    if working_dir.starts_with(&prefix)
        || worktree_base.is_some_and(|base| working_dir.starts_with(base))
    {
        return Ok(());
    }
    Err(SessionError::WorkingDirNotAllowed {
        working_dir: working_dir.display().to_string(),
        prefix: prefix.display().to_string(),
    })
}

/// Best-effort substring filter over the prompt; a safety net, not a
/// security boundary.
fn check_dangerous_patterns(prompt: &str) -> Result<(), SessionError> {
    let lowered = prompt.to_lowercase();
    for pattern in DANGEROUS_COMMANDS {
        if lowered.contains(pattern) {
            warn!(event = "core.session.dangerous_prompt_refused", pattern);
            return Err(SessionError::DangerousPrompt {
                pattern: pattern.to_string(),
            });
        }
    }
    Ok(())
}

fn resolve_working_dir(
    services: &Services,
    session_id: &SessionId,
) -> Result<(PathBuf, Option<PathBuf>, Option<String>), SessionError> {
    if !services.config.runtime.worktree_isolation {
        return Ok((services.repo_root().to_path_buf(), None, None));
    }
    let path = agentz_git::ensure_worktree(services.repo_root(), session_id, true)?;
    let branch = agentz_git::session_branch(session_id);
    Ok((path.clone(), Some(path), Some(branch)))
}

/// Write a worker payload file, mode 0600.
pub(crate) fn write_payload_file(path: &PathBuf, bytes: &[u8]) -> Result<PathBuf, SessionError> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    std::fs::write(path, bytes)?;
    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        std::fs::set_permissions(path, std::fs::Permissions::from_mode(0o600))?;
    }
    Ok(path.clone())
}

/// The ingester address workers connect back to.
pub(crate) fn stream_url(services: &Services) -> String {
    match std::fs::read_to_string(services.paths.ingester_addr_file()) {
        Ok(addr) if !addr.trim().is_empty() => addr.trim().to_string(),
        _ => DEFAULT_INGESTER_ADDR.to_string(),
    }
}
