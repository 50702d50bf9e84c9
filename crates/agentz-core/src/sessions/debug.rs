//! Multi-agent debug runs.
//!
//! One task, N parallel debug sessions sharing a `debugRunId`, and an
//! optional orchestrator session that synthesises their outputs once every
//! sibling is terminal.

use serde::{Deserialize, Serialize};
use tracing::info;

use agentz_protocol::{AgentType, ChunkKind, DebugRunId, SessionId, SessionStatus};
use agentz_store::Session;

use crate::errors::SessionError;
use crate::services::Services;
use crate::sessions::spawn::{SpawnRequest, spawn_session};
use crate::tasks::TaskStore;

/// Per-sibling cap on gathered output handed to the orchestrator.
const PER_SESSION_OUTPUT_CAP: usize = 30_000;
/// Cap across all siblings.
const TOTAL_OUTPUT_CAP: usize = 100_000;

const ORCHESTRATOR_TITLE_PREFIX: &str = "Orchestrator: ";

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DebugRunRequest {
    pub title: String,
    pub prompt: String,
    pub agents: Vec<AgentType>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub user_id: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DebugRunResponse {
    pub debug_run_id: DebugRunId,
    pub session_ids: Vec<SessionId>,
    pub task_path: String,
}

/// Spawn one debug session per requested agent, all sharing a task file and
/// a fresh `debugRunId`.
pub fn debug_with_agents(
    services: &Services,
    request: &DebugRunRequest,
) -> Result<DebugRunResponse, SessionError> {
    let debug_run_id = DebugRunId::new(crate::sessions::generate_session_id().into_inner());

    let tasks = TaskStore::new(services.repo_root());
    let task_path = tasks.create_task(&request.title, &request.prompt)?;

    let mut session_ids = Vec::with_capacity(request.agents.len());
    for (index, agent) in request.agents.iter().enumerate() {
        let spawn_request = SpawnRequest {
            prompt: request.prompt.clone(),
            agent_type: Some(*agent),
            title: Some(format!("Debug ({}): {}", index + 1, request.title)),
            task_path: Some(task_path.clone()),
            debug_run_id: Some(debug_run_id.clone()),
            user_id: request.user_id.clone(),
            ..Default::default()
        };
        let response = spawn_session(services, &spawn_request)?;
        session_ids.push(response.session_id);
    }

    info!(
        event = "core.debug.run_started",
        debug_run_id = %debug_run_id,
        sessions = session_ids.len(),
        task_path = %task_path,
    );

    Ok(DebugRunResponse {
        debug_run_id,
        session_ids,
        task_path,
    })
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DebugRunStatus {
    pub debug_run_id: DebugRunId,
    pub sessions: Vec<DebugSessionStatus>,
    pub all_terminal: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DebugSessionStatus {
    pub session_id: SessionId,
    pub status: SessionStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
}

fn run_sessions(
    services: &Services,
    debug_run_id: &DebugRunId,
) -> Result<Vec<Session>, SessionError> {
    Ok(crate::sessions::list_sessions(services)?
        .into_iter()
        .filter(|session| session.debug_run_id.as_ref() == Some(debug_run_id))
        .collect())
}

fn is_orchestrator(session: &Session) -> bool {
    session
        .title
        .as_deref()
        .is_some_and(|title| title.starts_with(ORCHESTRATOR_TITLE_PREFIX))
}

pub fn get_debug_run_status(
    services: &Services,
    debug_run_id: &DebugRunId,
) -> Result<DebugRunStatus, SessionError> {
    let sessions = run_sessions(services, debug_run_id)?;
    if sessions.is_empty() {
        return Err(SessionError::DebugRunNotFound {
            debug_run_id: debug_run_id.to_string(),
        });
    }

    let siblings: Vec<&Session> = sessions.iter().filter(|s| !is_orchestrator(s)).collect();
    let all_terminal = siblings.iter().all(|s| s.is_terminal());

    Ok(DebugRunStatus {
        debug_run_id: debug_run_id.clone(),
        sessions: sessions
            .iter()
            .map(|session| DebugSessionStatus {
                session_id: session.id.clone(),
                status: session.status,
                title: session.title.clone(),
            })
            .collect(),
        all_terminal,
    })
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OrchestrateOutcome {
    pub session_id: SessionId,
    pub is_new: bool,
}

/// Spawn (or return) the synthesis session for a debug run. Idempotent:
/// unless `force`, an already-recorded orchestrator session is returned
/// as-is; spawning is refused until every sibling is terminal.
pub fn orchestrate_debug_run(
    services: &Services,
    debug_run_id: &DebugRunId,
    task_path: &str,
    force: bool,
) -> Result<OrchestrateOutcome, SessionError> {
    let sessions = run_sessions(services, debug_run_id)?;
    if sessions.is_empty() {
        return Err(SessionError::DebugRunNotFound {
            debug_run_id: debug_run_id.to_string(),
        });
    }

    if !force
        && let Some(existing) = sessions.iter().find(|s| is_orchestrator(s))
    {
        return Ok(OrchestrateOutcome {
            session_id: existing.id.clone(),
            is_new: false,
        });
    }

    let siblings: Vec<&Session> = sessions.iter().filter(|s| !is_orchestrator(s)).collect();
    if siblings.iter().any(|s| s.is_active()) {
        return Err(SessionError::DebugRunNotTerminal {
            debug_run_id: debug_run_id.to_string(),
        });
    }

    let base_title = siblings
        .iter()
        .find_map(|s| s.title.as_deref())
        .map(strip_debug_prefix)
        .unwrap_or("debug run")
        .to_string();

    let prompt = synthesis_prompt(&base_title, &siblings);

    let response = spawn_session(
        services,
        &SpawnRequest {
            prompt,
            agent_type: Some(AgentType::Claude),
            title: Some(format!("{}{}", ORCHESTRATOR_TITLE_PREFIX, base_title)),
            task_path: Some(task_path.to_string()),
            debug_run_id: Some(debug_run_id.clone()),
            ..Default::default()
        },
    )?;

    info!(
        event = "core.debug.orchestrator_spawned",
        debug_run_id = %debug_run_id,
        session_id = %response.session_id,
        forced = force,
    );

    Ok(OrchestrateOutcome {
        session_id: response.session_id,
        is_new: true,
    })
}

/// `"Debug (2): flaky test"` → `"flaky test"`.
fn strip_debug_prefix(title: &str) -> &str {
    let Some(rest) = title.strip_prefix("Debug (") else {
        return title;
    };
    match rest.split_once("): ") {
        Some((_, base)) => base,
        None => title,
    }
}

fn synthesis_prompt(title: &str, siblings: &[&Session]) -> String {
    let mut prompt = format!(
        "Multiple debug agents investigated \"{}\" in parallel. \
         Synthesise their findings into a single diagnosis and fix plan.\n",
        title
    );

    let mut remaining_total = TOTAL_OUTPUT_CAP;
    for session in siblings {
        if remaining_total == 0 {
            break;
        }
        let text = gathered_text(session, PER_SESSION_OUTPUT_CAP.min(remaining_total));
        remaining_total -= text.len();
        prompt.push_str(&format!(
            "\n--- Session {} ({}, {}) ---\n{}\n",
            session.id,
            session.agent_type,
            session.status,
            text
        ));
    }
    prompt
}

/// The tail of a session's text output, capped at `cap` bytes on a char
/// boundary. The most recent output carries the conclusion.
fn gathered_text(session: &Session, cap: usize) -> String {
    let mut text = String::new();
    for chunk in &session.output {
        if matches!(chunk.kind, ChunkKind::Text | ChunkKind::Error) {
            text.push_str(&chunk.content);
            text.push('\n');
        }
    }
    if text.len() <= cap {
        return text;
    }
    let mut start = text.len() - cap;
    while !text.is_char_boundary(start) {
        start += 1;
    }
    text[start..].to_string()
}
