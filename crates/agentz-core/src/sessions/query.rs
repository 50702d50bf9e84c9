//! Query surface: list, get, metadata, changed files, daemon status.

use serde::{Deserialize, Serialize};

use agentz_protocol::{AgentSessionMetadata, EditedFileInfo, SessionId};
use agentz_store::{Session, derive_changed_files, derive_live_metadata};

use crate::errors::SessionError;
use crate::services::Services;

pub fn list_sessions(services: &Services) -> Result<Vec<Session>, SessionError> {
    Ok(agentz_store::aggregates::list_sessions(&services.store)?)
}

pub fn get_session(
    services: &Services,
    session_id: &SessionId,
) -> Result<Option<Session>, SessionError> {
    Ok(agentz_store::aggregates::get_session(
        &services.store,
        session_id,
    )?)
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionWithMetadata {
    #[serde(flatten)]
    pub session: Session,
    pub derived_metadata: AgentSessionMetadata,
}

/// Session plus its derived metrics; for terminal sessions the metadata
/// carried by the terminal event wins, live sessions are derived on read.
pub fn get_session_with_metadata(
    services: &Services,
    session_id: &SessionId,
) -> Result<Option<SessionWithMetadata>, SessionError> {
    let Some(session) = get_session(services, session_id)? else {
        return Ok(None);
    };
    let derived_metadata = match (&session.metadata, session.is_terminal()) {
        (Some(metadata), true) => metadata.clone(),
        _ => derive_live_metadata(&session),
    };
    Ok(Some(SessionWithMetadata {
        session,
        derived_metadata,
    }))
}

pub fn get_changed_files(
    services: &Services,
    session_id: &SessionId,
) -> Result<Vec<EditedFileInfo>, SessionError> {
    let session = get_session(services, session_id)?.ok_or_else(|| SessionError::NotFound {
        id: session_id.clone(),
    })?;
    Ok(derive_changed_files(&session))
}

/// Worker liveness as observed by the monitor, including the case the
/// control plane will not paper over: a vanished worker with no terminal
/// event.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DaemonStatus {
    #[serde(rename_all = "camelCase")]
    Alive { pid: u32, started_at: String },
    /// Pid no longer alive but the session has no terminal event; the
    /// control plane never synthesises one.
    WorkerLost,
    NotRunning,
}

pub fn daemon_status(
    services: &Services,
    session_id: &SessionId,
) -> Result<DaemonStatus, SessionError> {
    let session = get_session(services, session_id)?.ok_or_else(|| SessionError::NotFound {
        id: session_id.clone(),
    })?;

    let Some(record) = services.monitor.get_daemon(session_id)? else {
        return Ok(DaemonStatus::NotRunning);
    };

    if services.monitor.is_daemon_alive(session_id)? {
        return Ok(DaemonStatus::Alive {
            pid: record.pid,
            started_at: record.started_at,
        });
    }

    if session.is_terminal() {
        Ok(DaemonStatus::NotRunning)
    } else {
        Ok(DaemonStatus::WorkerLost)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sessions::spawn::{SpawnRequest, spawn_session};
    use agentz_config::ControlPlaneConfig;
    use agentz_protocol::{
        AgentOutputChunk, ChunkKind, RegistryEvent, SCHEMA_VERSION, SessionEvent, TokenUsage,
    };
    use tempfile::TempDir;

    fn services_in(dir: &TempDir) -> Services {
        let mut config = ControlPlaneConfig::default();
        for agent in agentz_protocol::AgentType::ALL {
            config
                .agent_commands
                .insert(agent.as_str().to_string(), "true".to_string());
        }
        config.runtime.worktree_isolation = false;
        config.runtime.allowed_path_prefix = Some(dir.path().display().to_string());
        Services::new(dir.path(), config)
    }

    /// S1: spawn, then a mocked worker writes output and completion.
    #[test]
    fn test_spawn_and_reconstruct_scenario() {
        let dir = TempDir::new().unwrap();
        let services = services_in(&dir);

        let response = spawn_session(
            &services,
            &SpawnRequest {
                prompt: "list files".to_string(),
                ..Default::default()
            },
        )
        .unwrap();

        // The worker's writes, as the ingester would persist them.
        services
            .store
            .append_session(&SessionEvent::Output {
                schema_version: SCHEMA_VERSION,
                session_id: response.session_id.clone(),
                chunk: AgentOutputChunk::new(ChunkKind::Text, "hello", "t"),
            })
            .unwrap();
        services
            .store
            .append_registry(&RegistryEvent::SessionCompleted {
                schema_version: SCHEMA_VERSION,
                session_id: response.session_id.clone(),
                timestamp: "2026-03-01T12:00:05Z".to_string(),
                metadata: None,
                tokens_used: Some(TokenUsage {
                    input: 5,
                    output: 3,
                }),
            })
            .unwrap();

        let session = get_session(&services, &response.session_id)
            .unwrap()
            .unwrap();
        assert_eq!(session.status, agentz_protocol::SessionStatus::Completed);
        assert_eq!(session.output.len(), 1);
        assert_eq!(
            session.tokens_used,
            Some(TokenUsage {
                input: 5,
                output: 3
            })
        );
    }

    #[test]
    fn test_changed_files_unknown_session() {
        let dir = TempDir::new().unwrap();
        let services = services_in(&dir);
        let err = get_changed_files(&services, &SessionId::new("ffffffffffff")).unwrap_err();
        assert!(matches!(err, SessionError::NotFound { .. }));
    }

    #[test]
    fn test_daemon_status_worker_lost() {
        let dir = TempDir::new().unwrap();
        let services = services_in(&dir);

        let response = spawn_session(
            &services,
            &SpawnRequest {
                prompt: "p".to_string(),
                ..Default::default()
            },
        )
        .unwrap();

        // /bin/true exits without appending any terminal event.
        std::thread::sleep(std::time::Duration::from_millis(200));

        let status = daemon_status(&services, &response.session_id).unwrap();
        assert_eq!(status, DaemonStatus::WorkerLost);

        // The session stays non-terminal; nothing is synthesised.
        let session = get_session(&services, &response.session_id)
            .unwrap()
            .unwrap();
        assert!(session.is_active());
    }

    #[test]
    fn test_metadata_derived_for_running_session() {
        let dir = TempDir::new().unwrap();
        let services = services_in(&dir);

        let response = spawn_session(
            &services,
            &SpawnRequest {
                prompt: "p".to_string(),
                ..Default::default()
            },
        )
        .unwrap();
        services
            .store
            .append_session(&SessionEvent::Output {
                schema_version: SCHEMA_VERSION,
                session_id: response.session_id.clone(),
                chunk: AgentOutputChunk::new(
                    ChunkKind::ToolUse,
                    r#"{"tool":"Write","input":{"path":"src/a.rs"}}"#,
                    "t",
                ),
            })
            .unwrap();

        let with_metadata = get_session_with_metadata(&services, &response.session_id)
            .unwrap()
            .unwrap();
        assert_eq!(with_metadata.derived_metadata.edited_files.len(), 1);
        assert_eq!(
            get_changed_files(&services, &response.session_id).unwrap()[0].path,
            "src/a.rs"
        );
    }
}
