//! Cancel and soft-delete.

use serde::{Deserialize, Serialize};
use tracing::info;

use agentz_protocol::{RegistryEvent, SCHEMA_VERSION, SessionId};

use crate::errors::SessionError;
use crate::services::Services;
use crate::sessions::now_rfc3339;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CancelOutcome {
    /// False when the worker was already dead; the cancellation event is
    /// appended either way.
    pub success: bool,
}

/// Cancel a session: SIGTERM its worker (if alive) and durably record the
/// cancellation. Idempotent — cancelling a dead or already-cancelled
/// session still appends the event and reports `success: false`.
pub fn cancel_session(
    services: &Services,
    session_id: &SessionId,
) -> Result<CancelOutcome, SessionError> {
    let exists = crate::sessions::get_session(services, session_id)?.is_some();
    if !exists {
        return Err(SessionError::NotFound {
            id: session_id.clone(),
        });
    }

    let was_alive = services.monitor.kill_daemon(session_id)?;

    // Belt-and-braces: the worker's SIGTERM handler is expected to append
    // its own terminal event, but the API records the cancellation too.
    services
        .store
        .append_registry(&RegistryEvent::SessionCancelled {
            schema_version: SCHEMA_VERSION,
            session_id: session_id.clone(),
            timestamp: now_rfc3339(),
        })?;

    info!(
        event = "core.session.cancel_completed",
        session_id = %session_id,
        was_alive,
    );
    Ok(CancelOutcome { success: was_alive })
}

/// Soft-delete: SIGTERM if alive, then tombstone. The per-session stream
/// stays on disk; it is only semantically invisible afterwards.
pub fn delete_session(services: &Services, session_id: &SessionId) -> Result<(), SessionError> {
    let _ = services.monitor.kill_daemon(session_id)?;

    services
        .store
        .append_registry(&RegistryEvent::SessionDeleted {
            schema_version: SCHEMA_VERSION,
            session_id: session_id.clone(),
            timestamp: now_rfc3339(),
        })?;

    info!(event = "core.session.delete_completed", session_id = %session_id);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sessions::spawn::{SpawnRequest, spawn_session};
    use agentz_config::ControlPlaneConfig;
    use agentz_protocol::SessionStatus;
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

    fn spawn_one(services: &Services) -> SessionId {
        spawn_session(
            services,
            &SpawnRequest {
                prompt: "p".to_string(),
                ..Default::default()
            },
        )
        .unwrap()
        .session_id
    }

    #[test]
    fn test_cancel_dead_worker_still_appends_event() {
        let dir = TempDir::new().unwrap();
        let services = services_in(&dir);
        let session_id = spawn_one(&services);

        // /bin/true exits immediately; wait for it to be reaped by init.
        std::thread::sleep(std::time::Duration::from_millis(200));

        let outcome = cancel_session(&services, &session_id).unwrap();
        assert!(!outcome.success);

        let session = crate::sessions::get_session(&services, &session_id)
            .unwrap()
            .unwrap();
        assert_eq!(session.status, SessionStatus::Cancelled);
        assert!(!session.resumable);
    }

    #[test]
    fn test_cancel_unknown_session() {
        let dir = TempDir::new().unwrap();
        let services = services_in(&dir);
        let err = cancel_session(&services, &SessionId::new("ffffffffffff")).unwrap_err();
        assert!(matches!(err, SessionError::NotFound { .. }));
    }

    #[test]
    fn test_cancel_is_idempotent() {
        let dir = TempDir::new().unwrap();
        let services = services_in(&dir);
        let session_id = spawn_one(&services);

        cancel_session(&services, &session_id).unwrap();
        let second = cancel_session(&services, &session_id).unwrap();
        assert!(!second.success);
    }

    #[test]
    fn test_delete_hides_session_but_keeps_stream_file() {
        let dir = TempDir::new().unwrap();
        let services = services_in(&dir);
        let session_id = spawn_one(&services);

        // Give the session some stream content.
        services
            .store
            .append_session(&agentz_protocol::SessionEvent::Output {
                schema_version: SCHEMA_VERSION,
                session_id: session_id.clone(),
                chunk: agentz_protocol::AgentOutputChunk::new(
                    agentz_protocol::ChunkKind::Text,
                    "hello",
                    "t",
                ),
            })
            .unwrap();

        delete_session(&services, &session_id).unwrap();

        assert!(
            crate::sessions::get_session(&services, &session_id)
                .unwrap()
                .is_none()
        );
        assert!(
            crate::sessions::list_sessions(&services)
                .unwrap()
                .iter()
                .all(|s| s.id != session_id)
        );
        // The per-session log is preserved on disk.
        assert!(services.store.session_stream_exists(&session_id));
    }
}
