//! Approval responses, relayed to the worker via its control stream.

use tracing::info;

use agentz_protocol::{ControlEvent, SCHEMA_VERSION, SessionId};

use crate::errors::SessionError;
use crate::services::Services;
use crate::sessions::now_rfc3339;

/// Record a client's approval decision on the session's control stream.
///
/// Requires a live worker — an approval for a dead worker would never be
/// read and would silently apply to a future resume instead.
pub fn approve(
    services: &Services,
    session_id: &SessionId,
    approved: bool,
) -> Result<(), SessionError> {
    let exists = crate::sessions::get_session(services, session_id)?.is_some();
    if !exists {
        return Err(SessionError::NotFound {
            id: session_id.clone(),
        });
    }

    if !services.monitor.is_daemon_alive(session_id)? {
        return Err(SessionError::WorkerLost {
            id: session_id.clone(),
        });
    }

    services.store.append_control(&ControlEvent::ApprovalResponse {
        schema_version: SCHEMA_VERSION,
        session_id: session_id.clone(),
        timestamp: now_rfc3339(),
        approved,
    })?;

    info!(
        event = "core.session.approval_recorded",
        session_id = %session_id,
        approved,
    );
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::process::DaemonRecord;
    use crate::sessions::spawn::{SpawnRequest, spawn_session};
    use agentz_config::ControlPlaneConfig;
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

    fn spawn_with_live_record(services: &Services) -> SessionId {
        let session_id = spawn_session(
            services,
            &SpawnRequest {
                prompt: "p".to_string(),
                ..Default::default()
            },
        )
        .unwrap()
        .session_id;

        services.monitor.untrack(&session_id).unwrap();
        let (name, start) = crate::process::get_process_info(std::process::id()).unwrap();
        DaemonRecord {
            session_id: session_id.clone(),
            pid: std::process::id(),
            nonce: agentz_protocol::Nonce::new("0123456789abcdef0123456789abcdef"),
            started_at: "t".to_string(),
            process_name: Some(name),
            process_start_time: Some(start),
        }
        .write(&services.paths.daemon_record(&session_id))
        .unwrap();
        session_id
    }

    #[test]
    fn test_approve_appends_control_event() {
        let dir = TempDir::new().unwrap();
        let services = services_in(&dir);
        let session_id = spawn_with_live_record(&services);

        approve(&services, &session_id, true).unwrap();
        approve(&services, &session_id, false).unwrap();

        let events = services.store.read_control(&session_id).unwrap();
        assert_eq!(events.len(), 2);
        assert!(matches!(
            events[0],
            ControlEvent::ApprovalResponse { approved: true, .. }
        ));
        assert!(matches!(
            events[1],
            ControlEvent::ApprovalResponse {
                approved: false,
                ..
            }
        ));
    }

    #[test]
    fn test_approve_requires_live_worker() {
        let dir = TempDir::new().unwrap();
        let services = services_in(&dir);

        let session_id = spawn_session(
            &services,
            &SpawnRequest {
                prompt: "p".to_string(),
                ..Default::default()
            },
        )
        .unwrap()
        .session_id;
        std::thread::sleep(std::time::Duration::from_millis(200));

        let err = approve(&services, &session_id, true).unwrap_err();
        assert!(matches!(err, SessionError::WorkerLost { .. }));
    }

    #[test]
    fn test_approve_unknown_session() {
        let dir = TempDir::new().unwrap();
        let services = services_in(&dir);
        let err = approve(&services, &SessionId::new("ffffffffffff"), true).unwrap_err();
        assert!(matches!(err, SessionError::NotFound { .. }));
    }
}
