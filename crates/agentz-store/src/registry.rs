//! Typed access to the registry, per-session, and control streams.

use tracing::{debug, warn};

use agentz_paths::ControlPlanePaths;
use agentz_protocol::{
    ControlEvent, DecodeError, RegistryEvent, SessionEvent, decode_control_event,
    decode_registry_event, decode_session_event,
};

use crate::errors::StoreError;
use crate::stream::StreamStore;

/// Typed event access over the raw stream store.
///
/// Cheap to clone; clones share the underlying lock table.
#[derive(Debug, Clone)]
pub struct EventStore {
    store: StreamStore,
    paths: ControlPlanePaths,
}

impl EventStore {
    pub fn new(paths: ControlPlanePaths) -> Self {
        ensure_ignored(&paths);
        Self {
            store: StreamStore::new(),
            paths,
        }
    }

    pub fn paths(&self) -> &ControlPlanePaths {
        &self.paths
    }

    pub fn append_registry(&self, event: &RegistryEvent) -> Result<(), StoreError> {
        self.store
            .append_event(&self.paths.registry_stream(), event)
    }

    pub fn append_session(&self, event: &SessionEvent) -> Result<(), StoreError> {
        let path = self.paths.session_stream(event.session_id());
        self.store.append_event(&path, event)
    }

    pub fn append_control(&self, event: &ControlEvent) -> Result<(), StoreError> {
        let path = match event {
            ControlEvent::ApprovalResponse { session_id, .. } => {
                self.paths.control_stream(session_id)
            }
        };
        self.store.append_event(&path, event)
    }

    /// The full registry prefix, in append order.
    ///
    /// Frames with unknown event types (written by a newer build) are
    /// skipped; the read keeps going.
    pub fn read_registry(&self) -> Result<Vec<RegistryEvent>, StoreError> {
        let path = self.paths.registry_stream();
        let outcome = self.store.read(&path)?;
        Ok(decode_lines(&outcome.lines, &path, decode_registry_event))
    }

    /// The full per-session prefix for one id, in append order.
    ///
    /// Events whose embedded session id does not match the stream identity
    /// are dropped — a per-session stream may only carry its own events.
    pub fn read_session(&self, session_id: &str) -> Result<Vec<SessionEvent>, StoreError> {
        let path = self.paths.session_stream(session_id);
        let outcome = self.store.read(&path)?;
        let events = decode_lines(&outcome.lines, &path, decode_session_event);
        Ok(events
            .into_iter()
            .filter(|event| {
                let matches = event.session_id().as_ref() == session_id;
                if !matches {
                    warn!(
                        event = "store.session.foreign_event_dropped",
                        stream = session_id,
                        found = %event.session_id(),
                    );
                }
                matches
            })
            .collect())
    }

    pub fn read_control(&self, session_id: &str) -> Result<Vec<ControlEvent>, StoreError> {
        let path = self.paths.control_stream(session_id);
        let outcome = self.store.read(&path)?;
        Ok(decode_lines(&outcome.lines, &path, decode_control_event))
    }

    /// Whether a per-session stream file exists on disk (tombstoned
    /// sessions keep theirs).
    pub fn session_stream_exists(&self, session_id: &str) -> bool {
        self.paths.session_stream(session_id).exists()
    }
}

/// Keep control-plane state out of `git status`: a `.gitignore` containing
/// `*` inside the directory hides everything under it, the same way cargo
/// hides `target/`. Best-effort; streams work without it.
fn ensure_ignored(paths: &ControlPlanePaths) {
    let dir = paths.control_plane_dir();
    let gitignore = dir.join(".gitignore");
    if gitignore.exists() {
        return;
    }
    if std::fs::create_dir_all(&dir).is_ok()
        && let Err(e) = std::fs::write(&gitignore, "*\n")
    {
        debug!(
            event = "store.registry.gitignore_write_failed",
            path = %gitignore.display(),
            error = %e,
        );
    }
}

fn decode_lines<T>(
    lines: &[String],
    path: &std::path::Path,
    decode: fn(&str) -> Result<T, DecodeError>,
) -> Vec<T> {
    let mut events = Vec::with_capacity(lines.len());
    for (index, line) in lines.iter().enumerate() {
        match decode(line) {
            Ok(event) => events.push(event),
            Err(e) if e.is_recoverable() => {
                debug!(
                    event = "store.decode.frame_skipped",
                    path = %path.display(),
                    index,
                    reason = %e,
                );
            }
            Err(e) => {
                // A known type with bad fields is corruption; stop at the
                // frame, exposing only the prefix before it.
                warn!(
                    event = "store.decode.corrupt_frame",
                    path = %path.display(),
                    index,
                    error = %e,
                );
                break;
            }
        }
    }
    events
}

#[cfg(test)]
mod tests {
    use super::*;
    use agentz_protocol::{
        AgentOutputChunk, AgentType, ChunkKind, SCHEMA_VERSION, SessionId,
    };
    use tempfile::TempDir;

    fn store_in(dir: &TempDir) -> EventStore {
        EventStore::new(ControlPlanePaths::for_repo(dir.path()))
    }

    fn created(id: &str) -> RegistryEvent {
        RegistryEvent::SessionCreated {
            schema_version: SCHEMA_VERSION,
            session_id: SessionId::new(id),
            timestamp: "2026-03-01T12:00:00Z".to_string(),
            prompt: "p".to_string(),
            agent_type: AgentType::Claude,
            working_dir: "/repo".to_string(),
            title: None,
            task_path: None,
            source_file: None,
            source_line: None,
            debug_run_id: None,
            model: None,
            worktree_path: None,
            worktree_branch: None,
        }
    }

    #[test]
    fn test_registry_roundtrip() {
        let dir = TempDir::new().unwrap();
        let store = store_in(&dir);

        store.append_registry(&created("a1b2c3d4e5f6")).unwrap();
        store
            .append_registry(&RegistryEvent::SessionCancelled {
                schema_version: SCHEMA_VERSION,
                session_id: SessionId::new("a1b2c3d4e5f6"),
                timestamp: "2026-03-01T12:01:00Z".to_string(),
            })
            .unwrap();

        let events = store.read_registry().unwrap();
        assert_eq!(events.len(), 2);
        assert_eq!(events[0].session_id().as_ref(), "a1b2c3d4e5f6");
    }

    #[test]
    fn test_unknown_type_skipped_not_fatal() {
        let dir = TempDir::new().unwrap();
        let store = store_in(&dir);
        store.append_registry(&created("a1b2c3d4e5f6")).unwrap();

        // Simulate a frame from a newer build.
        let raw = StreamStore::new();
        raw.append(
            &store.paths().registry_stream(),
            r#"{"type":"session_pinned","sessionId":"a1b2c3d4e5f6"}"#,
        )
        .unwrap();
        store
            .append_registry(&RegistryEvent::SessionCancelled {
                schema_version: SCHEMA_VERSION,
                session_id: SessionId::new("a1b2c3d4e5f6"),
                timestamp: "t".to_string(),
            })
            .unwrap();

        let events = store.read_registry().unwrap();
        assert_eq!(events.len(), 2);
    }

    #[test]
    fn test_session_stream_rejects_foreign_session_id() {
        let dir = TempDir::new().unwrap();
        let store = store_in(&dir);

        // An event for a different session written into this stream.
        let foreign = SessionEvent::Output {
            schema_version: SCHEMA_VERSION,
            session_id: SessionId::new("ffffffffffff"),
            chunk: AgentOutputChunk::new(ChunkKind::Text, "x", "t"),
        };
        let raw = StreamStore::new();
        raw.append_event(&store.paths().session_stream("a1b2c3d4e5f6"), &foreign)
            .unwrap();

        let own = SessionEvent::Output {
            schema_version: SCHEMA_VERSION,
            session_id: SessionId::new("a1b2c3d4e5f6"),
            chunk: AgentOutputChunk::new(ChunkKind::Text, "y", "t"),
        };
        store.append_session(&own).unwrap();

        let events = store.read_session("a1b2c3d4e5f6").unwrap();
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].session_id().as_ref(), "a1b2c3d4e5f6");
    }

    #[test]
    fn test_control_roundtrip() {
        let dir = TempDir::new().unwrap();
        let store = store_in(&dir);

        store
            .append_control(&ControlEvent::ApprovalResponse {
                schema_version: SCHEMA_VERSION,
                session_id: SessionId::new("a1b2c3d4e5f6"),
                timestamp: "t".to_string(),
                approved: false,
            })
            .unwrap();

        let events = store.read_control("a1b2c3d4e5f6").unwrap();
        assert_eq!(events.len(), 1);
        assert!(matches!(
            events[0],
            ControlEvent::ApprovalResponse { approved: false, .. }
        ));
    }
}
