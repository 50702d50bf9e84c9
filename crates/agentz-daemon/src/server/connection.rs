//! Per-connection frame handling: nonce auth, validation, buffered writes.

use std::collections::HashMap;
use std::net::SocketAddr;
use std::time::Duration;

use tokio::io::BufReader;
use tokio::net::TcpStream;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use agentz_config::RuntimeConfig;
use agentz_paths::ControlPlanePaths;
use agentz_protocol::{ChunkFrame, RegistryEvent, SessionId, WorkerEvent, codec};
use agentz_store::EventStore;

use crate::buffer::{FlushBuffer, enforce_output_cap};

/// Why a frame was rejected; rejection closes the connection.
enum Reject {
    NonceMismatch,
    UnknownSession,
    SessionIdMismatch,
    ForbiddenRegistryEvent,
}

impl Reject {
    fn as_str(&self) -> &'static str {
        match self {
            Reject::NonceMismatch => "nonce_mismatch",
            Reject::UnknownSession => "unknown_session",
            Reject::SessionIdMismatch => "session_id_mismatch",
            Reject::ForbiddenRegistryEvent => "forbidden_registry_event",
        }
    }
}

/// Handle one worker connection until EOF, rejection, or shutdown.
///
/// Frames are validated (nonce, session binding, event kind) and buffered;
/// buffers flush after `flush_chunk_threshold` chunks or `flush_delay_ms`,
/// whichever first. Registry events flush the session buffer first so
/// stream-relative ordering survives, then append directly.
pub async fn handle_connection(
    stream: TcpStream,
    peer: SocketAddr,
    store: EventStore,
    paths: ControlPlanePaths,
    runtime: RuntimeConfig,
    shutdown: CancellationToken,
) {
    debug!(event = "daemon.connection.opened", peer = %peer);

    let mut reader = BufReader::new(stream);
    let mut buffers: HashMap<SessionId, FlushBuffer> = HashMap::new();
    let flush_delay = Duration::from_millis(runtime.flush_delay_ms);
    // Armed when the oldest pending chunk was buffered; never postponed by
    // later frames, so no chunk waits past the flush delay.
    let mut flush_deadline: Option<tokio::time::Instant> = None;

    loop {
        let deadline = flush_deadline;
        let timer = async move {
            match deadline {
                Some(deadline) => tokio::time::sleep_until(deadline).await,
                None => std::future::pending::<()>().await,
            }
        };

        let frame: Option<ChunkFrame> = tokio::select! {
            result = codec::read_message(&mut reader) => {
                match result {
                    Ok(frame) => frame,
                    Err(e) => {
                        warn!(event = "daemon.connection.bad_frame", peer = %peer, error = %e);
                        break;
                    }
                }
            }
            _ = timer => {
                flush_all(&mut buffers, &store, &runtime).await;
                flush_deadline = None;
                continue;
            }
            _ = shutdown.cancelled() => break,
        };

        let Some(frame) = frame else {
            break; // EOF
        };

        match validate_frame(&frame, &paths) {
            Ok(()) => {}
            Err(reject) => {
                warn!(
                    event = "daemon.connection.frame_rejected",
                    peer = %peer,
                    session_id = %frame.session_id,
                    reason = reject.as_str(),
                );
                break;
            }
        }

        match frame.event {
            WorkerEvent::Session(event) => {
                let buffer = buffers.entry(frame.session_id.clone()).or_insert_with(|| {
                    FlushBuffer::new(
                        frame.session_id.clone(),
                        runtime.flush_chunk_threshold,
                        runtime.max_output_buffer_bytes,
                    )
                });
                buffer.push(event);
                if buffer.should_flush() {
                    flush_one(&frame.session_id, buffer, &store, &runtime).await;
                } else if flush_deadline.is_none() {
                    flush_deadline = Some(tokio::time::Instant::now() + flush_delay);
                }
            }
            WorkerEvent::Registry(event) => {
                // Keep per-session ordering: anything buffered for this
                // session lands before the lifecycle transition.
                if let Some(buffer) = buffers.get_mut(&frame.session_id) {
                    flush_one(&frame.session_id, buffer, &store, &runtime).await;
                }
                if let Err(e) = store.append_registry(&event) {
                    warn!(
                        event = "daemon.connection.registry_append_failed",
                        session_id = %frame.session_id,
                        error = %e,
                    );
                    break;
                }
                info!(
                    event = "daemon.connection.registry_event",
                    session_id = %frame.session_id,
                    kind = registry_kind(&event),
                );
            }
        }
    }

    // Connection teardown flushes whatever is pending.
    flush_all(&mut buffers, &store, &runtime).await;
    debug!(event = "daemon.connection.closed", peer = %peer);
}

fn validate_frame(frame: &ChunkFrame, paths: &ControlPlanePaths) -> Result<(), Reject> {
    let embedded_session = match &frame.event {
        WorkerEvent::Session(event) => event.session_id(),
        WorkerEvent::Registry(event) => event.session_id(),
    };
    if embedded_session != &frame.session_id {
        return Err(Reject::SessionIdMismatch);
    }

    if let WorkerEvent::Registry(event) = &frame.event
        && matches!(
            event,
            RegistryEvent::SessionCreated { .. } | RegistryEvent::SessionDeleted { .. }
        )
    {
        return Err(Reject::ForbiddenRegistryEvent);
    }

    // Nonce check against the durable spawn record.
    let record_path = paths.daemon_record(&frame.session_id);
    let content = std::fs::read_to_string(&record_path).map_err(|_| Reject::UnknownSession)?;
    let record: serde_json::Value =
        serde_json::from_str(&content).map_err(|_| Reject::UnknownSession)?;
    let expected = record
        .get("nonce")
        .and_then(|n| n.as_str())
        .ok_or(Reject::UnknownSession)?;
    if expected != frame.nonce.as_ref() {
        return Err(Reject::NonceMismatch);
    }
    Ok(())
}

fn registry_kind(event: &RegistryEvent) -> &'static str {
    match event {
        RegistryEvent::SessionCreated { .. } => "session_created",
        RegistryEvent::SessionUpdated { .. } => "session_updated",
        RegistryEvent::SessionCompleted { .. } => "session_completed",
        RegistryEvent::SessionFailed { .. } => "session_failed",
        RegistryEvent::SessionCancelled { .. } => "session_cancelled",
        RegistryEvent::SessionDeleted { .. } => "session_deleted",
    }
}

async fn flush_one(
    session_id: &SessionId,
    buffer: &mut FlushBuffer,
    store: &EventStore,
    runtime: &RuntimeConfig,
) {
    if buffer.is_empty() {
        return;
    }
    if let Err(e) = buffer.flush(store) {
        warn!(
            event = "daemon.connection.flush_failed",
            session_id = %session_id,
            error = %e,
        );
        return;
    }
    match enforce_output_cap(store, session_id, runtime.max_output_size_bytes) {
        Ok(_) => {}
        Err(e) => {
            warn!(
                event = "daemon.connection.truncation_failed",
                session_id = %session_id,
                error = %e,
            );
        }
    }
}

async fn flush_all(
    buffers: &mut HashMap<SessionId, FlushBuffer>,
    store: &EventStore,
    runtime: &RuntimeConfig,
) {
    for (session_id, buffer) in buffers.iter_mut() {
        flush_one(session_id, buffer, store, runtime).await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use agentz_protocol::{
        AgentOutputChunk, ChunkKind, Nonce, SCHEMA_VERSION, SessionEvent,
    };
    use tempfile::TempDir;
    use tokio::io::AsyncWriteExt;

    fn write_daemon_record(paths: &ControlPlanePaths, session_id: &str, nonce: &str) {
        let record = serde_json::json!({
            "sessionId": session_id,
            "pid": 1234,
            "nonce": nonce,
            "startedAt": "2026-03-01T12:00:00Z",
        });
        let path = paths.daemon_record(session_id);
        std::fs::create_dir_all(path.parent().unwrap()).unwrap();
        std::fs::write(path, record.to_string()).unwrap();
    }

    fn output_frame(session_id: &str, nonce: &str, content: &str) -> ChunkFrame {
        ChunkFrame {
            session_id: SessionId::new(session_id),
            nonce: Nonce::new(nonce),
            event: WorkerEvent::Session(SessionEvent::Output {
                schema_version: SCHEMA_VERSION,
                session_id: SessionId::new(session_id),
                chunk: AgentOutputChunk::new(ChunkKind::Text, content, "t"),
            }),
        }
    }

    const NONCE: &str = "0123456789abcdef0123456789abcdef";
    const OTHER_NONCE: &str = "ffffffffffffffffffffffffffffffff";

    async fn run_ingest(dir: &TempDir, frames: Vec<ChunkFrame>) -> EventStore {
        let paths = ControlPlanePaths::for_repo(dir.path());
        let store = EventStore::new(paths.clone());
        let runtime = RuntimeConfig::default();
        let shutdown = CancellationToken::new();

        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();

        let server_store = store.clone();
        let server_paths = paths.clone();
        let server = tokio::spawn(async move {
            let (stream, peer) = listener.accept().await.unwrap();
            handle_connection(stream, peer, server_store, server_paths, runtime, shutdown).await;
        });

        let mut client = tokio::net::TcpStream::connect(addr).await.unwrap();
        for frame in &frames {
            let mut line = serde_json::to_vec(frame).unwrap();
            line.push(b'\n');
            client.write_all(&line).await.unwrap();
        }
        client.shutdown().await.unwrap();
        drop(client);

        server.await.unwrap();
        store
    }

    #[tokio::test]
    async fn test_valid_frames_reach_the_stream() {
        let dir = TempDir::new().unwrap();
        let paths = ControlPlanePaths::for_repo(dir.path());
        write_daemon_record(&paths, "a1b2c3d4e5f6", NONCE);

        let store = run_ingest(
            &dir,
            vec![
                output_frame("a1b2c3d4e5f6", NONCE, "one"),
                output_frame("a1b2c3d4e5f6", NONCE, "two"),
            ],
        )
        .await;

        let events = store.read_session("a1b2c3d4e5f6").unwrap();
        assert_eq!(events.len(), 2);
    }

    #[tokio::test]
    async fn test_nonce_mismatch_discards_and_closes() {
        let dir = TempDir::new().unwrap();
        let paths = ControlPlanePaths::for_repo(dir.path());
        write_daemon_record(&paths, "a1b2c3d4e5f6", NONCE);

        let store = run_ingest(
            &dir,
            vec![
                output_frame("a1b2c3d4e5f6", OTHER_NONCE, "stolen"),
                // Never processed: the connection closed on the first frame.
                output_frame("a1b2c3d4e5f6", NONCE, "late"),
            ],
        )
        .await;

        let events = store.read_session("a1b2c3d4e5f6").unwrap();
        assert!(events.is_empty());
    }

    #[tokio::test]
    async fn test_unknown_session_rejected() {
        let dir = TempDir::new().unwrap();
        let store = run_ingest(&dir, vec![output_frame("a1b2c3d4e5f6", NONCE, "x")]).await;
        assert!(store.read_session("a1b2c3d4e5f6").unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_worker_cannot_create_or_delete_sessions() {
        let dir = TempDir::new().unwrap();
        let paths = ControlPlanePaths::for_repo(dir.path());
        write_daemon_record(&paths, "a1b2c3d4e5f6", NONCE);

        let frame = ChunkFrame {
            session_id: SessionId::new("a1b2c3d4e5f6"),
            nonce: Nonce::new(NONCE),
            event: WorkerEvent::Registry(RegistryEvent::SessionDeleted {
                schema_version: SCHEMA_VERSION,
                session_id: SessionId::new("a1b2c3d4e5f6"),
                timestamp: "t".to_string(),
            }),
        };
        let store = run_ingest(&dir, vec![frame]).await;
        assert!(store.read_registry().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_worker_lifecycle_event_lands_in_registry() {
        let dir = TempDir::new().unwrap();
        let paths = ControlPlanePaths::for_repo(dir.path());
        write_daemon_record(&paths, "a1b2c3d4e5f6", NONCE);

        let frame = ChunkFrame {
            session_id: SessionId::new("a1b2c3d4e5f6"),
            nonce: Nonce::new(NONCE),
            event: WorkerEvent::Registry(RegistryEvent::SessionCompleted {
                schema_version: SCHEMA_VERSION,
                session_id: SessionId::new("a1b2c3d4e5f6"),
                timestamp: "t".to_string(),
                metadata: None,
                tokens_used: Some(agentz_protocol::TokenUsage {
                    input: 5,
                    output: 3,
                }),
            }),
        };
        let store = run_ingest(
            &dir,
            vec![output_frame("a1b2c3d4e5f6", NONCE, "before"), frame],
        )
        .await;

        // Buffered output flushed before the lifecycle event was appended.
        assert_eq!(store.read_session("a1b2c3d4e5f6").unwrap().len(), 1);
        let registry = store.read_registry().unwrap();
        assert_eq!(registry.len(), 1);
        assert!(matches!(registry[0], RegistryEvent::SessionCompleted { .. }));
    }

    #[tokio::test]
    async fn test_session_id_mismatch_rejected() {
        let dir = TempDir::new().unwrap();
        let paths = ControlPlanePaths::for_repo(dir.path());
        write_daemon_record(&paths, "a1b2c3d4e5f6", NONCE);
        write_daemon_record(&paths, "ffffffffffff", NONCE);

        let frame = ChunkFrame {
            session_id: SessionId::new("ffffffffffff"),
            nonce: Nonce::new(NONCE),
            event: WorkerEvent::Session(SessionEvent::Output {
                schema_version: SCHEMA_VERSION,
                session_id: SessionId::new("a1b2c3d4e5f6"),
                chunk: AgentOutputChunk::new(ChunkKind::Text, "cross", "t"),
            }),
        };
        let store = run_ingest(&dir, vec![frame]).await;
        assert!(store.read_session("a1b2c3d4e5f6").unwrap().is_empty());
        assert!(store.read_session("ffffffffffff").unwrap().is_empty());
    }
}
