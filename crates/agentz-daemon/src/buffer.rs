//! Flush buffering and output-size enforcement for one session stream.
//!
//! Chunks are buffered and flushed after `FLUSH_CHUNK_THRESHOLD` pending
//! chunks or `FLUSH_DELAY_MS`, whichever comes first (the pending-byte cap
//! also forces a flush). When a session's retained output exceeds
//! `MAX_OUTPUT_SIZE_BYTES`, the stream is rewritten keeping the most-recent
//! ~60% with a `system` chunk prepended announcing the truncation.

use tracing::info;

use agentz_protocol::{
    AgentOutputChunk, ChunkKind, SCHEMA_VERSION, SessionEvent, SessionId,
};
use agentz_store::EventStore;

use crate::errors::DaemonError;

/// Fraction of the cap retained after a truncation.
const RETAIN_NUMERATOR: u64 = 60;
const RETAIN_DENOMINATOR: u64 = 100;

/// Pending chunks for one session, flushed in arrival order.
#[derive(Debug)]
pub struct FlushBuffer {
    session_id: SessionId,
    pending: Vec<SessionEvent>,
    pending_bytes: u64,
    chunk_threshold: usize,
    buffer_byte_cap: u64,
}

impl FlushBuffer {
    pub fn new(session_id: SessionId, chunk_threshold: usize, buffer_byte_cap: u64) -> Self {
        Self {
            session_id,
            pending: Vec::new(),
            pending_bytes: 0,
            chunk_threshold,
            buffer_byte_cap,
        }
    }

    pub fn push(&mut self, event: SessionEvent) {
        self.pending_bytes += event_bytes(&event);
        self.pending.push(event);
    }

    pub fn is_empty(&self) -> bool {
        self.pending.is_empty()
    }

    /// Whether the threshold or byte cap forces an immediate flush.
    pub fn should_flush(&self) -> bool {
        self.pending.len() >= self.chunk_threshold || self.pending_bytes >= self.buffer_byte_cap
    }

    /// Append every pending event to the session stream, in order.
    pub fn flush(&mut self, store: &EventStore) -> Result<usize, DaemonError> {
        let count = self.pending.len();
        for event in self.pending.drain(..) {
            store.append_session(&event)?;
        }
        self.pending_bytes = 0;
        if count > 0 {
            tracing::debug!(
                event = "daemon.buffer.flushed",
                session_id = %self.session_id,
                chunks = count,
            );
        }
        Ok(count)
    }
}

fn event_bytes(event: &SessionEvent) -> u64 {
    match event {
        SessionEvent::Output { chunk, .. } => chunk.content.len() as u64,
        SessionEvent::CliSessionId { cli_session_id, .. } => cli_session_id.len() as u64,
        SessionEvent::AgentState { state, .. } => {
            serde_json::to_string(state).map(|s| s.len()).unwrap_or(0) as u64
        }
    }
}

/// Enforce the retained-output cap on a session stream.
///
/// When total output content exceeds `max_bytes`, the stream file is
/// rewritten: oldest `output` events are dropped until the retained share
/// is ~60% of the cap, and a `system` chunk announcing the truncation is
/// prepended. Non-output events (resume handles, agent state) are always
/// kept. Returns whether a truncation happened.
pub fn enforce_output_cap(
    store: &EventStore,
    session_id: &SessionId,
    max_bytes: u64,
) -> Result<bool, DaemonError> {
    let events = store.read_session(session_id)?;
    let total: u64 = events
        .iter()
        .map(|event| match event {
            SessionEvent::Output { chunk, .. } => chunk.content.len() as u64,
            _ => 0,
        })
        .sum();
    if total <= max_bytes {
        return Ok(false);
    }

    let retain_target = max_bytes * RETAIN_NUMERATOR / RETAIN_DENOMINATOR;
    let mut to_drop = total - retain_target;
    let mut dropped_bytes: u64 = 0;
    let mut dropped_chunks = 0usize;

    let mut kept: Vec<SessionEvent> = Vec::with_capacity(events.len());
    for event in events {
        match &event {
            SessionEvent::Output { chunk, .. } if to_drop > 0 => {
                let len = chunk.content.len() as u64;
                to_drop = to_drop.saturating_sub(len);
                dropped_bytes += len;
                dropped_chunks += 1;
            }
            _ => kept.push(event),
        }
    }

    let announcement = SessionEvent::Output {
        schema_version: SCHEMA_VERSION,
        session_id: session_id.clone(),
        chunk: AgentOutputChunk::new(
            ChunkKind::System,
            format!(
                "Output truncated: {} earlier chunks ({} bytes) dropped to stay within the {} byte retention cap.",
                dropped_chunks, dropped_bytes, max_bytes
            ),
            chrono_now(),
        ),
    };

    // Rewrite atomically: the new file is complete before it replaces the
    // old one, so a concurrent reader sees either version, never a mix.
    let path = store.paths().session_stream(session_id);
    let mut content = String::new();
    content.push_str(&serde_json::to_string(&announcement).map_err(|e| {
        DaemonError::ProtocolError(format!("failed to encode truncation chunk: {}", e))
    })?);
    content.push('\n');
    for event in &kept {
        content.push_str(&serde_json::to_string(event).map_err(|e| {
            DaemonError::ProtocolError(format!("failed to encode retained event: {}", e))
        })?);
        content.push('\n');
    }

    let tmp_path = path.with_extension("log.tmp");
    std::fs::write(&tmp_path, &content)?;
    std::fs::rename(&tmp_path, &path)?;

    info!(
        event = "daemon.buffer.output_truncated",
        session_id = %session_id,
        dropped_chunks,
        dropped_bytes,
        retained = retain_target,
    );
    Ok(true)
}

fn chrono_now() -> String {
    chrono::Utc::now().to_rfc3339()
}
