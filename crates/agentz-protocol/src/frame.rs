//! Worker-to-ingester chunk framing.
//!
//! A worker posts one JSON object per line over its ingester connection:
//! `{"sessionId": ..., "nonce": ..., "event": <per-session or registry event>}`.
//! The nonce must match the one handed out at spawn; the ingester discards
//! the frame and closes the connection on mismatch.

use serde::{Deserialize, Serialize};

use crate::events::{RegistryEvent, SessionEvent};
use crate::types::{Nonce, SessionId};

/// The event payload a worker may submit through the ingester.
///
/// Workers write their own output and resume handles into the per-session
/// stream, and report lifecycle transitions (`session_updated`,
/// `session_completed`, `session_failed`, `session_cancelled`) into the
/// registry. `session_created` and `session_deleted` are orchestrator-only
/// and are rejected at ingest.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum WorkerEvent {
    Session(SessionEvent),
    Registry(RegistryEvent),
}

/// One framed line from a worker connection.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChunkFrame {
    pub session_id: SessionId,
    pub nonce: Nonce,
    pub event: WorkerEvent,
}
