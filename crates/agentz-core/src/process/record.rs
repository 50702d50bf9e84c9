//! Durable per-session worker records.
//!
//! Spawn writes one JSON record per session under
//! `.control-plane/daemons/<sessionId>.json`. The record carries the pid,
//! the one-time nonce, and spawn-time process identity so that liveness
//! checks and nonce validation survive a control-plane restart — the
//! in-memory table is only a cache over these files.

use std::path::Path;

use serde::{Deserialize, Serialize};
use tracing::debug;

use agentz_protocol::{Nonce, SessionId};

use crate::process::errors::ProcessError;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DaemonRecord {
    pub session_id: SessionId,
    pub pid: u32,
    pub nonce: Nonce,
    pub started_at: String,
    /// Process name at spawn, for pid-reuse protection.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub process_name: Option<String>,
    /// Process start time at spawn (epoch seconds), for pid-reuse protection.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub process_start_time: Option<u64>,
}

impl DaemonRecord {
    pub fn write(&self, path: &Path) -> Result<(), ProcessError> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let json = serde_json::to_string_pretty(self).map_err(|e| ProcessError::RecordError {
            path: path.to_path_buf(),
            message: format!("serialize failed: {}", e),
        })?;
        std::fs::write(path, json)?;
        debug!(
            event = "core.process.record_written",
            session_id = %self.session_id,
            pid = self.pid,
            path = %path.display(),
        );
        Ok(())
    }

    /// Read a record; `Ok(None)` when none exists.
    pub fn read(path: &Path) -> Result<Option<Self>, ProcessError> {
        let content = match std::fs::read_to_string(path) {
            Ok(content) => content,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(ProcessError::IoError { source: e }),
        };
        let record = serde_json::from_str(&content).map_err(|e| ProcessError::RecordError {
            path: path.to_path_buf(),
            message: format!("parse failed: {}", e),
        })?;
        Ok(Some(record))
    }

    pub fn delete(path: &Path) -> Result<(), ProcessError> {
        match std::fs::remove_file(path) {
            Ok(()) => {
                debug!(event = "core.process.record_deleted", path = %path.display());
                Ok(())
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(ProcessError::IoError { source: e }),
        }
    }
}
