//! Operator-invoked retention sweep.
//!
//! Soft-delete is the only automatic delete path; this sweep exists for
//! operators who want old terminal sessions tombstoned in bulk. It never
//! runs on its own and never prunes per-session log files.

use chrono::{DateTime, Utc};
use tracing::info;

use agentz_protocol::{RegistryEvent, SCHEMA_VERSION, SessionStatus};

use crate::aggregates::list_sessions;
use crate::errors::StoreError;
use crate::registry::EventStore;

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SweepOutcome {
    pub tombstoned: usize,
    pub kept: usize,
}

/// Tombstone terminal sessions that are older than `max_age_ms`, then keep
/// tombstoning oldest-first until at most `max_count` sessions remain.
///
/// Active sessions are never swept regardless of age.
pub fn retention_sweep(
    store: &EventStore,
    max_age_ms: u64,
    max_count: usize,
    now: DateTime<Utc>,
) -> Result<SweepOutcome, StoreError> {
    let sessions = list_sessions(store)?;

    let mut doomed: Vec<&agentz_protocol::SessionId> = Vec::new();
    let mut survivors = 0usize;

    // list_sessions is newest-first; walk oldest-first for the count cap.
    for session in sessions.iter().rev() {
        if !session.status.is_terminal() {
            survivors += 1;
            continue;
        }

        let too_old = DateTime::parse_from_rfc3339(&session.started_at)
            .map(|started| {
                let age = now.signed_duration_since(started.with_timezone(&Utc));
                age.num_milliseconds() >= 0 && age.num_milliseconds() as u64 > max_age_ms
            })
            .unwrap_or(false);

        if too_old {
            doomed.push(&session.id);
        } else {
            survivors += 1;
        }
    }

    // Count cap: tombstone the oldest terminal survivors beyond max_count.
    if survivors > max_count {
        let mut excess = survivors - max_count;
        for session in sessions.iter().rev() {
            if excess == 0 {
                break;
            }
            if session.status.is_terminal() && !doomed.contains(&&session.id) {
                doomed.push(&session.id);
                excess -= 1;
            }
        }
    }

    let mut outcome = SweepOutcome {
        tombstoned: 0,
        kept: sessions.len(),
    };

    for id in doomed {
        store.append_registry(&RegistryEvent::SessionDeleted {
            schema_version: SCHEMA_VERSION,
            session_id: id.clone(),
            timestamp: now.to_rfc3339(),
        })?;
        outcome.tombstoned += 1;
    }
    outcome.kept = sessions.len() - outcome.tombstoned;

    info!(
        event = "store.sweep.completed",
        tombstoned = outcome.tombstoned,
        kept = outcome.kept,
    );
    Ok(outcome)
}
