//! HTTP representation of presence rows.
//!
//! Rows carry their age instead of a wall-clock timestamp; the receiver
//! rebuilds `last_ping` against its own monotonic clock.

use std::time::{Duration, Instant};

use serde::{Deserialize, Serialize};

use crate::presence::PresenceRecord;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PresenceRow {
    pub user_id: String,
    pub display_name: String,
    /// Milliseconds since the last heartbeat, measured by the server.
    pub age_ms: u64,
}

impl PresenceRow {
    pub fn from_record(record: &PresenceRecord, now: Instant) -> Self {
        Self {
            user_id: record.user_id.clone(),
            display_name: record.display_name.clone(),
            age_ms: u64::try_from(record.age(now).as_millis()).unwrap_or(u64::MAX),
        }
    }

    pub fn into_record(self, now: Instant) -> PresenceRecord {
        let last_ping = now
            .checked_sub(Duration::from_millis(self.age_ms))
            .unwrap_or(now);
        PresenceRecord {
            user_id: self.user_id,
            display_name: self.display_name,
            last_ping,
        }
    }
}

/// Body of `GET /v1/presence/active`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ActiveResponse {
    pub count: usize,
    pub members: Vec<PresenceRow>,
}

/// JSON error body returned by the gateway.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorBody {
    pub error: String,
    pub message: String,
}
