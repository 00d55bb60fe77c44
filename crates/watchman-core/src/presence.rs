//! Presence records and the read-time liveness rule.
//!
//! Stale rows are never deleted by anyone; every reader applies
//! [`LivenessPolicy::filter_live`] instead (ghost filtering).

use std::time::{Duration, Instant};

use crate::error::{Result, WatchmanError};

/// Default liveness window: a heartbeat older than this is a ghost.
pub const LIVENESS_WINDOW: Duration = Duration::from_secs(60);
/// Default heartbeat period.
pub const HEARTBEAT_INTERVAL: Duration = Duration::from_secs(10);
/// Minimum window / heartbeat ratio tolerated by [`LivenessPolicy::validate`].
pub const MIN_WINDOW_RATIO: u32 = 5;

/// One participant's presence row, joined with their display name.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PresenceRecord {
    pub user_id: String,
    pub display_name: String,
    /// Instant of the most recent heartbeat (monotonic clock).
    pub last_ping: Instant,
}

impl PresenceRecord {
    pub fn new(user_id: impl Into<String>, display_name: impl Into<String>, last_ping: Instant) -> Self {
        Self {
            user_id: user_id.into(),
            display_name: display_name.into(),
            last_ping,
        }
    }

    /// Time since the last heartbeat (zero if `now` is earlier).
    pub fn age(&self, now: Instant) -> Duration {
        now.saturating_duration_since(self.last_ping)
    }
}

/// Heartbeat period plus the window after which a heartbeat is stale.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LivenessPolicy {
    pub window: Duration,
    pub heartbeat: Duration,
}

impl Default for LivenessPolicy {
    fn default() -> Self {
        Self {
            window: LIVENESS_WINDOW,
            heartbeat: HEARTBEAT_INTERVAL,
        }
    }
}

impl LivenessPolicy {
    pub fn new(window: Duration, heartbeat: Duration) -> Result<Self> {
        let p = Self { window, heartbeat };
        p.validate()?;
        Ok(p)
    }

    /// The window must cover several missed ticks, otherwise jitter alone
    /// produces false absences.
    pub fn validate(&self) -> Result<()> {
        if self.heartbeat.is_zero() {
            return Err(WatchmanError::BadRequest("heartbeat interval must be positive".into()));
        }
        if self.window < self.heartbeat * MIN_WINDOW_RATIO {
            return Err(WatchmanError::BadRequest(format!(
                "liveness window must be at least {MIN_WINDOW_RATIO}x the heartbeat interval"
            )));
        }
        Ok(())
    }

    /// `true` while the record's age is strictly below the window.
    pub fn is_alive(&self, record: &PresenceRecord, now: Instant) -> bool {
        record.age(now) < self.window
    }

    /// Drop ghosts, keeping the input order (newest heartbeat first when the
    /// input comes from a query).
    pub fn filter_live(&self, mut records: Vec<PresenceRecord>, now: Instant) -> Vec<PresenceRecord> {
        let before = records.len();
        records.retain(|r| self.is_alive(r, now));
        let ghosts = before - records.len();
        if ghosts > 0 {
            tracing::trace!(ghosts, live = records.len(), "filtered stale presence rows");
        }
        records
    }

    /// Whether `user_id` is among the live records.
    pub fn is_present(&self, records: &[PresenceRecord], user_id: &str, now: Instant) -> bool {
        records
            .iter()
            .any(|r| r.user_id == user_id && self.is_alive(r, now))
    }
}

/// Order rows newest heartbeat first, the order every query returns.
pub fn sort_newest_first(records: &mut [PresenceRecord]) {
    records.sort_by(|a, b| b.last_ping.cmp(&a.last_ping).then_with(|| a.user_id.cmp(&b.user_id)));
}
