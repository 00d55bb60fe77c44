//! Write sequence stamped on every upsert and delete of one session.

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{SystemTime, UNIX_EPOCH};

/// Strictly increasing write stamps, seeded from wall-clock microseconds so
/// a client started later (a reload that resumes the row) still writes
/// newer stamps than the one it replaces.
///
/// The backend keeps the highest stamp per user and drops older writes, so
/// a heartbeat that lands after the leave it raced with cannot bring the
/// row back.
#[derive(Debug, Default)]
pub struct WriteClock {
    last: AtomicU64,
}

impl WriteClock {
    pub fn new() -> Self {
        Self::default()
    }

    /// Next stamp: wall micros, or one past the previous stamp when the wall
    /// clock has not moved (or moved back).
    pub fn next(&self) -> u64 {
        let wall = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_micros() as u64)
            .unwrap_or(0);
        let mut prev = self.last.load(Ordering::Relaxed);
        loop {
            let next = wall.max(prev + 1);
            match self
                .last
                .compare_exchange_weak(prev, next, Ordering::AcqRel, Ordering::Relaxed)
            {
                Ok(_) => return next,
                Err(actual) => prev = actual,
            }
        }
    }

    /// Last stamp handed out, 0 before the first.
    pub fn last(&self) -> u64 {
        self.last.load(Ordering::Acquire)
    }
}
