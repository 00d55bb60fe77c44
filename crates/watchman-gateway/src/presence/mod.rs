//! Presence table, profile directory, and change feed.
//!
//! The table stores one heartbeat instant per user and broadcasts a
//! content-free notice on every mutation. Stale rows stay stored; readers
//! filter them at query time.

mod profiles;
mod table;

pub use profiles::ProfileDirectory;
pub use table::PresenceTable;

/// Monotonic "now" used for heartbeats and liveness checks.
///
/// Goes through tokio's clock so paused-time tests control it.
pub fn now() -> std::time::Instant {
    tokio::time::Instant::now().into_std()
}
