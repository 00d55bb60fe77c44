//! Watchman client: keeps one participant's presence alive and a live view
//! of everyone else's.
//!
//! - `backend`: the `PresenceBackend` seam (in-process table or remote gateway)
//! - `session`: join / heartbeat / leave / restore state machine
//! - `seq`: per-session write stamps that order writes at the backend
//! - `view`: ghost-filtered membership, refreshed on every change notice
//! - `watchman`: facade wiring the three together

pub mod backend;
pub mod error;
mod heartbeat;
pub mod seq;
pub mod session;
pub mod view;
pub mod watchman;

#[cfg(feature = "table")]
pub use backend::TableBackend;
pub use backend::{ChangeFeed, PresenceBackend, RemoteBackend, RemoteConfig};
pub use error::{ClientError, Result};
pub use seq::WriteClock;
pub use session::{PresenceSession, SessionState};
pub use view::{PresenceSnapshot, PresenceView};
pub use watchman::Watchman;

/// Monotonic "now" through tokio's clock (paused-time aware).
pub(crate) fn now() -> std::time::Instant {
    tokio::time::Instant::now().into_std()
}
