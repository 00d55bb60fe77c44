//! Backend seam.
//!
//! The client only needs four calls from whatever hosts the presence table.
//! `TableBackend` (feature `table`) talks to an in-process table,
//! `RemoteBackend` to a gateway over HTTP + WebSocket.

mod remote;
#[cfg(feature = "table")]
mod table;

use async_trait::async_trait;
use tokio::sync::broadcast::error::RecvError;
use tokio::sync::{broadcast, mpsc};

use watchman_core::protocol::ChangeNotice;
use watchman_core::{PresenceRecord, Result};

pub use remote::{RemoteBackend, RemoteConfig};
#[cfg(feature = "table")]
pub use table::TableBackend;

#[async_trait]
pub trait PresenceBackend: Send + Sync + 'static {
    /// Insert or refresh the caller's row; the backend stamps the time.
    /// Safe to repeat. `seq` comes from the session's `WriteClock`; a write
    /// older than the latest one the backend has seen for this user
    /// (including a delete) fails with `Stale` and changes nothing.
    async fn upsert_one(&self, user_id: &str, seq: u64) -> Result<()>;

    /// Delete the caller's row and remember `seq` so older upserts arriving
    /// later are dropped. Deleting a missing row succeeds.
    async fn delete_one(&self, user_id: &str, seq: u64) -> Result<()>;

    /// Every stored row (ghosts included), newest heartbeat first, with
    /// display names joined.
    async fn query_all(&self) -> Result<Vec<PresenceRecord>>;

    /// Change notifications for the whole table. Drop the feed to cancel.
    async fn subscribe(&self) -> Result<ChangeFeed>;
}

/// Cancellable stream of change notices (hints to requery, nothing more).
pub struct ChangeFeed {
    inner: FeedInner,
}

enum FeedInner {
    Broadcast(broadcast::Receiver<ChangeNotice>),
    Channel(mpsc::Receiver<ChangeNotice>),
}

impl ChangeFeed {
    pub fn from_broadcast(rx: broadcast::Receiver<ChangeNotice>) -> Self {
        Self {
            inner: FeedInner::Broadcast(rx),
        }
    }

    pub fn from_channel(rx: mpsc::Receiver<ChangeNotice>) -> Self {
        Self {
            inner: FeedInner::Channel(rx),
        }
    }

    /// Next notice, or `None` once the feed is closed. Missed notices
    /// collapse into a single hint.
    pub async fn next(&mut self) -> Option<ChangeNotice> {
        match &mut self.inner {
            FeedInner::Broadcast(rx) => match rx.recv().await {
                Ok(n) => Some(n),
                Err(RecvError::Lagged(missed)) => {
                    tracing::debug!(missed, "change feed lagged");
                    Some(ChangeNotice::hint())
                }
                Err(RecvError::Closed) => None,
            },
            FeedInner::Channel(rx) => rx.recv().await,
        }
    }
}
