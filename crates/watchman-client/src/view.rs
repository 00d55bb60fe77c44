//! Ghost-filtered membership view, rebuilt from a full query on every
//! change notice.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;

use tokio::sync::watch;
use tracing::{debug, trace, warn};

use watchman_core::{LivenessPolicy, PresenceRecord};

use crate::backend::{ChangeFeed, PresenceBackend};
use crate::error::{ClientError, Result};

/// Who is present, as last observed.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PresenceSnapshot {
    /// Live members, newest heartbeat first.
    pub members: Vec<PresenceRecord>,
    /// `false` until the first successful query.
    pub loaded: bool,
}

impl PresenceSnapshot {
    /// Active count: the length of the filtered list.
    pub fn count(&self) -> usize {
        self.members.len()
    }

    pub fn contains(&self, user_id: &str) -> bool {
        self.members.iter().any(|m| m.user_id == user_id)
    }
}

pub struct PresenceView {
    self_id: String,
    policy: LivenessPolicy,
    tx: watch::Sender<PresenceSnapshot>,
    /// Set by a local leave; our own row is hidden until the next join even
    /// if a failed delete left it stored.
    hide_self: AtomicBool,
    /// Bumped by every local join/leave. A query that started under an
    /// older epoch is not published.
    epoch: AtomicU64,
}

impl PresenceView {
    pub fn new(self_id: impl Into<String>, policy: LivenessPolicy) -> Self {
        let (tx, _) = watch::channel(PresenceSnapshot::default());
        Self {
            self_id: self_id.into(),
            policy,
            tx,
            hide_self: AtomicBool::new(false),
            epoch: AtomicU64::new(0),
        }
    }

    pub fn snapshot(&self) -> PresenceSnapshot {
        self.tx.borrow().clone()
    }

    pub fn count(&self) -> usize {
        self.tx.borrow().count()
    }

    pub fn subscribe(&self) -> watch::Receiver<PresenceSnapshot> {
        self.tx.subscribe()
    }

    /// Re-run the liveness query and publish the result.
    ///
    /// On failure the previous snapshot stays in place and the error is
    /// returned for callers that care; the reconciler ignores it.
    pub async fn refresh<B>(&self, backend: &B) -> Result<usize>
    where
        B: PresenceBackend + ?Sized,
    {
        let started = self.epoch.load(Ordering::Acquire);

        let rows = match backend.query_all().await {
            Ok(rows) => rows,
            Err(e) => {
                let err = ClientError::QueryFailed(e);
                warn!(error = %err, "keeping previous presence view");
                return Err(err);
            }
        };

        let mut members = self.policy.filter_live(rows, crate::now());
        if self.hide_self.load(Ordering::Acquire) {
            members.retain(|m| m.user_id != self.self_id);
        }
        let count = members.len();

        let published = self.tx.send_if_modified(|snap| {
            if self.epoch.load(Ordering::Acquire) != started {
                return false;
            }
            let changed = !snap.loaded || snap.members != members;
            snap.members = members;
            snap.loaded = true;
            changed
        });
        trace!(count, published, "presence view refreshed");
        Ok(count)
    }

    /// Optimistically drop ourselves from the view.
    pub fn mark_left(&self) {
        self.epoch.fetch_add(1, Ordering::AcqRel);
        self.hide_self.store(true, Ordering::Release);
        let self_id = &self.self_id;
        self.tx.send_if_modified(|snap| {
            let before = snap.members.len();
            snap.members.retain(|m| m.user_id != *self_id);
            snap.members.len() != before
        });
    }

    pub fn mark_joined(&self) {
        self.hide_self.store(false, Ordering::Release);
        self.epoch.fetch_add(1, Ordering::AcqRel);
    }
}

/// Requery on every notice until the feed closes.
pub(crate) async fn reconcile<B>(view: Arc<PresenceView>, backend: Arc<B>, mut feed: ChangeFeed)
where
    B: PresenceBackend + ?Sized,
{
    while let Some(notice) = feed.next().await {
        trace!(kind = notice.kind.as_str(), "change notice");
        // Failures are logged inside refresh; the next notice retries.
        let _ = view.refresh(backend.as_ref()).await;
    }
    debug!("change feed closed");
}
