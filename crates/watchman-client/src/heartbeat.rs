//! Periodic heartbeat task, owned through a guard.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tokio::time::{interval_at, Instant, MissedTickBehavior};
use tracing::debug;

use crate::backend::PresenceBackend;
use crate::error::ClientError;
use crate::seq::WriteClock;

/// Owns the heartbeat task of one session.
///
/// The first write happens one period after `start`; the caller has either
/// just written (join) or found a fresh row (restore). Dropping the guard
/// stops the task at its next tick.
pub(crate) struct HeartbeatGuard {
    stop: Option<oneshot::Sender<()>>,
    task: Option<JoinHandle<()>>,
}

impl HeartbeatGuard {
    pub(crate) fn start<B>(backend: Arc<B>, clock: Arc<WriteClock>, user_id: String, period: Duration) -> Self
    where
        B: PresenceBackend + ?Sized,
    {
        let (stop_tx, stop_rx) = oneshot::channel();
        let task = tokio::spawn(run(backend, clock, user_id, period, stop_rx));
        Self {
            stop: Some(stop_tx),
            task: Some(task),
        }
    }

    pub(crate) fn is_running(&self) -> bool {
        self.task.as_ref().is_some_and(|t| !t.is_finished())
    }

    /// Signal the task and wait for it. A write already in flight resolves
    /// on our side before this returns; the request itself may still reach
    /// the backend later, where its older stamp gets it dropped.
    pub(crate) async fn stop(mut self) {
        if let Some(tx) = self.stop.take() {
            let _ = tx.send(());
        }
        if let Some(task) = self.task.take() {
            if let Err(e) = task.await {
                debug!(error = %e, "heartbeat task ended abnormally");
            }
        }
    }
}

impl Drop for HeartbeatGuard {
    fn drop(&mut self) {
        // Dropping the sender wakes the task, which exits on its own.
        self.stop.take();
    }
}

async fn run<B>(
    backend: Arc<B>,
    clock: Arc<WriteClock>,
    user_id: String,
    period: Duration,
    mut stop: oneshot::Receiver<()>,
) where
    B: PresenceBackend + ?Sized,
{
    let mut ticker = interval_at(Instant::now() + period, period);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        tokio::select! {
            biased;
            _ = &mut stop => break,
            _ = ticker.tick() => {}
        }

        // Outside the select: a stop request never cancels a write midway.
        if let Err(e) = backend.upsert_one(&user_id, clock.next()).await {
            let err = ClientError::HeartbeatFailed(e);
            debug!(user = %user_id, error = %err, "heartbeat write failed");
        }
    }
    debug!(user = %user_id, "heartbeat stopped");
}
