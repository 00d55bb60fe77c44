//! One participant's presence: join, heartbeat, leave, restore.

use std::sync::{Arc, Mutex, PoisonError};

use tokio::sync::watch;
use tracing::{debug, info, warn};

use watchman_core::{LivenessPolicy, PresenceRecord};

use crate::backend::PresenceBackend;
use crate::error::{ClientError, Result};
use crate::heartbeat::HeartbeatGuard;
use crate::seq::WriteClock;
use crate::view::PresenceView;

/// `Absent -> Joining -> Present -> Leaving -> Absent`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Absent,
    Joining,
    Present,
    Leaving,
}

impl SessionState {
    pub fn as_str(self) -> &'static str {
        match self {
            SessionState::Absent => "absent",
            SessionState::Joining => "joining",
            SessionState::Present => "present",
            SessionState::Leaving => "leaving",
        }
    }
}

/// Keeps one user's row alive while they intend to be present.
///
/// All writes of a session are serialised: `join` and `leave` hold the
/// operation lock, and `leave` waits for the heartbeat task to finish before
/// deleting. Every write carries a stamp from the session's `WriteClock`,
/// so a heartbeat request that reaches the backend after the delete (a
/// client-side timeout does not cancel it in flight) is dropped there.
pub struct PresenceSession<B: PresenceBackend + ?Sized> {
    backend: Arc<B>,
    user_id: String,
    policy: LivenessPolicy,
    view: Arc<PresenceView>,
    state: watch::Sender<SessionState>,
    clock: Arc<WriteClock>,
    heartbeat: Mutex<Option<HeartbeatGuard>>,
    ops: tokio::sync::Mutex<()>,
}

impl<B: PresenceBackend + ?Sized> PresenceSession<B> {
    pub fn new(
        backend: Arc<B>,
        user_id: impl Into<String>,
        policy: LivenessPolicy,
        view: Arc<PresenceView>,
    ) -> Self {
        let (state, _) = watch::channel(SessionState::Absent);
        Self {
            backend,
            user_id: user_id.into(),
            policy,
            view,
            state,
            clock: Arc::new(WriteClock::new()),
            heartbeat: Mutex::new(None),
            ops: tokio::sync::Mutex::new(()),
        }
    }

    pub fn user_id(&self) -> &str {
        &self.user_id
    }

    pub fn state(&self) -> SessionState {
        *self.state.borrow()
    }

    pub fn watch_state(&self) -> watch::Receiver<SessionState> {
        self.state.subscribe()
    }

    pub fn heartbeat_running(&self) -> bool {
        self.heartbeat
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .as_ref()
            .is_some_and(HeartbeatGuard::is_running)
    }

    /// Write our row once and start heartbeating.
    ///
    /// Already `Present`: no-op. On failure the session stays `Absent` and
    /// nothing is retried.
    pub async fn join(&self) -> Result<()> {
        let _op = self.ops.lock().await;
        if self.state() == SessionState::Present {
            debug!(user = %self.user_id, "join ignored, already present");
            return Ok(());
        }

        self.set_state(SessionState::Joining);
        if let Err(e) = self.backend.upsert_one(&self.user_id, self.clock.next()).await {
            self.set_state(SessionState::Absent);
            let err = ClientError::JoinFailed(e);
            warn!(user = %self.user_id, error = %err, "join failed");
            return Err(err);
        }

        self.view.mark_joined();
        self.start_heartbeat();
        self.set_state(SessionState::Present);
        info!(user = %self.user_id, "joined");
        Ok(())
    }

    /// Hide ourselves locally, stop heartbeating, then delete our row.
    ///
    /// A failed delete is logged and otherwise ignored: the row expires
    /// through the liveness window. Already `Absent`: no-op.
    pub async fn leave(&self) {
        let _op = self.ops.lock().await;
        if self.state() == SessionState::Absent {
            debug!(user = %self.user_id, "leave ignored, not present");
            return;
        }

        self.set_state(SessionState::Leaving);
        self.view.mark_left();

        if let Some(guard) = self.take_heartbeat() {
            guard.stop().await;
        }

        if let Err(e) = self.backend.delete_one(&self.user_id, self.clock.next()).await {
            let err = ClientError::LeaveFailed(e);
            warn!(user = %self.user_id, error = %err, "delete failed; row will expire");
        }

        self.set_state(SessionState::Absent);
        info!(user = %self.user_id, "left");
    }

    /// Resume `Present` if our row is among `live` (the startup query),
    /// restarting the heartbeat without writing now and showing ourselves in
    /// the view again. A stale own row does not count; the caller has to
    /// `join`.
    ///
    /// Returns whether the session is present afterwards.
    pub fn restore(&self, live: &[PresenceRecord]) -> bool {
        let Ok(_op) = self.ops.try_lock() else {
            debug!(user = %self.user_id, "restore skipped, join/leave in progress");
            return self.state() == SessionState::Present;
        };

        if !self.policy.is_present(live, &self.user_id, crate::now()) {
            return self.state() == SessionState::Present;
        }

        self.view.mark_joined();
        if self.start_heartbeat() {
            info!(user = %self.user_id, "resumed presence");
        }
        self.set_state(SessionState::Present);
        true
    }

    /// Stop heartbeating without deleting our row (teardown). The row stays
    /// live for one window, so a reconnect within it resumes.
    pub async fn shutdown(&self) {
        let _op = self.ops.lock().await;
        if let Some(guard) = self.take_heartbeat() {
            guard.stop().await;
        }
        self.set_state(SessionState::Absent);
    }

    /// Start the heartbeat unless one is already running.
    fn start_heartbeat(&self) -> bool {
        let mut slot = self.heartbeat.lock().unwrap_or_else(PoisonError::into_inner);
        if slot.as_ref().is_some_and(HeartbeatGuard::is_running) {
            debug!(user = %self.user_id, "heartbeat already running");
            return false;
        }
        *slot = Some(HeartbeatGuard::start(
            Arc::clone(&self.backend),
            Arc::clone(&self.clock),
            self.user_id.clone(),
            self.policy.heartbeat,
        ));
        true
    }

    fn take_heartbeat(&self) -> Option<HeartbeatGuard> {
        self.heartbeat.lock().unwrap_or_else(PoisonError::into_inner).take()
    }

    fn set_state(&self, next: SessionState) {
        let prev = self.state.send_replace(next);
        if prev != next {
            debug!(user = %self.user_id, from = prev.as_str(), to = next.as_str(), "session state");
        }
    }
}
