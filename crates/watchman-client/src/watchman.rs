use std::sync::Arc;

use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{info, warn};

use watchman_core::LivenessPolicy;

use crate::backend::PresenceBackend;
use crate::error::{ClientError, Result};
use crate::session::{PresenceSession, SessionState};
use crate::view::{self, PresenceSnapshot, PresenceView};

/// A connected participant: their session plus the shared membership view,
/// kept fresh by a reconciler task that requeries on every change notice.
pub struct Watchman<B: PresenceBackend + ?Sized> {
    backend: Arc<B>,
    view: Arc<PresenceView>,
    session: PresenceSession<B>,
    reconciler: JoinHandle<()>,
}

impl<B: PresenceBackend + ?Sized> Watchman<B> {
    /// Subscribe, load the initial view, and resume presence if our row is
    /// still live.
    ///
    /// The subscription comes first so no change between the initial query
    /// and the first notice is lost. A failed initial query leaves the view
    /// empty; the session then stays `Absent`.
    pub async fn connect(backend: Arc<B>, user_id: impl Into<String>, policy: LivenessPolicy) -> Result<Self> {
        let user_id = user_id.into();

        let feed = backend.subscribe().await.map_err(|e| {
            let err = ClientError::SubscribeFailed(e);
            warn!(user = %user_id, error = %err, "cannot follow presence changes");
            err
        })?;

        let view = Arc::new(PresenceView::new(user_id.clone(), policy));
        let reconciler = tokio::spawn(view::reconcile(Arc::clone(&view), Arc::clone(&backend), feed));

        let _ = view.refresh(backend.as_ref()).await;

        let session = PresenceSession::new(Arc::clone(&backend), user_id, policy, Arc::clone(&view));
        let resumed = session.restore(&view.snapshot().members);
        info!(user = %session.user_id(), resumed, count = view.count(), "watchman connected");

        Ok(Self {
            backend,
            view,
            session,
            reconciler,
        })
    }

    /// Join and refresh the view. Only this call surfaces an error.
    pub async fn join(&self) -> Result<()> {
        self.session.join().await?;
        let _ = self.view.refresh(self.backend.as_ref()).await;
        Ok(())
    }

    pub async fn leave(&self) {
        self.session.leave().await;
    }

    /// Requery now instead of waiting for a notice.
    pub async fn refresh(&self) -> Result<usize> {
        self.view.refresh(self.backend.as_ref()).await
    }

    pub fn state(&self) -> SessionState {
        self.session.state()
    }

    pub fn snapshot(&self) -> PresenceSnapshot {
        self.view.snapshot()
    }

    pub fn count(&self) -> usize {
        self.view.count()
    }

    pub fn watch(&self) -> watch::Receiver<PresenceSnapshot> {
        self.view.subscribe()
    }

    pub fn view(&self) -> &Arc<PresenceView> {
        &self.view
    }

    pub fn session(&self) -> &PresenceSession<B> {
        &self.session
    }

    /// Tear down without leaving: heartbeat and reconciler stop, our row
    /// ages out unless a new client resumes it within the window.
    ///
    /// Consumes the handle; connect again to come back.
    pub async fn shutdown(self) {
        self.session.shutdown().await;
        info!(user = %self.session.user_id(), "watchman shut down");
        // Drop aborts the reconciler.
    }
}

impl<B: PresenceBackend + ?Sized> Drop for Watchman<B> {
    fn drop(&mut self) {
        self.reconciler.abort();
    }
}
