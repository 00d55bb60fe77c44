//! Shared application state for the Watchman gateway.

use std::collections::HashMap;
use std::sync::Arc;

use tokio::sync::watch;

use watchman_core::error::{Result, WatchmanError};

use crate::config::GatewayConfig;
use crate::context::Identity;
use crate::obs::WatchmanMetrics;
use crate::presence::{PresenceTable, ProfileDirectory};

#[derive(Clone)]
pub struct AppState {
    inner: Arc<AppStateInner>,
    table: Arc<PresenceTable>,
    metrics: Arc<WatchmanMetrics>,
}

struct AppStateInner {
    cfg: GatewayConfig,
    /// ticket -> user_id
    tickets: HashMap<String, String>,
    /// Flips once when shutdown starts; open feeds close on it.
    drain: watch::Sender<bool>,
}

impl AppState {
    /// Build application state from a validated config.
    pub fn new(cfg: GatewayConfig) -> Result<Self> {
        cfg.validate()?;

        let profiles = Arc::new(ProfileDirectory::new(cfg.presence.fallback_label.clone()));
        let mut tickets = HashMap::new();
        for u in &cfg.users {
            if let Some(name) = &u.display_name {
                profiles.set(u.id.clone(), name.clone());
            }
            if let Some(t) = &u.ticket {
                tickets.insert(t.clone(), u.id.clone());
            }
        }
        if tickets.is_empty() {
            tracing::warn!("no user tickets configured; every authenticated route will reject");
        }

        let table = Arc::new(PresenceTable::new(
            cfg.presence.policy(),
            profiles,
            cfg.presence.feed_capacity,
        ));

        Ok(Self {
            inner: Arc::new(AppStateInner {
                cfg,
                tickets,
                drain: watch::Sender::new(false),
            }),
            table,
            metrics: Arc::new(WatchmanMetrics::default()),
        })
    }

    pub fn cfg(&self) -> &GatewayConfig {
        &self.inner.cfg
    }

    pub fn table(&self) -> Arc<PresenceTable> {
        Arc::clone(&self.table)
    }

    pub fn metrics(&self) -> &WatchmanMetrics {
        &self.metrics
    }

    pub fn is_draining(&self) -> bool {
        self.metrics.is_draining()
    }

    /// Fail readiness and close every open feed. Upgraded sockets are not
    /// tracked by graceful shutdown, so they need their own signal.
    pub fn set_draining(&self) {
        self.metrics.set_draining();
        self.inner.drain.send_replace(true);
    }

    /// Resolves once `set_draining` has been called.
    pub async fn drained(&self) {
        let mut rx = self.inner.drain.subscribe();
        let _ = rx.wait_for(|draining| *draining).await;
    }

    /// Gauges computed at scrape time.
    pub fn metrics_extra(&self) -> Vec<(&'static str, u64)> {
        let now = crate::presence::now();
        vec![
            ("watchman_presence_rows", self.table.len() as u64),
            ("watchman_presence_active", self.table.active(now).len() as u64),
            ("watchman_feed_subscribers", self.table.subscriber_count() as u64),
        ]
    }

    pub fn resolve_ticket(&self, ticket: &str) -> Result<Identity> {
        let user_id = self
            .inner
            .tickets
            .get(ticket)
            .ok_or(WatchmanError::AuthFailed)?;
        Ok(Identity {
            user_id: user_id.clone(),
            display_name: self.table.profiles().display_name(user_id),
        })
    }
}
