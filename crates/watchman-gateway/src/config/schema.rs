use std::collections::HashSet;
use std::time::Duration;

use serde::Deserialize;
use watchman_core::error::{Result, WatchmanError};
use watchman_core::LivenessPolicy;

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct GatewayConfig {
    pub version: u32,

    #[serde(default)]
    pub gateway: GatewaySection,

    #[serde(default)]
    pub presence: PresenceSection,

    #[serde(default)]
    pub users: Vec<UserConfig>,
}

impl GatewayConfig {
    pub fn validate(&self) -> Result<()> {
        if self.version != 1 {
            return Err(WatchmanError::UnsupportedVersion);
        }

        self.gateway.validate()?;
        self.presence.validate()?;

        let mut ids = HashSet::new();
        let mut tickets = HashSet::new();
        for u in &self.users {
            if u.id.trim().is_empty() {
                return Err(WatchmanError::BadRequest("users[].id must not be empty".into()));
            }
            if !ids.insert(u.id.as_str()) {
                return Err(WatchmanError::BadRequest(format!("duplicate user id: {}", u.id)));
            }
            if let Some(t) = &u.ticket {
                if !tickets.insert(t.as_str()) {
                    return Err(WatchmanError::BadRequest(format!(
                        "duplicate ticket for user {}",
                        u.id
                    )));
                }
            }
        }

        Ok(())
    }
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct GatewaySection {
    #[serde(default = "default_listen")]
    pub listen: String,

    /// WS feed ping period.
    #[serde(default = "default_ping_interval_ms")]
    pub ping_interval_ms: u64,

    /// WS feed connections silent for this long are closed.
    #[serde(default = "default_idle_timeout_ms")]
    pub idle_timeout_ms: u64,
}

impl Default for GatewaySection {
    fn default() -> Self {
        Self {
            listen: default_listen(),
            ping_interval_ms: default_ping_interval_ms(),
            idle_timeout_ms: default_idle_timeout_ms(),
        }
    }
}

impl GatewaySection {
    pub fn validate(&self) -> Result<()> {
        if !(5000..=120000).contains(&self.ping_interval_ms) {
            return Err(WatchmanError::BadRequest(
                "gateway.ping_interval_ms must be between 5000 and 120000".into(),
            ));
        }
        if !(10000..=600000).contains(&self.idle_timeout_ms) {
            return Err(WatchmanError::BadRequest(
                "gateway.idle_timeout_ms must be between 10000 and 600000".into(),
            ));
        }
        if self.idle_timeout_ms <= self.ping_interval_ms {
            return Err(WatchmanError::BadRequest(
                "gateway.idle_timeout_ms must be greater than ping_interval_ms".into(),
            ));
        }
        Ok(())
    }
}

fn default_listen() -> String {
    "0.0.0.0:8080".into()
}
fn default_ping_interval_ms() -> u64 {
    20000
}
fn default_idle_timeout_ms() -> u64 {
    60000
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct PresenceSection {
    #[serde(default = "default_liveness_window_ms")]
    pub liveness_window_ms: u64,

    #[serde(default = "default_heartbeat_interval_ms")]
    pub heartbeat_interval_ms: u64,

    /// Display label for rows whose profile lookup misses.
    #[serde(default = "default_fallback_label")]
    pub fallback_label: String,

    /// Change-feed buffer per subscriber before it lags.
    #[serde(default = "default_feed_capacity")]
    pub feed_capacity: usize,
}

impl Default for PresenceSection {
    fn default() -> Self {
        Self {
            liveness_window_ms: default_liveness_window_ms(),
            heartbeat_interval_ms: default_heartbeat_interval_ms(),
            fallback_label: default_fallback_label(),
            feed_capacity: default_feed_capacity(),
        }
    }
}

impl PresenceSection {
    pub fn validate(&self) -> Result<()> {
        if !(1000..=600000).contains(&self.heartbeat_interval_ms) {
            return Err(WatchmanError::BadRequest(
                "presence.heartbeat_interval_ms must be between 1000 and 600000".into(),
            ));
        }
        self.policy().validate().map_err(|e| {
            WatchmanError::BadRequest(format!("presence.liveness_window_ms: {e}"))
        })?;
        if self.fallback_label.trim().is_empty() {
            return Err(WatchmanError::BadRequest(
                "presence.fallback_label must not be empty".into(),
            ));
        }
        if !(16..=65536).contains(&self.feed_capacity) {
            return Err(WatchmanError::BadRequest(
                "presence.feed_capacity must be between 16 and 65536".into(),
            ));
        }
        Ok(())
    }

    pub fn policy(&self) -> LivenessPolicy {
        LivenessPolicy {
            window: Duration::from_millis(self.liveness_window_ms),
            heartbeat: Duration::from_millis(self.heartbeat_interval_ms),
        }
    }
}

fn default_liveness_window_ms() -> u64 {
    60000
}
fn default_heartbeat_interval_ms() -> u64 {
    10000
}
fn default_fallback_label() -> String {
    "Watcher".into()
}
fn default_feed_capacity() -> usize {
    256
}

/// A known member: profile entry plus (optionally) a login ticket.
#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct UserConfig {
    pub id: String,
    #[serde(default)]
    pub display_name: Option<String>,
    #[serde(default)]
    pub ticket: Option<String>,
}
