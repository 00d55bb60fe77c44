//! Feed envelope (JSON text frame).
//!
//! `data` is kept as `RawValue` so readers only parse the payloads they use.

use serde::Deserialize;
use serde_json::value::RawValue;

use crate::error::{Result, WatchmanError};
use crate::protocol::change::ChangeNotice;

/// Current feed protocol version.
pub const FEED_VERSION: u8 = 1;

/// Service name of presence frames.
pub const SVC_PRESENCE: &str = "presence";
/// Service name of lifecycle frames (`authed`, `error`).
pub const SVC_SYS: &str = "sys";

/// Feed envelope (Text frame).
#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Envelope {
    /// Protocol version.
    pub v: u8,
    /// Service name (e.g., "presence").
    pub svc: String,
    /// Message type (field name is `type` in JSON).
    #[serde(rename = "type")]
    pub msg_type: String,
    /// Feature flags bitmask.
    #[serde(default)]
    pub flags: u32,
    /// Per-connection sequence number.
    #[serde(default)]
    pub seq: Option<u64>,
    /// Optional payload, stored as raw JSON (lazy parsing).
    #[serde(default)]
    pub data: Option<Box<RawValue>>,
}

impl Envelope {
    /// Parse and version-check a text frame.
    pub fn parse(s: &str) -> Result<Self> {
        let env: Envelope = serde_json::from_str(s)
            .map_err(|e| WatchmanError::BadRequest(format!("invalid envelope json: {e}")))?;
        if env.v != FEED_VERSION {
            return Err(WatchmanError::UnsupportedVersion);
        }
        Ok(env)
    }

    pub fn is(&self, svc: &str, msg_type: &str) -> bool {
        self.svc == svc && self.msg_type == msg_type
    }

    /// Decode the change notice carried by a `presence/change` frame.
    pub fn change_notice(&self) -> Result<ChangeNotice> {
        if !self.is(SVC_PRESENCE, "change") {
            return Err(WatchmanError::BadRequest(format!(
                "not a change frame: {}/{}",
                self.svc, self.msg_type
            )));
        }
        let raw = self
            .data
            .as_ref()
            .ok_or_else(|| WatchmanError::BadRequest("change frame requires data".into()))?;
        serde_json::from_str(raw.get())
            .map_err(|e| WatchmanError::BadRequest(format!("invalid change data: {e}")))
    }
}
