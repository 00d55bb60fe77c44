//! Feed frame codec.
//!
//! - Outbound: `sys/authed`, `sys/error`, `presence/change` text frames
//! - Inbound: text frames => Envelope; Ping/Pong/Close surfaced for lifecycle

use axum::extract::ws::Message;
use serde::Serialize;
use serde_json::json;

use watchman_core::error::Result;
use watchman_core::protocol::text::{FEED_VERSION, SVC_PRESENCE, SVC_SYS};
use watchman_core::protocol::{ChangeNotice, Envelope};

#[derive(Debug)]
pub enum Inbound {
    Text(Envelope),
    /// Clients have nothing to say in binary; only the length is kept.
    Binary(usize),
    Ping(Vec<u8>),
    Pong,
    Close,
}

pub fn decode(msg: Message) -> Result<Inbound> {
    match msg {
        Message::Text(s) => Ok(Inbound::Text(Envelope::parse(&s)?)),
        Message::Binary(b) => Ok(Inbound::Binary(b.len())),
        Message::Ping(v) => Ok(Inbound::Ping(v)),
        Message::Pong(_) => Ok(Inbound::Pong),
        Message::Close(_) => Ok(Inbound::Close),
    }
}

#[derive(Serialize)]
struct ChangeFrame<'a> {
    v: u8,
    svc: &'static str,
    #[serde(rename = "type")]
    msg_type: &'static str,
    flags: u32,
    seq: u64,
    data: &'a ChangeNotice,
}

pub fn change_frame(seq: u64, notice: &ChangeNotice) -> Result<String> {
    serde_json::to_string(&ChangeFrame {
        v: FEED_VERSION,
        svc: SVC_PRESENCE,
        msg_type: "change",
        flags: 0,
        seq,
        data: notice,
    })
    .map_err(|e| watchman_core::WatchmanError::Internal(format!("change frame encode failed: {e}")))
}

pub fn sys_authed_json(user: &str, display_name: &str) -> String {
    json!({
        "v": FEED_VERSION,
        "svc": SVC_SYS,
        "type": "authed",
        "flags": 0,
        "data": {
            "user": user,
            "display_name": display_name
        }
    })
    .to_string()
}

pub fn sys_error_json(code: &str, msg: &str) -> String {
    json!({
        "v": FEED_VERSION,
        "svc": SVC_SYS,
        "type": "error",
        "flags": 0,
        "data": {
            "code": code,
            "msg": msg
        }
    })
    .to_string()
}
