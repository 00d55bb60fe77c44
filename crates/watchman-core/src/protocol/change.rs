//! Change notifications.
//!
//! A notice only says "the presence table changed". Consumers must re-run the
//! liveness query instead of patching their view from the payload.

use serde::{Deserialize, Serialize};
use serde_json::value::RawValue;

/// Kind of table mutation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChangeKind {
    Insert,
    Update,
    Delete,
}

impl ChangeKind {
    pub fn as_str(self) -> &'static str {
        match self {
            ChangeKind::Insert => "insert",
            ChangeKind::Update => "update",
            ChangeKind::Delete => "delete",
        }
    }
}

#[derive(Serialize)]
struct RowRef<'a> {
    user_id: &'a str,
}

/// Tagged, content-free change notification.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChangeNotice {
    pub kind: ChangeKind,
    /// Opaque payload; never authoritative.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub payload: Option<Box<RawValue>>,
}

impl ChangeNotice {
    /// Notice for a mutation of `user_id`'s row.
    pub fn for_row(kind: ChangeKind, user_id: &str) -> Self {
        Self {
            kind,
            payload: serde_json::value::to_raw_value(&RowRef { user_id }).ok(),
        }
    }

    /// Payload-less "something changed" notice, used after missed notices or
    /// a feed reconnect.
    pub fn hint() -> Self {
        Self {
            kind: ChangeKind::Update,
            payload: None,
        }
    }
}
