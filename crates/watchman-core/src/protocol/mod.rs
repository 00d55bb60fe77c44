//! Wire contracts shared by the gateway and its clients.
//!
//! - `text`: JSON envelope carried in every feed frame.
//! - `change`: content-free change notifications emitted by the presence table.
//! - `row`: HTTP representation of presence rows.
//!
//! Parsers are panic-free: malformed input is reported as `WatchmanError`.

pub mod change;
pub mod row;
pub mod text;

pub use change::{ChangeKind, ChangeNotice};
pub use row::{ActiveResponse, ErrorBody, PresenceRow};
pub use text::Envelope;
