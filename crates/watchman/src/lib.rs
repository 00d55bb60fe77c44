//! Watchman: who is watching right now.
//!
//! Participants heartbeat a shared presence table every 10 s; anyone whose
//! last heartbeat is 60 s old or more is simply not counted. This crate
//! bundles the three parts behind one dependency:
//!
//! - [`core`]: records, the liveness rule, wire frames, errors
//! - [`gateway`]: the table and its HTTP/WebSocket server
//! - [`client`]: sessions and live membership views

pub mod core {
    pub use watchman_core::*;
}

pub mod gateway {
    pub use watchman_gateway::*;
}

pub mod client {
    pub use watchman_client::*;
}

/// The names most embedders need.
pub mod prelude {
    pub use watchman_client::{
        ClientError, PresenceBackend, PresenceSnapshot, RemoteBackend, RemoteConfig, SessionState,
        TableBackend, Watchman, WriteClock,
    };
    pub use watchman_core::{LivenessPolicy, PresenceRecord, WatchmanError};
}
