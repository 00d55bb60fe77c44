//! Watchman core: transport-agnostic presence types, error surface, and wire
//! contracts.
//!
//! This crate defines the presence record, the read-time liveness rule, and
//! the change-feed frames shared by the gateway and the client library. It
//! carries no transport or runtime dependencies so it can be reused on both
//! sides of the wire.
//!
//! # Lints
//! Panics, `unwrap`, and `expect` are compile-denied here.
//! All fallible paths must surface as `WatchmanError`/`Result`.

#![deny(clippy::unwrap_used)]
#![deny(clippy::expect_used)]
#![deny(clippy::panic)]

pub mod error;
pub mod presence;
pub mod protocol;

/// Shared result type.
pub use error::{Result, WatchmanError};
pub use presence::{LivenessPolicy, PresenceRecord};
