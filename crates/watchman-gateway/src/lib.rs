//! Watchman gateway library entry.
//!
//! Hosts the shared presence table and exposes it over HTTP (heartbeat,
//! leave, liveness queries) and a WebSocket change feed. Consumed by the
//! binary (`main.rs`), by the in-process client backend, and by integration
//! tests.

pub mod api;
pub mod app_state;
pub mod config;
pub mod context;
pub mod obs;
pub mod ops;
pub mod presence;
pub mod router;
pub mod server;
pub mod transport;
