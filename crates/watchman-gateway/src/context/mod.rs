//! Request identity shared across the HTTP and WS surfaces.

pub mod auth;

pub use auth::{bearer_ticket, Identity};
