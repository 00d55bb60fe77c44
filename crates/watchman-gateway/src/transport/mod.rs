//! Transport layer (WebSocket change feed).
//!
//! Exposes the feed upgrade handler and the codec that frames change notices
//! and decodes inbound client frames once.

pub mod codec;
pub mod ws;
