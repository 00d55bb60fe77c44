//! Client-side failure taxonomy.
//!
//! Only `JoinFailed` (and `SubscribeFailed` at connect time) reach callers.
//! The rest are logged and absorbed: the next heartbeat, notice, or the
//! liveness window repairs them.

use thiserror::Error;
use watchman_core::WatchmanError;

pub type Result<T> = std::result::Result<T, ClientError>;

#[derive(Debug, Error)]
pub enum ClientError {
    #[error("join failed: {0}")]
    JoinFailed(#[source] WatchmanError),
    #[error("heartbeat failed: {0}")]
    HeartbeatFailed(#[source] WatchmanError),
    #[error("leave failed: {0}")]
    LeaveFailed(#[source] WatchmanError),
    #[error("presence query failed: {0}")]
    QueryFailed(#[source] WatchmanError),
    #[error("change feed subscribe failed: {0}")]
    SubscribeFailed(#[source] WatchmanError),
}

impl ClientError {
    /// The backend error underneath.
    pub fn cause(&self) -> &WatchmanError {
        match self {
            ClientError::JoinFailed(e)
            | ClientError::HeartbeatFailed(e)
            | ClientError::LeaveFailed(e)
            | ClientError::QueryFailed(e)
            | ClientError::SubscribeFailed(e) => e,
        }
    }
}
