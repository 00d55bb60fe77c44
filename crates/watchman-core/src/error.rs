//! Shared error type across Watchman crates.

use thiserror::Error;

/// Client-facing error codes (stable API).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClientCode {
    /// Invalid input / malformed message.
    BadRequest,
    /// Ticket missing or unknown.
    AuthFailed,
    /// Authenticated, but the action targets someone else's row.
    NotAllowed,
    /// Unknown route target.
    NotFound,
    /// Backend call failed (transport or remote status).
    Backend,
    /// Backend call did not complete in time.
    Timeout,
    /// Write overtaken by a newer write of the same user.
    Stale,
    /// Unsupported protocol or config version.
    UnsupportedVersion,
    /// Internal server error.
    Internal,
}

impl ClientCode {
    /// String representation used in JSON responses.
    pub fn as_str(self) -> &'static str {
        match self {
            ClientCode::BadRequest => "BAD_REQUEST",
            ClientCode::AuthFailed => "AUTH_FAILED",
            ClientCode::NotAllowed => "NOT_ALLOWED",
            ClientCode::NotFound => "NOT_FOUND",
            ClientCode::Backend => "BACKEND",
            ClientCode::Timeout => "TIMEOUT",
            ClientCode::Stale => "STALE",
            ClientCode::UnsupportedVersion => "UNSUPPORTED_VERSION",
            ClientCode::Internal => "INTERNAL",
        }
    }
}

/// Shared result type.
pub type Result<T> = std::result::Result<T, WatchmanError>;

/// Unified error type used by core, gateway, and client.
#[derive(Debug, Error)]
pub enum WatchmanError {
    #[error("bad request: {0}")]
    BadRequest(String),
    #[error("auth failed")]
    AuthFailed,
    #[error("not allowed: {0}")]
    NotAllowed(String),
    #[error("not found: {0}")]
    NotFound(String),
    #[error("backend: {0}")]
    Backend(String),
    #[error("timeout")]
    Timeout,
    #[error("stale write: {0}")]
    Stale(String),
    #[error("unsupported version")]
    UnsupportedVersion,
    #[error("internal: {0}")]
    Internal(String),
}

impl WatchmanError {
    /// Map internal error to a stable client-facing code.
    pub fn client_code(&self) -> ClientCode {
        match self {
            WatchmanError::BadRequest(_) => ClientCode::BadRequest,
            WatchmanError::AuthFailed => ClientCode::AuthFailed,
            WatchmanError::NotAllowed(_) => ClientCode::NotAllowed,
            WatchmanError::NotFound(_) => ClientCode::NotFound,
            WatchmanError::Backend(_) => ClientCode::Backend,
            WatchmanError::Timeout => ClientCode::Timeout,
            WatchmanError::Stale(_) => ClientCode::Stale,
            WatchmanError::UnsupportedVersion => ClientCode::UnsupportedVersion,
            WatchmanError::Internal(_) => ClientCode::Internal,
        }
    }

    /// Rebuild an error from a code string received over the wire.
    pub fn from_code(code: &str, msg: impl Into<String>) -> Self {
        let msg = msg.into();
        match code {
            "BAD_REQUEST" => WatchmanError::BadRequest(msg),
            "AUTH_FAILED" => WatchmanError::AuthFailed,
            "NOT_ALLOWED" => WatchmanError::NotAllowed(msg),
            "NOT_FOUND" => WatchmanError::NotFound(msg),
            "TIMEOUT" => WatchmanError::Timeout,
            "STALE" => WatchmanError::Stale(msg),
            "UNSUPPORTED_VERSION" => WatchmanError::UnsupportedVersion,
            "INTERNAL" => WatchmanError::Internal(msg),
            _ => WatchmanError::Backend(msg),
        }
    }
}
