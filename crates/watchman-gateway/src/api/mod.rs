//! HTTP presence API.
//!
//! - `PUT    /v1/presence/:user_id?seq=N` : heartbeat (upsert own row)
//! - `DELETE /v1/presence/:user_id?seq=N` : leave (delete own row)
//! - `GET    /v1/presence`          : every stored row, newest first
//! - `GET    /v1/presence/active`   : ghost-filtered rows + count
//!
//! `seq` is the client's write sequence. Writes older than the stored one
//! answer `409 STALE`; without `seq` a write always applies.

pub mod presence;

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};

use watchman_core::error::{ClientCode, WatchmanError};
use watchman_core::protocol::ErrorBody;

/// HTTP wrapper for `WatchmanError`.
#[derive(Debug)]
pub struct ApiError(pub WatchmanError);

impl From<WatchmanError> for ApiError {
    fn from(e: WatchmanError) -> Self {
        Self(e)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let code = self.0.client_code();
        let status = match code {
            ClientCode::BadRequest => StatusCode::BAD_REQUEST,
            ClientCode::AuthFailed => StatusCode::UNAUTHORIZED,
            ClientCode::NotAllowed => StatusCode::FORBIDDEN,
            ClientCode::NotFound => StatusCode::NOT_FOUND,
            ClientCode::Timeout => StatusCode::REQUEST_TIMEOUT,
            ClientCode::Stale => StatusCode::CONFLICT,
            ClientCode::UnsupportedVersion => StatusCode::BAD_REQUEST,
            ClientCode::Backend | ClientCode::Internal => StatusCode::INTERNAL_SERVER_ERROR,
        };
        let body = Json(ErrorBody {
            error: code.as_str().to_string(),
            message: self.0.to_string(),
        });
        (status, body).into_response()
    }
}

pub type ApiResult<T> = std::result::Result<T, ApiError>;
