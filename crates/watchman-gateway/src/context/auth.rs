use axum::http::{header, HeaderMap};

use watchman_core::error::{Result, WatchmanError};

use crate::app_state::AppState;

/// Authenticated caller (user id resolved from a ticket).
#[derive(Debug, Clone)]
pub struct Identity {
    pub user_id: String,
    pub display_name: String,
}

impl Identity {
    /// Writers may only touch their own presence row.
    pub fn ensure_owner(&self, user_id: &str) -> Result<()> {
        if self.user_id != user_id {
            return Err(WatchmanError::NotAllowed(format!(
                "{} may not modify presence of {user_id}",
                self.user_id
            )));
        }
        Ok(())
    }
}

/// Extract `Authorization: Bearer <ticket>`.
pub fn bearer_ticket(headers: &HeaderMap) -> Option<&str> {
    headers
        .get(header::AUTHORIZATION)?
        .to_str()
        .ok()?
        .strip_prefix("Bearer ")
        .map(str::trim)
        .filter(|t| !t.is_empty())
}

/// Resolve the caller from request headers or reject.
pub fn authenticate(state: &AppState, headers: &HeaderMap, surface: &str) -> Result<Identity> {
    let res = bearer_ticket(headers)
        .ok_or(WatchmanError::AuthFailed)
        .and_then(|t| state.resolve_ticket(t));
    if res.is_err() {
        state.metrics().auth_failures.inc(&[("surface", surface)]);
    }
    res
}
