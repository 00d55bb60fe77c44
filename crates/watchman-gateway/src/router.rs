//! Axum router wiring.

use axum::{routing::get, Router};

use crate::{api, app_state::AppState, ops, transport};

pub fn build_router(state: AppState) -> Router {
    Router::new()
        .route("/v1/presence", get(api::presence::list_all))
        .route("/v1/presence/active", get(api::presence::list_active))
        .route(
            "/v1/presence/:user_id",
            axum::routing::put(api::presence::heartbeat).delete(api::presence::leave),
        )
        .route("/v1/feed", get(transport::ws::feed_upgrade))
        .route("/healthz", get(ops::healthz))
        .route("/readyz", get(ops::readyz))
        .route("/metrics", get(ops::metrics))
        .with_state(state)
}
