//! Watchman gateway binary.
//!
//! - `PUT/DELETE /v1/presence/:user_id`, `GET /v1/presence[/active]`
//! - WebSocket change feed: /v1/feed?ticket=...
//! - Config from `$WATCHMAN_CONFIG` (default `watchman.yaml`)

use std::net::SocketAddr;
use std::process::ExitCode;

use tracing_subscriber::{fmt, EnvFilter};

use watchman_gateway::{app_state, config, server};

#[tokio::main]
async fn main() -> ExitCode {
    fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    match run().await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            tracing::error!(error = %e, "watchman-gateway failed");
            ExitCode::FAILURE
        }
    }
}

async fn run() -> watchman_core::Result<()> {
    let cfg = config::load_from_env()?;
    let listen: SocketAddr = cfg.gateway.listen.parse().map_err(|e| {
        watchman_core::WatchmanError::BadRequest(format!("gateway.listen must be a valid SocketAddr: {e}"))
    })?;

    let state = app_state::AppState::new(cfg)?;

    tracing::info!(%listen, "watchman-gateway starting");
    let listener = tokio::net::TcpListener::bind(listen)
        .await
        .map_err(|e| watchman_core::WatchmanError::Internal(format!("bind {listen} failed: {e}")))?;

    server::serve(listener, state, server::shutdown_signal()).await
}
