//! Change-feed WebSocket handler.
//!
//! Responsibilities:
//! - Authenticate the ticket before upgrading
//! - Forward every presence-table notice as a `presence/change` frame
//! - Collapse missed notices (lag) into one payload-less hint
//! - Lifecycle: ping interval, idle timeout, close on drain

use axum::{
    extract::{ws::Message, ws::WebSocket, ws::WebSocketUpgrade, Query, State},
    response::{IntoResponse, Response},
};
use futures_util::{SinkExt, StreamExt};
use serde::Deserialize;
use tokio::sync::broadcast::error::RecvError;
use tokio::time::{Duration, Instant};

use watchman_core::protocol::ChangeNotice;

use crate::api::ApiError;
use crate::app_state::AppState;
use crate::context::Identity;
use crate::transport::codec::{change_frame, decode, sys_authed_json, sys_error_json, Inbound};

#[derive(Debug, Deserialize)]
pub struct FeedQuery {
    pub ticket: String,
}

pub async fn feed_upgrade(
    State(app): State<AppState>,
    ws: WebSocketUpgrade,
    Query(q): Query<FeedQuery>,
) -> Response {
    let who = match app.resolve_ticket(&q.ticket) {
        Ok(who) => who,
        Err(e) => {
            app.metrics().auth_failures.inc(&[("surface", "ws")]);
            return ApiError(e).into_response();
        }
    };
    app.metrics().feed_upgrades.inc(&[]);

    ws.on_upgrade(move |socket| async move {
        let user = who.user_id.clone();
        app.metrics().feed_sessions.inc(&[]);
        run_feed(&app, who, socket).await;
        app.metrics().feed_sessions.dec(&[]);
        tracing::debug!(user = %user, "feed session closed");
    })
}

async fn run_feed(app: &AppState, who: Identity, socket: WebSocket) {
    // Subscribe before sending `authed` so nothing between the two is missed.
    let mut notices = app.table().subscribe();
    let (mut ws_tx, mut ws_rx) = socket.split();

    if ws_tx
        .send(Message::Text(sys_authed_json(&who.user_id, &who.display_name)))
        .await
        .is_err()
    {
        return;
    }

    let gw = &app.cfg().gateway;
    let idle_timeout = Duration::from_millis(gw.idle_timeout_ms);
    let mut ping_tick = tokio::time::interval(Duration::from_millis(gw.ping_interval_ms));
    ping_tick.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

    let mut last_activity = Instant::now();
    let mut seq: u64 = 0;
    let drained = app.drained();
    tokio::pin!(drained);

    loop {
        let outbound = tokio::select! {
            notice = notices.recv() => {
                let notice = match notice {
                    Ok(n) => n,
                    Err(RecvError::Lagged(missed)) => {
                        app.metrics().feed_lagged.inc(&[]);
                        tracing::debug!(user = %who.user_id, missed, "feed subscriber lagged");
                        ChangeNotice::hint()
                    }
                    Err(RecvError::Closed) => break,
                };
                seq += 1;
                match change_frame(seq, &notice) {
                    Ok(s) => Message::Text(s),
                    Err(e) => {
                        tracing::warn!(error = %e, "dropping unencodable notice");
                        continue;
                    }
                }
            }

            incoming = ws_rx.next() => {
                let Some(Ok(msg)) = incoming else { break; };
                last_activity = Instant::now();

                match decode(msg) {
                    Ok(Inbound::Ping(payload)) => Message::Pong(payload),
                    Ok(Inbound::Close) => break,
                    Ok(Inbound::Pong) => continue,
                    Ok(Inbound::Text(env)) => {
                        tracing::trace!(svc = %env.svc, msg_type = %env.msg_type, "ignoring client frame");
                        continue;
                    }
                    Ok(Inbound::Binary(len)) => {
                        tracing::trace!(len, "ignoring binary frame");
                        continue;
                    }
                    Err(e) => Message::Text(sys_error_json(e.client_code().as_str(), &e.to_string())),
                }
            }

            _ = ping_tick.tick() => Message::Ping(Vec::new()),

            _ = &mut drained => {
                tracing::debug!(user = %who.user_id, "closing feed, gateway draining");
                break;
            }

            _ = tokio::time::sleep_until(last_activity + idle_timeout) => {
                let _ = ws_tx.send(Message::Text(sys_error_json("TIMEOUT", "idle timeout"))).await;
                break;
            }
        };

        if ws_tx.send(outbound).await.is_err() {
            break;
        }
    }

    let _ = ws_tx.close().await;
}
