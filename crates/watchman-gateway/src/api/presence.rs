use std::time::Instant;

use axum::{
    extract::{Path, Query, State},
    http::{HeaderMap, StatusCode},
    Json,
};

use serde::Deserialize;

use watchman_core::error::WatchmanError;
use watchman_core::protocol::{ActiveResponse, PresenceRow};

use super::ApiResult;
use crate::app_state::AppState;
use crate::context::auth::authenticate;

#[derive(Debug, Default, Deserialize)]
pub struct WriteQuery {
    #[serde(default)]
    pub seq: Option<u64>,
}

fn outcome<T>(res: &Result<T, WatchmanError>) -> &'static str {
    match res {
        Ok(_) => "ok",
        Err(WatchmanError::Stale(_)) => "stale",
        Err(_) => "error",
    }
}

pub async fn heartbeat(
    State(app): State<AppState>,
    headers: HeaderMap,
    Path(user_id): Path<String>,
    Query(q): Query<WriteQuery>,
) -> ApiResult<StatusCode> {
    let who = authenticate(&app, &headers, "http")?;
    who.ensure_owner(&user_id)?;

    let table = app.table();
    let res = match q.seq {
        Some(seq) => table.upsert(&user_id, seq, crate::presence::now()),
        None => table.heartbeat(&user_id),
    };
    app.metrics()
        .presence_writes
        .inc(&[("op", "upsert"), ("outcome", outcome(&res))]);
    if let Err(WatchmanError::Stale(ref why)) = res {
        tracing::debug!(user = %user_id, %why, "stale heartbeat dropped");
    }
    let kind = res?;

    tracing::debug!(user = %user_id, seq = ?q.seq, kind = kind.as_str(), "heartbeat");
    Ok(StatusCode::NO_CONTENT)
}

pub async fn leave(
    State(app): State<AppState>,
    headers: HeaderMap,
    Path(user_id): Path<String>,
    Query(q): Query<WriteQuery>,
) -> ApiResult<StatusCode> {
    let who = authenticate(&app, &headers, "http")?;
    who.ensure_owner(&user_id)?;

    let table = app.table();
    let res = match q.seq {
        Some(seq) => table.delete_seq(&user_id, seq),
        None => Ok(table.delete(&user_id)),
    };
    app.metrics()
        .presence_writes
        .inc(&[("op", "delete"), ("outcome", outcome(&res))]);
    let existed = res?;

    tracing::debug!(user = %user_id, seq = ?q.seq, existed, "leave");
    Ok(StatusCode::NO_CONTENT)
}

pub async fn list_all(State(app): State<AppState>, headers: HeaderMap) -> ApiResult<Json<Vec<PresenceRow>>> {
    authenticate(&app, &headers, "http")?;
    let started = Instant::now();

    let now = crate::presence::now();
    let rows = app
        .table()
        .query_all()
        .iter()
        .map(|r| PresenceRow::from_record(r, now))
        .collect();

    let m = app.metrics();
    m.presence_queries.inc(&[("scope", "all")]);
    m.query_duration.observe(&[("scope", "all")], started.elapsed());
    Ok(Json(rows))
}

pub async fn list_active(State(app): State<AppState>, headers: HeaderMap) -> ApiResult<Json<ActiveResponse>> {
    authenticate(&app, &headers, "http")?;
    let started = Instant::now();

    let now = crate::presence::now();
    let members: Vec<PresenceRow> = app
        .table()
        .active(now)
        .iter()
        .map(|r| PresenceRow::from_record(r, now))
        .collect();

    let m = app.metrics();
    m.presence_queries.inc(&[("scope", "active")]);
    m.query_duration.observe(&[("scope", "active")], started.elapsed());
    Ok(Json(ActiveResponse {
        count: members.len(),
        members,
    }))
}
