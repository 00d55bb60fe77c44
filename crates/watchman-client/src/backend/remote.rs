//! Backend over a Watchman gateway.
//!
//! HTTP (`reqwest`) for writes and queries; the change feed is a WebSocket
//! kept alive by a background task that reconnects with exponential backoff
//! and emits one hint after each reconnect (notices may have been missed).

use std::time::Duration;

use async_trait::async_trait;
use futures_util::StreamExt;
use reqwest::{StatusCode, Url};
use tokio::net::TcpStream;
use tokio::sync::mpsc;
use tokio_tungstenite::tungstenite::{self, Message as WsMessage};
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream};
use tracing::{debug, info, warn};

use watchman_core::error::{Result, WatchmanError};
use watchman_core::protocol::text::SVC_SYS;
use watchman_core::protocol::{ChangeNotice, Envelope, ErrorBody, PresenceRow};
use watchman_core::PresenceRecord;

use super::{ChangeFeed, PresenceBackend};

type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;

/// Notices buffered per feed before the reader waits on the consumer.
const FEED_BUFFER: usize = 256;

#[derive(Debug, Clone)]
pub struct RemoteConfig {
    /// Gateway base URL, e.g. `http://127.0.0.1:8080`.
    pub base_url: String,
    /// Login ticket sent as `Authorization: Bearer`.
    pub ticket: String,
    pub request_timeout: Duration,
    pub reconnect_delay: Duration,
    pub max_reconnect_delay: Duration,
}

impl RemoteConfig {
    pub fn new(base_url: impl Into<String>, ticket: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into(),
            ticket: ticket.into(),
            request_timeout: Duration::from_secs(5),
            reconnect_delay: Duration::from_secs(1),
            max_reconnect_delay: Duration::from_secs(30),
        }
    }

    /// Delay before reconnect attempt `attempt` (0-based): doubles from
    /// `reconnect_delay`, capped at `max_reconnect_delay`.
    pub fn backoff(&self, attempt: u32) -> Duration {
        let factor = 1u32.checked_shl(attempt).unwrap_or(u32::MAX);
        self.reconnect_delay
            .checked_mul(factor)
            .unwrap_or(self.max_reconnect_delay)
            .min(self.max_reconnect_delay)
    }
}

pub struct RemoteBackend {
    cfg: RemoteConfig,
    base: Url,
    http: reqwest::Client,
}

impl RemoteBackend {
    pub fn new(cfg: RemoteConfig) -> Result<Self> {
        let base = Url::parse(&cfg.base_url)
            .map_err(|e| WatchmanError::BadRequest(format!("invalid base_url: {e}")))?;
        if !matches!(base.scheme(), "http" | "https") {
            return Err(WatchmanError::BadRequest("base_url must be http(s)".into()));
        }
        let http = reqwest::Client::builder()
            .timeout(cfg.request_timeout)
            .build()
            .map_err(|e| WatchmanError::Internal(format!("http client build failed: {e}")))?;
        Ok(Self { cfg, base, http })
    }

    fn url(&self, segments: &[&str]) -> Result<Url> {
        let mut url = self.base.clone();
        url.path_segments_mut()
            .map_err(|_| WatchmanError::BadRequest("base_url cannot carry a path".into()))?
            .pop_if_empty()
            .extend(segments);
        Ok(url)
    }

    fn feed_url(&self) -> Result<Url> {
        let mut url = self.url(&["v1", "feed"])?;
        let scheme = if self.base.scheme() == "https" { "wss" } else { "ws" };
        url.set_scheme(scheme)
            .map_err(|_| WatchmanError::Internal("cannot derive feed url".into()))?;
        url.query_pairs_mut().append_pair("ticket", &self.cfg.ticket);
        Ok(url)
    }
}

fn map_http_err(e: reqwest::Error) -> WatchmanError {
    if e.is_timeout() {
        WatchmanError::Timeout
    } else {
        WatchmanError::Backend(e.to_string())
    }
}

/// Turn a non-2xx response into the gateway's error code.
async fn check(resp: reqwest::Response) -> Result<reqwest::Response> {
    let status = resp.status();
    if status.is_success() {
        return Ok(resp);
    }
    match resp.json::<ErrorBody>().await {
        Ok(body) => Err(WatchmanError::from_code(&body.error, body.message)),
        Err(_) if status == StatusCode::UNAUTHORIZED => Err(WatchmanError::AuthFailed),
        Err(_) => Err(WatchmanError::Backend(format!("gateway returned {status}"))),
    }
}

#[async_trait]
impl PresenceBackend for RemoteBackend {
    async fn upsert_one(&self, user_id: &str, seq: u64) -> Result<()> {
        let resp = self
            .http
            .put(self.url(&["v1", "presence", user_id])?)
            .query(&[("seq", seq)])
            .bearer_auth(&self.cfg.ticket)
            .send()
            .await
            .map_err(map_http_err)?;
        check(resp).await.map(|_| ())
    }

    async fn delete_one(&self, user_id: &str, seq: u64) -> Result<()> {
        let resp = self
            .http
            .delete(self.url(&["v1", "presence", user_id])?)
            .query(&[("seq", seq)])
            .bearer_auth(&self.cfg.ticket)
            .send()
            .await
            .map_err(map_http_err)?;
        check(resp).await.map(|_| ())
    }

    async fn query_all(&self) -> Result<Vec<PresenceRecord>> {
        let resp = self
            .http
            .get(self.url(&["v1", "presence"])?)
            .bearer_auth(&self.cfg.ticket)
            .send()
            .await
            .map_err(map_http_err)?;
        let rows: Vec<PresenceRow> = check(resp).await?.json().await.map_err(map_http_err)?;

        // Ages were measured at the gateway; rebase on our clock.
        let now = crate::now();
        Ok(rows.into_iter().map(|r| r.into_record(now)).collect())
    }

    async fn subscribe(&self) -> Result<ChangeFeed> {
        let url = self.feed_url()?;
        let first = connect_feed(&url, self.cfg.request_timeout).await?;

        let (tx, rx) = mpsc::channel(FEED_BUFFER);
        tokio::spawn(feed_loop(url, self.cfg.clone(), first, tx));
        Ok(ChangeFeed::from_channel(rx))
    }
}

/// Connect and wait for `sys/authed`: the gateway subscribes to the table
/// before sending it, so nothing after this point is missed.
async fn connect_feed(url: &Url, timeout: Duration) -> Result<WsStream> {
    let connect = async {
        let (mut ws, _) = tokio_tungstenite::connect_async(url.as_str())
            .await
            .map_err(|e| match e {
                tungstenite::Error::Http(resp) if resp.status() == StatusCode::UNAUTHORIZED => {
                    WatchmanError::AuthFailed
                }
                other => WatchmanError::Backend(format!("feed connect failed: {other}")),
            })?;

        while let Some(msg) = ws.next().await {
            let msg = msg.map_err(|e| WatchmanError::Backend(format!("feed read failed: {e}")))?;
            let WsMessage::Text(text) = msg else { continue };
            let env = Envelope::parse(text.as_str())?;
            if env.is(SVC_SYS, "authed") {
                return Ok(ws);
            }
            if env.is(SVC_SYS, "error") {
                return Err(WatchmanError::Backend(format!("feed rejected: {}", text.as_str())));
            }
        }
        Err(WatchmanError::Backend("feed closed before authed".into()))
    };

    tokio::time::timeout(timeout, connect)
        .await
        .map_err(|_| WatchmanError::Timeout)?
}

enum FeedEnd {
    ConsumerGone,
    Disconnected,
}

async fn feed_loop(url: Url, cfg: RemoteConfig, first: WsStream, tx: mpsc::Sender<ChangeNotice>) {
    let mut stream = Some(first);
    let mut attempt: u32 = 0;

    loop {
        if let Some(ws) = stream.take() {
            attempt = 0;
            if let FeedEnd::ConsumerGone = pump(ws, &tx).await {
                debug!("change feed dropped by consumer");
                return;
            }
        }
        if tx.is_closed() {
            return;
        }

        let delay = cfg.backoff(attempt);
        attempt = attempt.saturating_add(1);
        info!(delay_ms = delay.as_millis() as u64, attempt, "change feed reconnecting");
        tokio::select! {
            _ = tokio::time::sleep(delay) => {}
            _ = tx.closed() => return,
        }

        match connect_feed(&url, cfg.request_timeout).await {
            Ok(ws) => {
                info!("change feed reconnected");
                if tx.send(ChangeNotice::hint()).await.is_err() {
                    return;
                }
                stream = Some(ws);
            }
            Err(e) => warn!(error = %e, "change feed reconnect failed"),
        }
    }
}

async fn pump(mut ws: WsStream, tx: &mpsc::Sender<ChangeNotice>) -> FeedEnd {
    loop {
        let msg = tokio::select! {
            _ = tx.closed() => {
                let _ = ws.close(None).await;
                return FeedEnd::ConsumerGone;
            }
            msg = ws.next() => msg,
        };

        match msg {
            Some(Ok(WsMessage::Text(text))) => {
                let notice = Envelope::parse(text.as_str()).and_then(|env| {
                    if env.is(SVC_SYS, "error") {
                        warn!(frame = %text.as_str(), "gateway feed error");
                    }
                    env.change_notice()
                });
                match notice {
                    Ok(n) => {
                        if tx.send(n).await.is_err() {
                            return FeedEnd::ConsumerGone;
                        }
                    }
                    Err(e) => debug!(error = %e, "skipping non-change frame"),
                }
            }
            Some(Ok(WsMessage::Close(_))) | None => return FeedEnd::Disconnected,
            Some(Err(e)) => {
                warn!(error = %e, "change feed read failed");
                return FeedEnd::Disconnected;
            }
            // Pings are answered by tungstenite itself.
            Some(Ok(_)) => {}
        }
    }
}
