#![allow(clippy::unwrap_used)]
#![allow(clippy::expect_used)]
#![allow(clippy::panic)]

use std::net::SocketAddr;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use futures_util::StreamExt;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tokio_tungstenite::tungstenite::Message as WsMessage;

use watchman_client::{PresenceBackend, RemoteBackend, RemoteConfig, SessionState, Watchman, WriteClock};
use watchman_core::protocol::ChangeKind;
use watchman_core::{LivenessPolicy, WatchmanError};
use watchman_gateway::app_state::AppState;
use watchman_gateway::{config, server};

const CONFIG: &str = r#"
version: 1
users:
  - { id: "u-ana", display_name: "Ana", ticket: "t-ana" }
  - { id: "u-ben", display_name: "Ben", ticket: "t-ben" }
  - { id: "u-cy", ticket: "t-cy" }
"#;

struct Gateway {
    addr: SocketAddr,
    base: String,
    state: AppState,
    stop: Option<oneshot::Sender<()>>,
    task: JoinHandle<watchman_core::Result<()>>,
}

impl Gateway {
    /// Graceful stop; returns once the listener is closed.
    async fn stop(mut self) {
        if let Some(stop) = self.stop.take() {
            let _ = stop.send(());
        }
        tokio::time::timeout(Duration::from_secs(5), &mut self.task)
            .await
            .expect("gateway stopped in time")
            .unwrap()
            .unwrap();
    }
}

async fn gateway() -> Gateway {
    gateway_with(CONFIG, "127.0.0.1:0".parse().unwrap()).await
}

async fn gateway_with(cfg: &str, addr: SocketAddr) -> Gateway {
    let state = AppState::new(config::load_from_str(cfg).unwrap()).unwrap();
    let listener = TcpListener::bind(addr).await.unwrap();
    let addr = listener.local_addr().unwrap();
    let (stop, stopped) = oneshot::channel::<()>();
    let task = tokio::spawn(server::serve(listener, state.clone(), async move {
        let _ = stopped.await;
    }));
    Gateway {
        addr,
        base: format!("http://{addr}"),
        state,
        stop: Some(stop),
        task,
    }
}

fn backend(gw: &Gateway, ticket: &str) -> RemoteBackend {
    RemoteBackend::new(RemoteConfig::new(gw.base.clone(), ticket)).unwrap()
}

async fn eventually(what: &str, mut ok: impl FnMut() -> bool) {
    let wait = async {
        while !ok() {
            tokio::time::sleep(Duration::from_millis(20)).await;
        }
    };
    tokio::time::timeout(Duration::from_secs(5), wait)
        .await
        .unwrap_or_else(|_| panic!("timed out waiting for {what}"));
}

/// TCP relay that holds every chunk starting with `PUT ` for `hold_ms`
/// before passing it on, so a request can outlive its client-side timeout.
struct HoldingRelay {
    addr: SocketAddr,
    hold_ms: Arc<AtomicU64>,
}

async fn holding_relay(upstream: SocketAddr) -> HoldingRelay {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let hold_ms = Arc::new(AtomicU64::new(0));
    let hold = Arc::clone(&hold_ms);
    tokio::spawn(async move {
        while let Ok((client, _)) = listener.accept().await {
            tokio::spawn(relay(client, upstream, Arc::clone(&hold)));
        }
    });
    HoldingRelay { addr, hold_ms }
}

async fn relay(client: TcpStream, upstream: SocketAddr, hold: Arc<AtomicU64>) -> std::io::Result<()> {
    let server = TcpStream::connect(upstream).await?;
    let (mut client_rx, mut client_tx) = client.into_split();
    let (mut server_rx, mut server_tx) = server.into_split();
    let down = tokio::spawn(async move { tokio::io::copy(&mut server_rx, &mut client_tx).await });

    let mut buf = vec![0u8; 16 * 1024];
    loop {
        let n = client_rx.read(&mut buf).await?;
        if n == 0 {
            break;
        }
        let held = hold.load(Ordering::SeqCst);
        if held > 0 && buf[..n].starts_with(b"PUT ") {
            tokio::time::sleep(Duration::from_millis(held)).await;
        }
        server_tx.write_all(&buf[..n]).await?;
    }
    // Keep the upstream open until the gateway has answered.
    let _ = down.await;
    Ok(())
}

#[tokio::test]
async fn upsert_and_query_join_display_names() {
    let gw = gateway().await;
    let ana = backend(&gw, "t-ana");
    let cy = backend(&gw, "t-cy");
    let clock = WriteClock::new();

    ana.upsert_one("u-ana", clock.next()).await.unwrap();
    cy.upsert_one("u-cy", clock.next()).await.unwrap();
    ana.upsert_one("u-ana", clock.next()).await.unwrap();

    let rows = ana.query_all().await.unwrap();
    assert_eq!(rows.len(), 2);
    assert_eq!(rows[0].user_id, "u-ana", "newest heartbeat first");
    assert_eq!(rows[0].display_name, "Ana");
    assert_eq!(rows[1].display_name, "Watcher");
    assert_eq!(gw.state.table().len(), 2);
}

#[tokio::test]
async fn writing_another_users_row_is_rejected() {
    let gw = gateway().await;
    let ana = backend(&gw, "t-ana");

    let err = ana.upsert_one("u-ben", 1).await.unwrap_err();
    assert!(matches!(err, WatchmanError::NotAllowed(_)), "{err}");
    let err = ana.delete_one("u-ben", 2).await.unwrap_err();
    assert!(matches!(err, WatchmanError::NotAllowed(_)), "{err}");
    assert!(gw.state.table().is_empty());
}

#[tokio::test]
async fn unknown_ticket_fails_auth_on_http_and_feed() {
    let gw = gateway().await;
    let nobody = backend(&gw, "t-nobody");

    let err = nobody.upsert_one("u-ana", 1).await.unwrap_err();
    assert!(matches!(err, WatchmanError::AuthFailed), "{err}");

    let err = nobody.subscribe().await.err().expect("subscribe must fail");
    assert!(matches!(err, WatchmanError::AuthFailed), "{err}");
}

#[tokio::test]
async fn delete_is_idempotent() {
    let gw = gateway().await;
    let ana = backend(&gw, "t-ana");
    let clock = WriteClock::new();

    ana.upsert_one("u-ana", clock.next()).await.unwrap();
    ana.delete_one("u-ana", clock.next()).await.unwrap();
    ana.delete_one("u-ana", clock.next()).await.unwrap();

    assert!(ana.query_all().await.unwrap().is_empty());
}

#[tokio::test]
async fn stale_write_is_rejected_with_its_code() {
    let gw = gateway().await;
    let ana = backend(&gw, "t-ana");

    ana.upsert_one("u-ana", 10).await.unwrap();
    ana.delete_one("u-ana", 20).await.unwrap();

    let err = ana.upsert_one("u-ana", 15).await.unwrap_err();
    assert!(matches!(err, WatchmanError::Stale(_)), "{err}");
    assert!(gw.state.table().is_empty());

    ana.upsert_one("u-ana", 21).await.unwrap();
    assert_eq!(gw.state.table().len(), 1);
}

#[tokio::test]
async fn feed_delivers_change_notices() {
    let gw = gateway().await;
    let ana = backend(&gw, "t-ana");
    let mut feed = ana.subscribe().await.unwrap();

    gw.state.table().heartbeat("u-ben").unwrap();
    let notice = tokio::time::timeout(Duration::from_secs(5), feed.next())
        .await
        .expect("notice in time")
        .expect("feed open");
    assert_eq!(notice.kind, ChangeKind::Insert);

    gw.state.table().delete("u-ben");
    let notice = tokio::time::timeout(Duration::from_secs(5), feed.next())
        .await
        .expect("notice in time")
        .expect("feed open");
    assert_eq!(notice.kind, ChangeKind::Delete);
}

#[tokio::test]
async fn watchman_over_gateway_sees_other_members() {
    let gw = gateway().await;
    let policy = LivenessPolicy::default();

    let ana = Watchman::connect(Arc::new(backend(&gw, "t-ana")), "u-ana", policy)
        .await
        .unwrap();
    let ben = Watchman::connect(Arc::new(backend(&gw, "t-ben")), "u-ben", policy)
        .await
        .unwrap();

    ana.join().await.unwrap();
    assert_eq!(ana.state(), SessionState::Present);

    let mut rx = ana.watch();
    ben.join().await.unwrap();
    tokio::time::timeout(Duration::from_secs(5), rx.wait_for(|s| s.count() == 2))
        .await
        .expect("ana saw ben join")
        .unwrap();

    ben.leave().await;
    tokio::time::timeout(Duration::from_secs(5), rx.wait_for(|s| !s.contains("u-ben")))
        .await
        .expect("ana saw ben leave")
        .unwrap();
    assert_eq!(ana.count(), 1);

    ana.leave().await;
    assert!(gw.state.table().is_empty());
}

#[tokio::test]
async fn heartbeat_that_outlives_its_timeout_cannot_resurrect_row() {
    let gw = gateway().await;
    let relay = holding_relay(gw.addr).await;

    let mut cfg = RemoteConfig::new(format!("http://{}", relay.addr), "t-ana");
    cfg.request_timeout = Duration::from_secs(1);
    let policy = LivenessPolicy::new(Duration::from_secs(5), Duration::from_secs(1)).unwrap();
    let ana = Watchman::connect(Arc::new(RemoteBackend::new(cfg).unwrap()), "u-ana", policy)
        .await
        .unwrap();
    ana.join().await.unwrap();
    assert_eq!(gw.state.table().len(), 1);

    // The t=1s heartbeat times out on our side at t=2s and reaches the
    // gateway at t=3.5s, after the delete.
    relay.hold_ms.store(2_500, Ordering::SeqCst);
    tokio::time::sleep(Duration::from_millis(1_300)).await;
    ana.leave().await;
    assert!(gw.state.table().get("u-ana").is_none());

    tokio::time::sleep(Duration::from_secs(3)).await;
    assert!(gw.state.table().get("u-ana").is_none(), "late heartbeat brought the row back");
    let writes = &gw.state.metrics().presence_writes;
    assert_eq!(writes.get(&[("op", "upsert"), ("outcome", "stale")]), 1);
    assert_eq!(writes.get(&[("op", "delete"), ("outcome", "ok")]), 1);

    // Joining again stamps a newer write.
    relay.hold_ms.store(0, Ordering::SeqCst);
    ana.join().await.unwrap();
    assert!(gw.state.table().get("u-ana").is_some());
}

#[tokio::test]
async fn view_converges_after_gateway_restart() {
    let gw = gateway().await;
    let addr = gw.addr;

    let mut cfg = RemoteConfig::new(gw.base.clone(), "t-ana");
    cfg.reconnect_delay = Duration::from_millis(100);
    cfg.max_reconnect_delay = Duration::from_millis(400);
    let ana = Watchman::connect(Arc::new(RemoteBackend::new(cfg).unwrap()), "u-ana", LivenessPolicy::default())
        .await
        .unwrap();
    ana.join().await.unwrap();
    let mut rx = ana.watch();

    // Draining closes the feed; the restarted gateway starts empty.
    gw.stop().await;
    let gw = gateway_with(CONFIG, addr).await;
    // Written before ana resubscribes: only the reconnect hint reveals it.
    gw.state.table().heartbeat("u-ben").unwrap();

    tokio::time::timeout(Duration::from_secs(5), rx.wait_for(|s| s.contains("u-ben")))
        .await
        .expect("view caught up after reconnect")
        .unwrap();
    eventually("feed resubscribed", || gw.state.metrics().feed_sessions.get(&[]) == 1).await;
}

#[tokio::test]
async fn dropping_the_feed_closes_the_gateway_session() {
    let gw = gateway().await;
    let ana = backend(&gw, "t-ana");

    let feed = ana.subscribe().await.unwrap();
    eventually("feed session open", || gw.state.metrics().feed_sessions.get(&[]) == 1).await;

    drop(feed);
    eventually("feed session closed", || gw.state.metrics().feed_sessions.get(&[]) == 0).await;
    assert_eq!(gw.state.table().subscriber_count(), 0);
}

#[tokio::test]
async fn silent_feed_is_closed_after_idle_timeout() {
    const IDLE: &str = r#"
version: 1
gateway: { ping_interval_ms: 5000, idle_timeout_ms: 10000 }
users:
  - { id: "u-ana", ticket: "t-ana" }
"#;
    let gw = gateway_with(IDLE, "127.0.0.1:0".parse().unwrap()).await;
    let (mut ws, _) = tokio_tungstenite::connect_async(format!("ws://{}/v1/feed?ticket=t-ana", gw.addr))
        .await
        .unwrap();

    // Not reading means no pong goes back either.
    tokio::time::sleep(Duration::from_millis(10_500)).await;

    let mut texts = Vec::new();
    let drain = async {
        while let Some(Ok(msg)) = ws.next().await {
            match msg {
                WsMessage::Text(t) => texts.push(t.as_str().to_string()),
                WsMessage::Close(_) => break,
                _ => {}
            }
        }
    };
    tokio::time::timeout(Duration::from_secs(5), drain)
        .await
        .expect("gateway closed the feed");

    assert!(texts[0].contains("authed"), "{texts:?}");
    assert!(texts.iter().any(|t| t.contains("TIMEOUT") && t.contains("idle timeout")), "{texts:?}");
    eventually("feed session closed", || gw.state.metrics().feed_sessions.get(&[]) == 0).await;
}

#[test]
fn reconnect_backoff_doubles_up_to_the_cap() {
    let mut cfg = RemoteConfig::new("http://127.0.0.1:1", "t-ana");
    cfg.reconnect_delay = Duration::from_secs(1);
    cfg.max_reconnect_delay = Duration::from_secs(30);

    let delays: Vec<u64> = (0..7).map(|n| cfg.backoff(n).as_secs()).collect();
    assert_eq!(delays, [1, 2, 4, 8, 16, 30, 30]);
    assert_eq!(cfg.backoff(40), Duration::from_secs(30));
}

#[tokio::test]
async fn ops_endpoints_report_health_and_metrics() {
    let gw = gateway().await;
    let ana = backend(&gw, "t-ana");
    ana.upsert_one("u-ana", 1).await.unwrap();
    ana.query_all().await.unwrap();

    let http = reqwest::Client::new();
    let health = http.get(format!("{}/healthz", gw.base)).send().await.unwrap();
    assert_eq!(health.status(), reqwest::StatusCode::OK);

    let ready = http.get(format!("{}/readyz", gw.base)).send().await.unwrap();
    assert_eq!(ready.status(), reqwest::StatusCode::OK);
    assert!(ready.text().await.unwrap().starts_with("ready rows=1"));

    let body = http
        .get(format!("{}/metrics", gw.base))
        .send()
        .await
        .unwrap()
        .text()
        .await
        .unwrap();
    assert!(body.contains(r#"watchman_presence_writes_total{op="upsert",outcome="ok"} 1"#), "{body}");
    assert!(body.contains("watchman_presence_rows 1"), "{body}");

    gw.state.set_draining();
    let ready = http.get(format!("{}/readyz", gw.base)).send().await.unwrap();
    assert_eq!(ready.status(), reqwest::StatusCode::SERVICE_UNAVAILABLE);
}
