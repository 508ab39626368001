//! End-to-end relay tests against a real server and WebSocket clients.

use std::sync::Arc;
use std::time::Duration;

use futures::{SinkExt, StreamExt};
use metrics_exporter_prometheus::PrometheusBuilder;
use serde_json::{Value, json};
use tokio::time::timeout;
use tokio_tungstenite::connect_async;
use tokio_tungstenite::tungstenite::Message;

use parley_server::config::ServerConfig;
use parley_server::server::ParleyServer;

const TIMEOUT: Duration = Duration::from_secs(5);
const QUIET: Duration = Duration::from_millis(300);

type WsStream =
    tokio_tungstenite::WebSocketStream<tokio_tungstenite::MaybeTlsStream<tokio::net::TcpStream>>;

/// Boot a server on an ephemeral port; return its base address and handle.
async fn boot_with(config: ServerConfig) -> (String, Arc<ParleyServer>) {
    let metrics_handle = PrometheusBuilder::new().build_recorder().handle();
    let server = Arc::new(ParleyServer::new(config, metrics_handle));
    let (addr, _handle) = server.listen().await.unwrap();
    (addr.to_string(), server)
}

async fn boot() -> (String, Arc<ParleyServer>) {
    boot_with(ServerConfig::default()).await
}

/// A connected test peer.
struct Peer {
    ws: WsStream,
    id: String,
}

impl Peer {
    /// Connect and consume `IDENTITY_ASSIGNED`.
    async fn join(addr: &str, query: &str) -> Self {
        let (mut ws, _) = connect_async(format!("ws://{addr}/ws{query}")).await.unwrap();
        let first = read_json(&mut ws).await;
        assert_eq!(first["type"], "IDENTITY_ASSIGNED");
        let id = first["data"].as_str().unwrap().to_string();
        Self { ws, id }
    }

    async fn named(addr: &str, name: &str) -> Self {
        Self::join(addr, &format!("?username={name}")).await
    }

    async fn send(&mut self, value: &Value) {
        self.ws.send(Message::Text(value.to_string().into())).await.unwrap();
    }

    async fn send_raw(&mut self, text: &str) {
        self.ws.send(Message::Text(text.to_string().into())).await.unwrap();
    }

    async fn recv(&mut self) -> Value {
        read_json(&mut self.ws).await
    }

    /// Next roster, as `(id, displayName)` pairs.
    async fn roster(&mut self) -> Vec<(String, String)> {
        let frame = self.recv().await;
        assert_eq!(frame["type"], "ROSTER_UPDATE", "unexpected frame: {frame}");
        frame["data"]
            .as_array()
            .unwrap()
            .iter()
            .map(|e| {
                (
                    e["id"].as_str().unwrap().to_string(),
                    e["displayName"].as_str().unwrap().to_string(),
                )
            })
            .collect()
    }

    async fn roster_ids(&mut self) -> Vec<String> {
        self.roster().await.into_iter().map(|(id, _)| id).collect()
    }

    /// Assert no text frame arrives within a short window.
    async fn expect_silence(&mut self) {
        if let Ok(Some(Ok(Message::Text(text)))) = timeout(QUIET, self.ws.next()).await {
            panic!("expected no frame, got {text}");
        }
    }
}

/// Read the next text frame as JSON, skipping control frames.
async fn read_json(ws: &mut WsStream) -> Value {
    loop {
        let msg = timeout(TIMEOUT, ws.next())
            .await
            .expect("timed out waiting for frame")
            .expect("stream ended")
            .expect("read error");
        match msg {
            Message::Text(text) => return serde_json::from_str(text.as_str()).unwrap(),
            Message::Ping(_) | Message::Pong(_) => {}
            other => panic!("unexpected frame: {other:?}"),
        }
    }
}

fn chat_to(to: &str, content: &str) -> Value {
    json!({
        "type": "CHAT_MESSAGE",
        "data": {"to": to, "timestamp": "2024-01-01T00:00:00Z", "content": content}
    })
}

#[tokio::test]
async fn three_peers_roster_and_directed_message() {
    let (addr, server) = boot().await;

    let mut a = Peer::named(&addr, "Ann").await;
    assert_eq!(a.roster().await, [(a.id.clone(), "Ann".to_string())]);

    let mut b = Peer::named(&addr, "Bob").await;
    assert_eq!(b.roster_ids().await, [a.id.clone(), b.id.clone()]);
    assert_eq!(a.roster_ids().await, [a.id.clone(), b.id.clone()]);

    let mut c = Peer::named(&addr, "Cat").await;
    let abc = vec![a.id.clone(), b.id.clone(), c.id.clone()];
    assert_eq!(c.roster_ids().await, abc);
    assert_eq!(a.roster_ids().await, abc);
    assert_eq!(b.roster_ids().await, abc);
    assert_eq!(server.registry().len(), 3);

    a.send(&chat_to(&c.id, "hi")).await;
    let relayed = c.recv().await;
    assert_eq!(
        relayed,
        json!({
            "type": "CHAT_MESSAGE",
            "data": {"from": a.id, "timestamp": "2024-01-01T00:00:00Z", "content": "hi"}
        })
    );
    b.expect_silence().await;
    a.expect_silence().await;
}

#[tokio::test]
async fn disconnect_shrinks_roster_and_later_messages_drop() {
    let (addr, server) = boot().await;

    let mut a = Peer::named(&addr, "Ann").await;
    let _ = a.roster().await;
    let mut b = Peer::named(&addr, "Bob").await;
    let _ = b.roster().await;
    let _ = a.roster().await;
    let mut c = Peer::named(&addr, "Cat").await;
    let _ = c.roster().await;
    let _ = a.roster().await;
    let _ = b.roster().await;

    let b_id = b.id.clone();
    b.ws.close(None).await.unwrap();
    drop(b);

    let ac = vec![a.id.clone(), c.id.clone()];
    assert_eq!(a.roster_ids().await, ac);
    assert_eq!(c.roster_ids().await, ac);
    assert_eq!(server.registry().len(), 2);

    a.send(&chat_to(&b_id, "anyone there?")).await;
    a.expect_silence().await;
    c.expect_silence().await;

    // The sender is still served after the drop.
    a.send(&chat_to(&c.id, "still here")).await;
    assert_eq!(c.recv().await["data"]["content"], "still here");
}

#[tokio::test]
async fn malformed_frames_do_not_close_connection() {
    let (addr, _server) = boot().await;

    let mut a = Peer::named(&addr, "Ann").await;
    let _ = a.roster().await;
    let mut b = Peer::named(&addr, "Bob").await;
    let _ = b.roster().await;
    let _ = a.roster().await;

    a.send_raw("not json").await;
    a.send_raw("[1,2,3]").await;
    a.send_raw(r#"{"type":"CHAT_MESSAGE","data":{"to":"x"}}"#).await;
    a.send(&json!({"type": "TYPING", "data": {}})).await;
    a.send(&chat_to(&b.id, "after the noise")).await;

    let relayed = b.recv().await;
    assert_eq!(relayed["data"]["from"], a.id.as_str());
    assert_eq!(relayed["data"]["content"], "after the noise");
}

#[tokio::test]
async fn legacy_message_kind_is_relayed() {
    let (addr, _server) = boot().await;

    let mut a = Peer::named(&addr, "Ann").await;
    let _ = a.roster().await;
    let mut b = Peer::named(&addr, "Bob").await;
    let _ = b.roster().await;

    a.send(&json!({
        "type": "MESSAGE",
        "data": {"to": b.id, "timestamp": "t", "content": {"type": "TEXT", "data": "yo"}}
    }))
    .await;

    let relayed = b.recv().await;
    assert_eq!(relayed["type"], "CHAT_MESSAGE");
    assert_eq!(relayed["data"]["content"]["data"], "yo");
}

#[tokio::test]
async fn missing_username_defaults_to_anonymous() {
    let (addr, _server) = boot().await;

    let mut a = Peer::join(&addr, "").await;
    assert_eq!(a.roster().await, [(a.id.clone(), "Anonymous".to_string())]);
}

#[tokio::test]
async fn root_path_accepts_upgrades() {
    let (addr, _server) = boot().await;

    let (mut ws, _) = connect_async(format!("ws://{addr}/?username=Root")).await.unwrap();
    assert_eq!(read_json(&mut ws).await["type"], "IDENTITY_ASSIGNED");
    let roster = read_json(&mut ws).await;
    assert_eq!(roster["data"][0]["displayName"], "Root");
}

#[tokio::test]
async fn binary_frame_closes_connection() {
    let (addr, server) = boot().await;

    let mut a = Peer::named(&addr, "Ann").await;
    let _ = a.roster().await;
    let mut b = Peer::named(&addr, "Bob").await;
    let _ = b.roster().await;
    let _ = a.roster().await;

    b.ws.send(Message::Binary(vec![1, 2, 3].into())).await.unwrap();

    assert_eq!(a.roster_ids().await, [a.id.clone()]);
    assert_eq!(server.registry().len(), 1);
}

#[tokio::test]
async fn upgrades_beyond_limit_are_refused() {
    let config = ServerConfig {
        max_connections: 1,
        ..ServerConfig::default()
    };
    let (addr, _server) = boot_with(config).await;

    let _a = Peer::named(&addr, "Ann").await;
    let second = connect_async(format!("ws://{addr}/ws?username=Bob")).await;
    assert!(second.is_err());
}

#[tokio::test]
async fn health_reports_live_connections() {
    let (addr, _server) = boot().await;

    let mut a = Peer::named(&addr, "Ann").await;
    let _ = a.roster().await;

    let body: Value = reqwest::get(format!("http://{addr}/health"))
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(body["status"], "ok");
    assert_eq!(body["connections"], 1);
}

#[tokio::test]
async fn shutdown_closes_open_connections() {
    let (addr, server) = boot().await;

    let mut a = Peer::named(&addr, "Ann").await;
    let _ = a.roster().await;

    server.shutdown().shutdown();

    let ended = timeout(TIMEOUT, async {
        loop {
            match a.ws.next().await {
                None | Some(Err(_) | Ok(Message::Close(_))) => break,
                Some(Ok(_)) => {}
            }
        }
    })
    .await;
    assert!(ended.is_ok());
    assert!(server.registry().is_empty());
}

#[tokio::test]
async fn silent_peer_is_evicted_by_heartbeat() {
    let config = ServerConfig {
        heartbeat_interval_ms: 50,
        heartbeat_timeout_ms: 100,
        ..ServerConfig::default()
    };
    let (addr, server) = boot_with(config).await;

    let mut a = Peer::named(&addr, "Ann").await;
    let _ = a.roster().await;
    assert_eq!(server.registry().len(), 1);

    // Never poll the client socket, so the server's pings go unanswered.
    tokio::time::sleep(Duration::from_millis(600)).await;
    assert!(server.registry().is_empty());
}

#[tokio::test]
async fn graceful_shutdown_drains_connection_tasks() {
    let metrics_handle = PrometheusBuilder::new().build_recorder().handle();
    let server = ParleyServer::new(ServerConfig::default(), metrics_handle);
    let (addr, serve) = server.listen().await.unwrap();
    let addr = addr.to_string();

    let mut a = Peer::named(&addr, "Ann").await;
    let _ = a.roster().await;
    let mut b = Peer::named(&addr, "Bob").await;
    let _ = b.roster().await;
    let _ = a.roster().await;
    assert_eq!(server.shutdown().active_connections(), 2);

    server
        .shutdown()
        .graceful_shutdown(vec![serve], Some(TIMEOUT))
        .await;

    assert!(server.registry().is_empty());
    assert_eq!(server.shutdown().active_connections(), 0);

    // The drained peer was sent a Close frame rather than dropped.
    let closed = timeout(TIMEOUT, async {
        loop {
            match a.ws.next().await {
                Some(Ok(Message::Close(_))) => return true,
                None | Some(Err(_)) => return false,
                Some(Ok(_)) => {}
            }
        }
    })
    .await
    .unwrap();
    assert!(closed);
}

#[tokio::test]
async fn stalled_reader_is_evicted_without_blocking_others() {
    let config = ServerConfig {
        send_timeout_ms: 200,
        outbound_queue: 4096,
        ..ServerConfig::default()
    };
    let (addr, server) = boot_with(config).await;

    let mut a = Peer::named(&addr, "Ann").await;
    let _ = a.roster().await;
    let mut b = Peer::named(&addr, "Bob").await;
    let _ = b.roster().await;
    let _ = a.roster().await;

    // Reads its identity, then never polls the socket again.
    let stalled = Peer::named(&addr, "Stalled").await;
    let ab_stalled = vec![a.id.clone(), b.id.clone(), stalled.id.clone()];
    assert_eq!(a.roster_ids().await, ab_stalled);
    assert_eq!(b.roster_ids().await, ab_stalled);

    // Far more than the socket buffers hold, far less than the queue.
    let bulk = "x".repeat(64 * 1024);
    for _ in 0..400 {
        a.send(&chat_to(&stalled.id, &bulk)).await;
    }
    a.send(&chat_to(&b.id, "not held up")).await;

    let mut saw_chat = false;
    let mut saw_eviction = false;
    while !(saw_chat && saw_eviction) {
        let frame = b.recv().await;
        match frame["type"].as_str() {
            Some("CHAT_MESSAGE") => {
                assert_eq!(frame["data"]["content"], "not held up");
                saw_chat = true;
            }
            Some("ROSTER_UPDATE") => {
                let ids: Vec<_> = frame["data"]
                    .as_array()
                    .unwrap()
                    .iter()
                    .map(|e| e["id"].as_str().unwrap().to_string())
                    .collect();
                assert_eq!(ids, [a.id.clone(), b.id.clone()]);
                saw_eviction = true;
            }
            other => panic!("unexpected frame type {other:?}"),
        }
    }

    assert_eq!(a.roster_ids().await, [a.id.clone(), b.id.clone()]);
    assert_eq!(server.registry().len(), 2);
    drop(stalled);
}
