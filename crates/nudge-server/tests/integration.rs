//! End-to-end tests over real HTTP: SSE streams read with `reqwest`.

use std::pin::Pin;
use std::time::Duration;

use axum::body::Bytes;
use futures::{Stream, StreamExt};
use nudge_core::{DeliveryPolicy, SessionId};
use nudge_server::metrics::detached_handle;
use nudge_server::{NudgeServer, ServerConfig};
use serde_json::{Value, json};
use tokio::time::timeout;

const TIMEOUT: Duration = Duration::from_secs(5);

type ByteStream = Pin<Box<dyn Stream<Item = reqwest::Result<Bytes>> + Send>>;

/// Minimal SSE reader: yields `(event, data)` pairs, skipping comments.
struct SseClient {
    body: ByteStream,
    buf: String,
}

impl SseClient {
    async fn open(base: &str, session_id: &str) -> Self {
        Self::open_with(reqwest::Client::new().get(format!("{base}/stream?sessionId={session_id}"))).await
    }

    async fn open_with(request: reqwest::RequestBuilder) -> Self {
        let resp = request.send().await.unwrap();
        assert_eq!(resp.status(), 200);
        let content_type = resp.headers()["content-type"].to_str().unwrap().to_owned();
        assert!(content_type.starts_with("text/event-stream"));
        Self {
            body: Box::pin(resp.bytes_stream()),
            buf: String::new(),
        }
    }

    async fn next_event(&mut self) -> Option<(String, Value)> {
        loop {
            if let Some(pos) = self.buf.find("\n\n") {
                let block: String = self.buf.drain(..pos + 2).collect();
                let mut event = None;
                let mut data = String::new();
                for line in block.lines() {
                    if let Some(v) = line.strip_prefix("event:") {
                        event = Some(v.trim().to_owned());
                    } else if let Some(v) = line.strip_prefix("data:") {
                        data.push_str(v.trim_start());
                    }
                }
                if let Some(event) = event {
                    return Some((event, serde_json::from_str(&data).unwrap()));
                }
                continue;
            }
            let chunk = self.body.next().await?.ok()?;
            self.buf.push_str(&String::from_utf8_lossy(&chunk));
        }
    }

    async fn expect_event(&mut self) -> (String, Value) {
        timeout(TIMEOUT, self.next_event())
            .await
            .expect("timed out waiting for event")
            .expect("stream ended")
    }
}

async fn boot(config: ServerConfig) -> (String, NudgeServer) {
    let server = NudgeServer::new(config, detached_handle());
    let (addr, _handle) = server.listen().await.unwrap();
    (format!("http://{addr}"), server)
}

async fn boot_default() -> (String, NudgeServer) {
    boot(ServerConfig {
        keep_alive_secs: 1,
        ..ServerConfig::default()
    })
    .await
}

async fn trigger(base: &str, session_id: &str, content: &str) -> Value {
    reqwest::Client::new()
        .post(format!("{base}/sessions/{session_id}/push"))
        .json(&json!({ "content": content }))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap()
}

async fn wait_until(mut cond: impl FnMut() -> bool) {
    timeout(TIMEOUT, async {
        while !cond() {
            tokio::time::sleep(Duration::from_millis(25)).await;
        }
    })
    .await
    .expect("condition not reached");
}

fn sid(s: &str) -> SessionId {
    SessionId::parse(s).unwrap()
}

#[tokio::test]
async fn first_frame_is_connected() {
    let (base, _server) = boot_default().await;
    let mut client = SseClient::open(&base, "abc").await;

    let (event, data) = client.expect_event().await;
    assert_eq!(event, "connected");
    assert_eq!(data["type"], "connected");
    assert_eq!(data["sessionId"], "abc");
    assert!(data["channelId"].as_str().unwrap().starts_with("chan_"));
}

#[tokio::test]
async fn triggered_push_reaches_stream() {
    let (base, _server) = boot_default().await;
    let mut client = SseClient::open(&base, "abc").await;
    let _ = client.expect_event().await;

    let resp = trigger(&base, "abc", "Remember to log your blood pressure").await;
    assert_eq!(resp["outcome"], "delivered");

    let (event, data) = client.expect_event().await;
    assert_eq!(event, "push");
    assert_eq!(data["content"], "Remember to log your blood pressure");
    assert_eq!(data["kind"], "nudge");
    assert_eq!(data["sessionId"], "abc");
}

#[tokio::test]
async fn push_to_unknown_session_is_dropped() {
    let (base, server) = boot_default().await;
    let mut other = SseClient::open(&base, "abc").await;
    let _ = other.expect_event().await;

    let resp = trigger(&base, "zzz", "hello").await;
    assert_eq!(resp["outcome"], "dropped");
    assert_eq!(resp["reason"], "no_channel");
    assert!(!server.dispatcher().store().contains(&sid("zzz")));

    // Nothing leaks onto another session's stream.
    let marker = trigger(&base, "abc", "marker").await;
    assert_eq!(marker["outcome"], "delivered");
    let (_, data) = other.expect_event().await;
    assert_eq!(data["content"], "marker");
}

#[tokio::test]
async fn push_after_disconnect_is_dropped() {
    let (base, server) = boot_default().await;
    let mut client = SseClient::open(&base, "abc").await;
    let _ = client.expect_event().await;
    assert!(server.dispatcher().registry().contains(&sid("abc")));

    drop(client);
    let registry = server.dispatcher().registry().clone();
    wait_until(|| !registry.contains(&sid("abc"))).await;

    let resp = trigger(&base, "abc", "x").await;
    assert_eq!(resp["outcome"], "dropped");
    assert!(server.dispatcher().store().contains(&sid("abc")));
}

#[tokio::test]
async fn reconnect_replaces_and_stale_detach_is_ignored() {
    let (base, server) = boot_default().await;
    let mut first = SseClient::open(&base, "abc").await;
    let (_, first_ack) = first.expect_event().await;
    let mut second = SseClient::open(&base, "abc").await;
    let (_, second_ack) = second.expect_event().await;
    assert_ne!(first_ack["channelId"], second_ack["channelId"]);
    assert_eq!(first_ack["sessionId"], second_ack["sessionId"]);

    drop(first);
    // Give the first connection's teardown time to run.
    tokio::time::sleep(Duration::from_millis(2500)).await;

    assert!(server.dispatcher().registry().contains(&sid("abc")));
    let resp = trigger(&base, "abc", "still here").await;
    assert_eq!(resp["outcome"], "delivered");
    let (_, data) = second.expect_event().await;
    assert_eq!(data["content"], "still here");
}

#[tokio::test]
async fn missing_session_id_is_rejected() {
    let (base, _server) = boot_default().await;
    let resp = reqwest::get(format!("{base}/stream")).await.unwrap();
    assert_eq!(resp.status(), 400);
    let body: Value = resp.json().await.unwrap();
    assert_eq!(body["error"]["code"], "INVALID_SESSION_ID");
}

#[tokio::test]
async fn identity_headers_are_recorded() {
    let (base, server) = boot_default().await;
    let request = reqwest::Client::new()
        .get(format!("{base}/stream?sessionId=me"))
        .header("x-user-id", "u_7")
        .header("x-user-name", "Lin");
    let mut client = SseClient::open_with(request).await;
    let _ = client.expect_event().await;

    let session = server.dispatcher().store().get(&sid("me")).unwrap();
    assert_eq!(session.user_id, "u_7");
    assert_eq!(session.display_name.as_deref(), Some("Lin"));
}

#[tokio::test]
async fn backlog_is_flushed_on_reconnect() {
    let (base, server) = boot(ServerConfig {
        keep_alive_secs: 1,
        delivery: DeliveryPolicy::Backlog { capacity: 2 },
        ..ServerConfig::default()
    })
    .await;

    let mut client = SseClient::open(&base, "abc").await;
    let _ = client.expect_event().await;
    drop(client);
    let registry = server.dispatcher().registry().clone();
    wait_until(|| !registry.contains(&sid("abc"))).await;

    for content in ["one", "two", "three"] {
        let resp = trigger(&base, "abc", content).await;
        assert_eq!(resp["outcome"], "queued");
    }
    assert_eq!(server.dispatcher().pending(&sid("abc")), 2);

    let mut client = SseClient::open(&base, "abc").await;
    let (event, _) = client.expect_event().await;
    assert_eq!(event, "connected");
    let (_, a) = client.expect_event().await;
    let (_, b) = client.expect_event().await;
    assert_eq!(a["content"], "two");
    assert_eq!(b["content"], "three");
}

#[tokio::test]
async fn shutdown_closes_open_streams() {
    let (base, server) = boot_default().await;
    let mut client = SseClient::open(&base, "abc").await;
    let _ = client.expect_event().await;

    server.shutdown().shutdown();
    let end = timeout(TIMEOUT, client.next_event()).await.unwrap();
    assert!(end.is_none());
    assert!(server.dispatcher().registry().is_empty());
}

#[tokio::test]
async fn health_reports_live_streams() {
    let (base, _server) = boot_default().await;
    let mut client = SseClient::open(&base, "abc").await;
    let _ = client.expect_event().await;

    let health: Value = reqwest::get(format!("{base}/health"))
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(health["status"], "ok");
    assert_eq!(health["connections"], 1);
    assert_eq!(health["known_sessions"], 1);
}
