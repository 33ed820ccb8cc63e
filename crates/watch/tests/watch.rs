//! End-to-end tests for `session::run` against a local WebSocket feed.

use std::future;
use std::net::SocketAddr;
use std::sync::Arc;

use futures::{SinkExt, StreamExt};
use lectern_status::api::StatusApi;
use lectern_status::{ChannelConfig, JobStatusChannel};
use lectern_watch::session::{self, WatchOutcome};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpListener;
use tokio::sync::mpsc;
use tokio_tungstenite::tungstenite::protocol::frame::coding::CloseCode;
use tokio_tungstenite::tungstenite::protocol::CloseFrame;
use tokio_tungstenite::tungstenite::Message;

const JOB_ID: &str = "abc123";

/// Accept one WebSocket client, send `frames`, optionally close
/// normally, then drain until the client goes away.
async fn feed(frames: Vec<String>, close: bool) -> SocketAddr {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();

    tokio::spawn(async move {
        let (socket, _) = listener.accept().await.unwrap();
        let mut ws = tokio_tungstenite::accept_async(socket).await.unwrap();
        for frame in frames {
            ws.send(Message::Text(frame)).await.unwrap();
        }
        if close {
            ws.send(Message::Close(Some(CloseFrame {
                code: CloseCode::Normal,
                reason: "job stream ended".into(),
            })))
            .await
            .ok();
        }
        while let Some(Ok(_)) = ws.next().await {}
    });

    addr
}

/// One-shot HTTP responder for the job-status endpoint.
async fn api_once(body: &'static str) -> StatusApi {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let base = format!("http://{}/api", listener.local_addr().unwrap());

    tokio::spawn(async move {
        let (mut socket, _) = listener.accept().await.unwrap();
        let mut request = Vec::new();
        let mut buf = [0u8; 1024];
        while !request.windows(4).any(|w| w == b"\r\n\r\n") {
            let n = socket.read(&mut buf).await.unwrap();
            if n == 0 {
                break;
            }
            request.extend_from_slice(&buf[..n]);
        }
        let response = format!(
            "HTTP/1.1 200 OK\r\nContent-Type: application/json\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{body}",
            body.len()
        );
        socket.write_all(response.as_bytes()).await.unwrap();
        socket.shutdown().await.ok();
    });

    StatusApi::with_client(reqwest_client(), base)
}

/// Talk to local responders directly, whatever proxy the environment
/// configures.
fn reqwest_client() -> reqwest::Client {
    reqwest::Client::builder().no_proxy().build().unwrap()
}

fn unreachable_api() -> StatusApi {
    StatusApi::with_client(reqwest_client(), "http://127.0.0.1:9/api")
}

fn channel_for(
    addr: SocketAddr,
) -> (
    JobStatusChannel,
    mpsc::UnboundedReceiver<lectern_status::ChannelEvent>,
) {
    let config = ChannelConfig {
        ws_base_url: format!("ws://{addr}/ws/jobs"),
        ..ChannelConfig::default()
    };
    let (tx, rx) = mpsc::unbounded_channel();
    let channel = JobStatusChannel::new(JOB_ID, config, Arc::new(tx)).unwrap();
    (channel, rx)
}

fn progress(percent: u32) -> String {
    serde_json::json!({
        "type": "progress",
        "job_id": JOB_ID,
        "progress": {"stage": "transcription", "percent": percent, "message": "Transcribing"},
    })
    .to_string()
}

// ---------------------------------------------------------------------------
// Test: progress lines are printed and completion ends the watch
// ---------------------------------------------------------------------------

#[tokio::test]
async fn watch_until_completed() {
    let complete = serde_json::json!({"type": "complete", "job_id": JOB_ID}).to_string();
    let addr = feed(vec![progress(50), complete], false).await;
    let (channel, events) = channel_for(addr);

    let mut out = Vec::new();
    let api = unreachable_api();
    let outcome = session::run(channel, events, &api, &mut out, future::pending()).await;

    assert_eq!(outcome, WatchOutcome::Completed);
    let out = String::from_utf8(out).unwrap();
    assert!(out.contains("Connected to job updates"));
    assert!(out.contains("[ 50%] transcription - Transcribing"));
    assert!(out.contains("Job abc123 completed"));
}

// ---------------------------------------------------------------------------
// Test: a job failure ends the watch with its message
// ---------------------------------------------------------------------------

#[tokio::test]
async fn watch_until_failed() {
    let error = serde_json::json!({"type": "error", "job_id": JOB_ID, "error": "bad codec"})
        .to_string();
    let addr = feed(vec![error], false).await;
    let (channel, events) = channel_for(addr);

    let mut out = Vec::new();
    let api = unreachable_api();
    let outcome = session::run(channel, events, &api, &mut out, future::pending()).await;

    assert_eq!(outcome, WatchOutcome::JobFailed("bad codec".into()));
    assert!(String::from_utf8(out)
        .unwrap()
        .contains("Job abc123 failed: bad codec"));
}

// ---------------------------------------------------------------------------
// Test: a normal close without a verdict is resolved through the API
// ---------------------------------------------------------------------------

#[tokio::test]
async fn closed_feed_reconciles_with_api() {
    let addr = feed(vec![progress(90)], true).await;
    let (channel, events) = channel_for(addr);

    let api = api_once(r#"{"job_id":"abc123","status":"completed"}"#).await;
    let mut out = Vec::new();
    let outcome = session::run(channel, events, &api, &mut out, future::pending()).await;

    assert_eq!(outcome, WatchOutcome::Completed);
    assert!(String::from_utf8(out)
        .unwrap()
        .contains("Job abc123 is completed"));
}

// ---------------------------------------------------------------------------
// Test: shutdown interrupts the watch
// ---------------------------------------------------------------------------

#[tokio::test]
async fn shutdown_interrupts() {
    let addr = feed(vec![], false).await;
    let (channel, events) = channel_for(addr);

    let mut out = Vec::new();
    let api = unreachable_api();
    let outcome = session::run(channel, events, &api, &mut out, future::ready(())).await;

    assert_eq!(outcome, WatchOutcome::Interrupted);
    assert_eq!(outcome.exit_code(), 130);
}
