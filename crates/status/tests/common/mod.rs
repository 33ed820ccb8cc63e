#![allow(dead_code)]

use std::collections::VecDeque;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use futures::{SinkExt, StreamExt};
use lectern_status::client::{BoxTransport, ChannelError, Connector};
use lectern_status::{ChannelConfig, ChannelEvent, ChannelStatus, JobStatusChannel};
use reqwest::Url;
use tokio::io::DuplexStream;
use tokio::sync::mpsc;
use tokio::time::Instant;
use tokio_tungstenite::tungstenite::protocol::Role;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::WebSocketStream;

/// The status server's end of an in-memory connection.
pub type ServerSocket = WebSocketStream<DuplexStream>;

/// What the mock connector does for one connection attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Step {
    /// Open an in-memory WebSocket and hand the server end to the test.
    Accept,
    /// Fail immediately, as if the connection were refused.
    Refuse,
    /// Never complete (exercises the connect timeout).
    Hang,
}

/// Connector that follows a scripted plan instead of touching the
/// network.
pub struct MockConnector {
    plan: Mutex<VecDeque<Step>>,
    fallback: Step,
    attempts: Mutex<Vec<(Instant, String)>>,
    servers: mpsc::UnboundedSender<ServerSocket>,
}

impl MockConnector {
    /// Follow `plan` for the first attempts, then `fallback` forever.
    pub fn new(
        plan: impl IntoIterator<Item = Step>,
        fallback: Step,
    ) -> (Arc<Self>, mpsc::UnboundedReceiver<ServerSocket>) {
        let (servers, rx) = mpsc::unbounded_channel();
        let connector = Arc::new(Self {
            plan: Mutex::new(plan.into_iter().collect()),
            fallback,
            attempts: Mutex::new(Vec::new()),
            servers,
        });
        (connector, rx)
    }

    /// When each attempt was made.
    pub fn attempt_times(&self) -> Vec<Instant> {
        self.attempts.lock().unwrap().iter().map(|(t, _)| *t).collect()
    }

    /// The URL each attempt targeted.
    pub fn attempt_urls(&self) -> Vec<String> {
        self.attempts.lock().unwrap().iter().map(|(_, u)| u.clone()).collect()
    }

    pub fn attempt_count(&self) -> usize {
        self.attempts.lock().unwrap().len()
    }
}

#[async_trait]
impl Connector for MockConnector {
    async fn connect(&self, url: &Url) -> Result<BoxTransport, ChannelError> {
        let step = {
            self.attempts
                .lock()
                .unwrap()
                .push((Instant::now(), url.to_string()));
            self.plan.lock().unwrap().pop_front().unwrap_or(self.fallback)
        };

        match step {
            Step::Refuse => Err(ChannelError::Connection("connection refused".into())),
            Step::Hang => std::future::pending().await,
            Step::Accept => {
                let (client_io, server_io) = tokio::io::duplex(64 * 1024);
                let client = WebSocketStream::from_raw_socket(client_io, Role::Client, None).await;
                let server = WebSocketStream::from_raw_socket(server_io, Role::Server, None).await;
                let _ = self.servers.send(server);
                Ok(Box::new(client))
            }
        }
    }
}

// ---------------------------------------------------------------------------
// Channel construction
// ---------------------------------------------------------------------------

pub const JOB_ID: &str = "abc123";

pub fn test_config() -> ChannelConfig {
    ChannelConfig {
        ws_base_url: "ws://status.test/ws/jobs".into(),
        ..Default::default()
    }
}

/// A channel for [`JOB_ID`] whose callbacks land in the returned
/// receiver.
pub fn test_channel(
    connector: Arc<MockConnector>,
    token: Option<&str>,
) -> (JobStatusChannel, mpsc::UnboundedReceiver<ChannelEvent>) {
    let (tx, rx) = mpsc::unbounded_channel();
    let channel =
        JobStatusChannel::with_connector(JOB_ID, token, test_config(), Arc::new(tx), connector)
            .unwrap();
    (channel, rx)
}

/// Like [`test_channel`], with explicit settings and no credential.
pub fn test_channel_with(
    connector: Arc<MockConnector>,
    config: ChannelConfig,
) -> (JobStatusChannel, mpsc::UnboundedReceiver<ChannelEvent>) {
    let (tx, rx) = mpsc::unbounded_channel();
    let channel =
        JobStatusChannel::with_connector(JOB_ID, None, config, Arc::new(tx), connector).unwrap();
    (channel, rx)
}

// ---------------------------------------------------------------------------
// Event helpers
// ---------------------------------------------------------------------------

/// Generous bound in virtual time; only reached when a test is broken.
const EVENT_TIMEOUT: Duration = Duration::from_secs(600);

pub async fn next_event(rx: &mut mpsc::UnboundedReceiver<ChannelEvent>) -> ChannelEvent {
    tokio::time::timeout(EVENT_TIMEOUT, rx.recv())
        .await
        .expect("timed out waiting for a channel event")
        .expect("event sender dropped")
}

/// Skip events until `status` is reported.
pub async fn wait_for_status(
    rx: &mut mpsc::UnboundedReceiver<ChannelEvent>,
    status: ChannelStatus,
) {
    loop {
        if next_event(rx).await == ChannelEvent::Status(status) {
            return;
        }
    }
}

/// Everything already delivered, without waiting.
pub fn drain(rx: &mut mpsc::UnboundedReceiver<ChannelEvent>) -> Vec<ChannelEvent> {
    let mut events = Vec::new();
    while let Ok(event) = rx.try_recv() {
        events.push(event);
    }
    events
}

pub async fn next_server(rx: &mut mpsc::UnboundedReceiver<ServerSocket>) -> ServerSocket {
    tokio::time::timeout(EVENT_TIMEOUT, rx.recv())
        .await
        .expect("timed out waiting for a connection")
        .expect("connector dropped")
}

pub async fn send_text(server: &mut ServerSocket, text: &str) {
    server.send(Message::Text(text.to_string())).await.unwrap();
}

/// Next frame the client sent that is not a transport-level ping/pong.
pub async fn next_client_frame(server: &mut ServerSocket) -> Message {
    loop {
        match server.next().await {
            Some(Ok(Message::Ping(_) | Message::Pong(_))) => continue,
            Some(Ok(msg)) => return msg,
            other => panic!("Expected a client frame, got {other:?}"),
        }
    }
}

/// Assert two durations agree to within a few milliseconds of timer
/// granularity.
pub fn assert_close(actual: Duration, expected: Duration) {
    let diff = if actual > expected {
        actual - expected
    } else {
        expected - actual
    };
    assert!(
        diff <= Duration::from_millis(5),
        "expected ~{expected:?}, got {actual:?}"
    );
}

pub fn progress_json(percent: u32) -> String {
    format!(
        r#"{{"type":"progress","job_id":"{JOB_ID}","progress":{{"stage":"transcription","percent":{percent},"message":"Transcribing"}}}}"#
    )
}
