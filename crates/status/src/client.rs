//! WebSocket transport for the job-status channel.
//!
//! [`Connector`] is the seam between the channel's state machine and
//! the network: [`WsConnector`] opens real connections through
//! `tokio-tungstenite`, while tests plug in in-memory transports.
//! [`status_url`] builds the per-job endpoint.

use async_trait::async_trait;
use futures::{Sink, Stream};
use reqwest::Url;
use tokio_tungstenite::connect_async;
use tokio_tungstenite::tungstenite::{Error as WsError, Message};

/// A bidirectional WebSocket message stream.
///
/// Blanket-implemented for any `Stream + Sink` of tungstenite messages,
/// so both `WebSocketStream<MaybeTlsStream<TcpStream>>` and in-memory
/// streams qualify.
pub trait Transport:
    Stream<Item = Result<Message, WsError>> + Sink<Message, Error = WsError> + Send + Unpin
{
}

impl<T> Transport for T where
    T: Stream<Item = Result<Message, WsError>> + Sink<Message, Error = WsError> + Send + Unpin
{
}

/// Owned, type-erased transport handed to the channel.
pub type BoxTransport = Box<dyn Transport>;

/// Opens transports to the status server.
#[async_trait]
pub trait Connector: Send + Sync {
    /// Establish one connection to `url`.
    async fn connect(&self, url: &Url) -> Result<BoxTransport, ChannelError>;
}

/// Default connector backed by [`tokio_tungstenite::connect_async`].
#[derive(Debug, Default, Clone, Copy)]
pub struct WsConnector;

#[async_trait]
impl Connector for WsConnector {
    async fn connect(&self, url: &Url) -> Result<BoxTransport, ChannelError> {
        let (ws_stream, _response) = connect_async(url.as_str()).await.map_err(|e| {
            ChannelError::Connection(format!(
                "Failed to connect to status server at {}: {e}",
                redacted(url)
            ))
        })?;

        tracing::debug!(url = %redacted(url), "WebSocket handshake complete");
        Ok(Box::new(ws_stream))
    }
}

/// Build the WebSocket URL for one job.
///
/// The job id is appended to `base` as a single (percent-encoded) path
/// segment; a credential, when present, is sent as `?token=...`.
pub fn status_url(base: &str, job_id: &str, token: Option<&str>) -> Result<Url, ChannelError> {
    let mut url = Url::parse(base).map_err(|e| ChannelError::InvalidUrl(format!("{base}: {e}")))?;

    if !matches!(url.scheme(), "ws" | "wss") {
        return Err(ChannelError::InvalidUrl(format!(
            "{base}: expected a ws:// or wss:// URL"
        )));
    }

    url.path_segments_mut()
        .map_err(|_| ChannelError::InvalidUrl(format!("{base}: cannot be a base URL")))?
        .pop_if_empty()
        .push(job_id);

    if let Some(token) = token {
        url.query_pairs_mut().append_pair("token", token);
    }

    Ok(url)
}

/// Render a URL for logs with the credential masked.
pub fn redacted(url: &Url) -> String {
    let mut masked = url.clone();
    if masked.query_pairs().any(|(k, _)| k == "token") {
        let pairs: Vec<(String, String)> = url
            .query_pairs()
            .map(|(k, v)| {
                let v = if k == "token" { "***".to_string() } else { v.into_owned() };
                (k.into_owned(), v)
            })
            .collect();
        masked.query_pairs_mut().clear().extend_pairs(pairs);
    }
    masked.to_string()
}

/// Errors raised while establishing or using a transport.
///
/// These never reach the caller directly: the channel turns them into
/// a fault and applies the reconnect policy.
#[derive(Debug, thiserror::Error)]
pub enum ChannelError {
    /// Failed to establish the WebSocket connection.
    #[error("Connection error: {0}")]
    Connection(String),

    /// A protocol-level error on an already-established connection.
    #[error("Protocol error: {0}")]
    Protocol(String),

    /// The connection did not open within the configured window.
    #[error("Connection attempt timed out after {0:?}")]
    Timeout(std::time::Duration),

    /// The configured endpoint cannot carry a job id.
    #[error("Invalid status URL: {0}")]
    InvalidUrl(String),
}

impl From<WsError> for ChannelError {
    fn from(e: WsError) -> Self {
        ChannelError::Protocol(e.to_string())
    }
}
