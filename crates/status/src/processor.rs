//! WebSocket session loop for one open connection.
//!
//! Reads frames from the status server, parses them into typed
//! [`InboundMessage`] variants, dispatches them to the channel's
//! [`StatusHandler`], and sends keep-alive pings on a timer. Returns a
//! [`SessionEnd`] describing why the session stopped so the channel can
//! decide between a clean close and the reconnect path.

use std::time::Duration;

use futures::{SinkExt, StreamExt};
use lectern_core::job_events::CLOSE_CODE_NORMAL;
use tokio_tungstenite::tungstenite::protocol::frame::coding::CloseCode;
use tokio_tungstenite::tungstenite::protocol::CloseFrame;
use tokio_tungstenite::tungstenite::Message;
use tokio_util::sync::CancellationToken;

use crate::client::BoxTransport;
use crate::events::{StatusFailure, StatusHandler};
use crate::heartbeat::{keepalive_ticker, ping_frame};
use crate::messages::{parse_message, InboundMessage, JobEvent};

/// Upper bound on sending our own close frame.
const CLOSE_SEND_TIMEOUT: Duration = Duration::from_secs(2);

/// Why a session stopped.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionEnd {
    /// The job completed; the channel closes for good.
    Completed,
    /// The server closed with code 1000.
    ClosedNormally,
    /// The caller tore the channel down.
    Cancelled,
    /// Transport error or abnormal close. Eligible for retry.
    Faulted(String),
}

/// What the session should do after one text frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Dispatch {
    Continue,
    Complete,
}

/// Drive one open connection until it ends.
///
/// The keep-alive ticker lives only as long as this call, so leaving
/// the session (for any reason) stops the heartbeat.
pub async fn run_session(
    transport: BoxTransport,
    job_id: &str,
    handler: &dyn StatusHandler,
    heartbeat_interval: Duration,
    cancel: &CancellationToken,
) -> SessionEnd {
    let (mut sink, mut stream) = transport.split();
    let mut ticker = keepalive_ticker(heartbeat_interval);

    let end = loop {
        tokio::select! {
            biased;
            _ = cancel.cancelled() => break SessionEnd::Cancelled,
            msg = stream.next() => {
                match msg {
                    Some(Ok(Message::Text(text))) => {
                        if handle_text_message(&text, job_id, handler) == Dispatch::Complete {
                            break SessionEnd::Completed;
                        }
                    }
                    Some(Ok(Message::Binary(_))) => {
                        tracing::trace!(job_id, "Ignoring binary frame");
                    }
                    Some(Ok(Message::Ping(_) | Message::Pong(_))) => {
                        // Handled automatically by tungstenite.
                    }
                    Some(Ok(Message::Close(frame))) => {
                        tracing::info!(job_id, ?frame, "Status server closed WebSocket");
                        break classify_close(frame.as_ref());
                    }
                    Some(Ok(Message::Frame(_))) => {}
                    Some(Err(e)) => {
                        tracing::warn!(job_id, error = %e, "WebSocket receive error");
                        break SessionEnd::Faulted(e.to_string());
                    }
                    None => {
                        break SessionEnd::Faulted("connection dropped without a close frame".into());
                    }
                }
            }
            _ = ticker.tick() => {
                let frame = match ping_frame() {
                    Ok(frame) => frame,
                    Err(e) => {
                        tracing::error!(job_id, error = %e, "Failed to encode keep-alive");
                        continue;
                    }
                };
                tracing::trace!(job_id, "Sending keep-alive ping");
                if let Err(e) = sink.send(frame).await {
                    tracing::warn!(job_id, error = %e, "Failed to send keep-alive");
                    break SessionEnd::Faulted(e.to_string());
                }
            }
        }
    };

    if matches!(end, SessionEnd::Completed | SessionEnd::Cancelled) {
        let close = Message::Close(Some(CloseFrame {
            code: CloseCode::Normal,
            reason: "".into(),
        }));
        match tokio::time::timeout(CLOSE_SEND_TIMEOUT, sink.send(close)).await {
            Ok(Ok(())) => tracing::debug!(job_id, "Sent normal close"),
            Ok(Err(e)) => tracing::debug!(job_id, error = %e, "Close frame not delivered"),
            Err(_) => tracing::debug!(job_id, "Timed out sending close frame"),
        }
    }

    end
}

fn classify_close(frame: Option<&CloseFrame<'_>>) -> SessionEnd {
    match frame {
        Some(frame) if u16::from(frame.code) == CLOSE_CODE_NORMAL => SessionEnd::ClosedNormally,
        Some(frame) => SessionEnd::Faulted(format!(
            "closed with code {}: {}",
            u16::from(frame.code),
            frame.reason
        )),
        None => SessionEnd::Faulted("closed without a status code".into()),
    }
}

/// Dispatch a single text frame to the handler.
///
/// Malformed, unrecognized, and foreign-job messages are logged and
/// dropped; they never change the session's state.
pub fn handle_text_message(text: &str, job_id: &str, handler: &dyn StatusHandler) -> Dispatch {
    let msg = match parse_message(text) {
        Ok(msg) => msg,
        Err(e) => {
            tracing::warn!(
                job_id,
                error = %e,
                raw_message = %text,
                "Failed to parse job-status message",
            );
            return Dispatch::Continue;
        }
    };

    match msg {
        InboundMessage::Progress(event) => {
            if !is_for_job(&event, job_id) {
                return Dispatch::Continue;
            }
            match &event.progress {
                Some(progress) => {
                    tracing::debug!(
                        job_id,
                        stage = %progress.stage,
                        percent = progress.percent,
                        "Job progress",
                    );
                    handler.on_progress(&event.job_id, progress);
                }
                None => {
                    tracing::warn!(job_id, "Progress event without a progress payload");
                }
            }
            Dispatch::Continue
        }
        InboundMessage::Complete(event) => {
            if !is_for_job(&event, job_id) {
                return Dispatch::Continue;
            }
            tracing::info!(job_id, "Job completed");
            handler.on_complete(&event);
            Dispatch::Complete
        }
        InboundMessage::Error(event) => {
            if !is_for_job(&event, job_id) {
                return Dispatch::Continue;
            }
            let message = event
                .error
                .clone()
                .unwrap_or_else(|| "Unknown error".to_string());
            tracing::warn!(job_id, error = %message, "Job reported failure");
            handler.on_error(&StatusFailure::JobFailed {
                job_id: event.job_id,
                message,
            });
            Dispatch::Continue
        }
        InboundMessage::Unknown => {
            tracing::debug!(job_id, raw_message = %text, "Ignoring unrecognized message type");
            Dispatch::Continue
        }
    }
}

fn is_for_job(event: &JobEvent, job_id: &str) -> bool {
    if event.job_id == job_id {
        return true;
    }
    tracing::warn!(
        job_id,
        event_job_id = %event.job_id,
        "Dropping event addressed to a different job",
    );
    false
}
