//! Self-healing live feed of progress events for one job.
//!
//! [`JobStatusChannel`] owns the connection lifecycle for a single job:
//! it spawns one task that connects, runs the session loop, and on an
//! abnormal close backs off and reconnects, up to the configured retry
//! budget. Everything the caller needs to know arrives through the
//! [`StatusHandler`] given at construction.
//!
//! ```text
//! idle -> connecting -> open -> closed
//!             ^           |
//!             |           v
//!             +------- faulted --(retries exhausted)--> closed
//! ```

use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use std::time::Duration;

use lectern_core::types::JobId;
use reqwest::Url;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::client::{redacted, status_url, BoxTransport, ChannelError, Connector, WsConnector};
use crate::config::ChannelConfig;
use crate::events::{ChannelStatus, StatusFailure, StatusHandler};
use crate::processor::{run_session, SessionEnd};

/// How long `disconnect` waits for the task to close cleanly before
/// aborting it.
const SHUTDOWN_TIMEOUT: Duration = Duration::from_secs(5);

/// Client-side subscription to one job's progress events.
///
/// At most one transport is live per channel. Dropping the channel has
/// the same effect as [`disconnect`](Self::disconnect) without waiting.
pub struct JobStatusChannel {
    shared: Arc<Shared>,
    url: Url,
    config: ChannelConfig,
    connector: Arc<dyn Connector>,
    /// Intentional-close flag. Replaced by every public `connect`.
    cancel: CancellationToken,
    task: Option<JoinHandle<()>>,
}

/// State visible to both the caller's handle and the connection task.
struct Shared {
    job_id: JobId,
    handler: Arc<dyn StatusHandler>,
    status: watch::Sender<ChannelStatus>,
    /// Reconnection attempts since the last successful open.
    retries: AtomicU32,
}

impl Shared {
    fn transition(&self, status: ChannelStatus) {
        let previous = self.status.send_replace(status);
        tracing::debug!(job_id = %self.job_id, from = %previous, to = %status, "Channel status");
        self.handler.on_status_change(status);
    }
}

impl JobStatusChannel {
    /// Create a channel for `job_id` using the default WebSocket
    /// connector.
    ///
    /// Fails only if `config.ws_base_url` cannot carry a job id.
    pub fn new(
        job_id: impl Into<JobId>,
        config: ChannelConfig,
        handler: Arc<dyn StatusHandler>,
    ) -> Result<Self, ChannelError> {
        Self::with_connector(job_id, None, config, handler, Arc::new(WsConnector))
    }

    /// Create a channel with an optional bearer credential and a custom
    /// transport connector.
    pub fn with_connector(
        job_id: impl Into<JobId>,
        token: Option<&str>,
        config: ChannelConfig,
        handler: Arc<dyn StatusHandler>,
        connector: Arc<dyn Connector>,
    ) -> Result<Self, ChannelError> {
        let job_id = job_id.into();
        let url = status_url(&config.ws_base_url, &job_id, token)?;
        let (status, _) = watch::channel(ChannelStatus::Idle);

        Ok(Self {
            shared: Arc::new(Shared {
                job_id,
                handler,
                status,
                retries: AtomicU32::new(0),
            }),
            url,
            config,
            connector,
            cancel: CancellationToken::new(),
            task: None,
        })
    }

    /// Attach a bearer credential, sent as the `token` query parameter.
    pub fn with_token(mut self, token: &str) -> Result<Self, ChannelError> {
        self.url = status_url(&self.config.ws_base_url, &self.shared.job_id, Some(token))?;
        Ok(self)
    }

    /// The job this channel follows.
    pub fn job_id(&self) -> &str {
        &self.shared.job_id
    }

    /// Start (or restart) the subscription.
    ///
    /// Clears the intentional-close flag, resets the retry budget, and
    /// spawns the connection task. Must be called from within a Tokio
    /// runtime. Calling it while a connection task is still live is a
    /// no-op.
    pub fn connect(&mut self) {
        if let Some(task) = &self.task {
            if !task.is_finished() {
                tracing::warn!(job_id = %self.shared.job_id, "connect() called on a live channel; ignoring");
                return;
            }
        }

        self.cancel = CancellationToken::new();
        self.shared.retries.store(0, Ordering::SeqCst);
        self.shared.status.send_replace(ChannelStatus::Connecting);

        tracing::info!(
            job_id = %self.shared.job_id,
            url = %redacted(&self.url),
            "Connecting to job status feed",
        );

        let task = ConnectionTask {
            shared: Arc::clone(&self.shared),
            url: self.url.clone(),
            config: self.config.clone(),
            connector: Arc::clone(&self.connector),
            cancel: self.cancel.clone(),
        };
        self.task = Some(tokio::spawn(task.run()));
    }

    /// Tear the subscription down.
    ///
    /// Sets the intentional-close flag, cancels any pending retry and
    /// the keep-alive, and closes the transport with code 1000. No
    /// callback fires after this returns. Safe to call repeatedly.
    pub async fn disconnect(&mut self) {
        self.cancel.cancel();

        match self.task.take() {
            Some(mut task) => {
                if tokio::time::timeout(SHUTDOWN_TIMEOUT, &mut task).await.is_err() {
                    tracing::warn!(job_id = %self.shared.job_id, "Channel task did not stop in time; aborting");
                    task.abort();
                    if *self.shared.status.borrow() != ChannelStatus::Closed {
                        self.shared.transition(ChannelStatus::Closed);
                    }
                }
            }
            None => {
                if *self.shared.status.borrow() != ChannelStatus::Closed {
                    self.shared.transition(ChannelStatus::Closed);
                }
            }
        }
    }

    /// Current connection state.
    pub fn status(&self) -> ChannelStatus {
        *self.shared.status.borrow()
    }

    /// Subscribe to connection-state changes.
    pub fn watch_status(&self) -> watch::Receiver<ChannelStatus> {
        self.shared.status.subscribe()
    }

    /// Reconnection attempts made since the last successful open.
    pub fn retry_count(&self) -> u32 {
        self.shared.retries.load(Ordering::SeqCst)
    }
}

impl Drop for JobStatusChannel {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}

/// Outcome of one connection attempt.
enum Opened {
    Transport(BoxTransport),
    Failed(ChannelError),
    Cancelled,
}

/// The spawned half of a channel: connect -> session -> backoff loop.
struct ConnectionTask {
    shared: Arc<Shared>,
    url: Url,
    config: ChannelConfig,
    connector: Arc<dyn Connector>,
    cancel: CancellationToken,
}

impl ConnectionTask {
    async fn run(self) {
        let job_id = self.shared.job_id.clone();

        loop {
            if self.cancel.is_cancelled() {
                break;
            }
            self.shared.transition(ChannelStatus::Connecting);

            let reason = match self.open().await {
                Opened::Cancelled => break,
                Opened::Failed(e) => {
                    tracing::warn!(job_id = %job_id, error = %e, "Connection attempt failed");
                    e.to_string()
                }
                Opened::Transport(transport) => {
                    self.shared.retries.store(0, Ordering::SeqCst);
                    self.shared.transition(ChannelStatus::Open);
                    tracing::info!(job_id = %job_id, "Job status feed open");

                    let end = run_session(
                        transport,
                        &job_id,
                        self.shared.handler.as_ref(),
                        self.config.heartbeat_interval,
                        &self.cancel,
                    )
                    .await;

                    match end {
                        SessionEnd::Completed | SessionEnd::ClosedNormally => {
                            // No retry after a clean finish.
                            self.cancel.cancel();
                            break;
                        }
                        SessionEnd::Cancelled => break,
                        SessionEnd::Faulted(reason) => reason,
                    }
                }
            };

            if self.cancel.is_cancelled() {
                break;
            }
            self.shared.transition(ChannelStatus::Faulted);

            let attempts = self.shared.retries.load(Ordering::SeqCst);
            if !self.config.reconnect.should_retry(attempts) {
                tracing::error!(
                    job_id = %job_id,
                    attempts,
                    reason = %reason,
                    "Reconnection attempts exhausted",
                );
                self.shared
                    .handler
                    .on_error(&StatusFailure::RetriesExhausted { attempts });
                break;
            }

            let attempt = attempts + 1;
            self.shared.retries.store(attempt, Ordering::SeqCst);
            let delay = self.config.reconnect.next_delay(attempt);
            tracing::info!(
                job_id = %job_id,
                attempt,
                delay_ms = delay.as_millis() as u64,
                reason = %reason,
                "Scheduling reconnect",
            );

            tokio::select! {
                biased;
                _ = self.cancel.cancelled() => break,
                _ = tokio::time::sleep(delay) => {}
            }
        }

        self.shared.transition(ChannelStatus::Closed);
        tracing::info!(job_id = %job_id, "Job status feed closed");
    }

    /// One connection attempt, bounded by the connect timeout and
    /// abandoned on cancellation.
    async fn open(&self) -> Opened {
        let connect = self.connector.connect(&self.url);
        let limit = self.config.connect_timeout;

        let result = tokio::select! {
            biased;
            _ = self.cancel.cancelled() => return Opened::Cancelled,
            result = async {
                if limit.is_zero() {
                    connect.await
                } else {
                    tokio::time::timeout(limit, connect)
                        .await
                        .unwrap_or(Err(ChannelError::Timeout(limit)))
                }
            } => result,
        };

        match result {
            Ok(transport) => Opened::Transport(transport),
            Err(e) => Opened::Failed(e),
        }
    }
}
