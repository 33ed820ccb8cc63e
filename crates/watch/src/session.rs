//! Watch loop: follows one job's channel until it reaches an end state.
//!
//! Channel events arrive over an mpsc receiver. [`Watcher`] decides
//! what each one means for the watch (keep going, reconcile through the
//! REST API after a reconnect, or stop), and [`run`] drives the channel
//! and prints what happens.

use std::future::Future;
use std::io::Write;

use lectern_status::api::{JobSnapshot, StatusApi};
use lectern_status::{ChannelEvent, ChannelStatus, JobStatusChannel, StatusFailure};
use tokio::sync::mpsc;

use crate::render;

/// How a watch ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WatchOutcome {
    Completed,
    JobFailed(String),
    /// The channel gave up reconnecting.
    ConnectionLost,
    /// The server closed the feed without reporting an outcome.
    Closed,
    Interrupted,
}

impl WatchOutcome {
    pub fn exit_code(&self) -> u8 {
        match self {
            WatchOutcome::Completed => 0,
            WatchOutcome::JobFailed(_) | WatchOutcome::ConnectionLost | WatchOutcome::Closed => 1,
            WatchOutcome::Interrupted => 130,
        }
    }
}

/// What to do after one event.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Step {
    Continue,
    /// The feed re-opened after a fault; events may have been missed.
    Reconcile,
    Finish(WatchOutcome),
}

/// Tracks whether the feed has faulted since it was last open.
#[derive(Debug, Default)]
pub struct Watcher {
    faulted: bool,
}

impl Watcher {
    pub fn handle(&mut self, event: &ChannelEvent) -> Step {
        match event {
            ChannelEvent::Progress { .. } => Step::Continue,
            ChannelEvent::Completed(_) => Step::Finish(WatchOutcome::Completed),
            ChannelEvent::Failed(StatusFailure::JobFailed { message, .. }) => {
                Step::Finish(WatchOutcome::JobFailed(message.clone()))
            }
            ChannelEvent::Failed(StatusFailure::RetriesExhausted { .. }) => {
                Step::Finish(WatchOutcome::ConnectionLost)
            }
            ChannelEvent::Status(ChannelStatus::Faulted) => {
                self.faulted = true;
                Step::Continue
            }
            ChannelEvent::Status(ChannelStatus::Open) if self.faulted => {
                self.faulted = false;
                Step::Reconcile
            }
            ChannelEvent::Status(ChannelStatus::Closed) => Step::Finish(WatchOutcome::Closed),
            ChannelEvent::Status(_) => Step::Continue,
        }
    }
}

/// The end state a snapshot implies, if it is terminal.
pub fn outcome_from_snapshot(snapshot: &JobSnapshot) -> Option<WatchOutcome> {
    if snapshot.is_completed() {
        Some(WatchOutcome::Completed)
    } else if snapshot.is_failed() {
        Some(WatchOutcome::JobFailed(
            snapshot
                .error
                .clone()
                .unwrap_or_else(|| snapshot.status.clone()),
        ))
    } else {
        None
    }
}

/// Connect `channel`, print its events to `out`, and return once the
/// job reaches an end state or `shutdown` resolves.
///
/// `events` must be the receiver whose sender is the channel's handler.
pub async fn run<W, F>(
    mut channel: JobStatusChannel,
    mut events: mpsc::UnboundedReceiver<ChannelEvent>,
    api: &StatusApi,
    out: &mut W,
    shutdown: F,
) -> WatchOutcome
where
    W: Write,
    F: Future<Output = ()>,
{
    tokio::pin!(shutdown);
    let mut watcher = Watcher::default();
    channel.connect();

    let outcome = loop {
        let event = tokio::select! {
            _ = &mut shutdown => break WatchOutcome::Interrupted,
            event = events.recv() => match event {
                Some(event) => event,
                None => break WatchOutcome::ConnectionLost,
            },
        };

        if let Some(line) = render::describe(&event) {
            print_line(out, &line);
        }

        match watcher.handle(&event) {
            Step::Continue => {}
            Step::Finish(outcome) => break outcome,
            Step::Reconcile => {
                if let Some(outcome) = reconcile(api, channel.job_id(), out).await {
                    break outcome;
                }
            }
        }
    };

    channel.disconnect().await;

    if outcome == WatchOutcome::Closed {
        // The feed ended without a verdict; ask the API for one.
        return reconcile(api, channel.job_id(), out)
            .await
            .unwrap_or(WatchOutcome::Closed);
    }
    outcome
}

/// Fetch the job's current state and print it.
async fn reconcile<W: Write>(api: &StatusApi, job_id: &str, out: &mut W) -> Option<WatchOutcome> {
    match api.get_job(job_id).await {
        Ok(snapshot) => {
            tracing::info!(job_id, status = %snapshot.status, "Reconciled job state");
            print_line(out, &render::format_snapshot(&snapshot));
            outcome_from_snapshot(&snapshot)
        }
        Err(e) => {
            tracing::warn!(job_id, error = %e, "Failed to fetch job status");
            None
        }
    }
}

fn print_line<W: Write>(out: &mut W, line: &str) {
    let stamp = chrono::Local::now().format("%H:%M:%S");
    if let Err(e) = writeln!(out, "{stamp} {line}") {
        tracing::warn!(error = %e, "Failed to write output");
    }
}
