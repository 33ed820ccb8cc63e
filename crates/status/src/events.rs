//! Caller-facing events emitted by a job-status channel.
//!
//! A channel reports everything through a [`StatusHandler`]: job
//! progress, completion, failures, and its own connection state.
//! Handlers run on the channel's task, in the order the transport
//! delivered the underlying messages, and should return quickly.
//!
//! For async consumers, an `mpsc::UnboundedSender<ChannelEvent>` is
//! itself a handler: every callback becomes a [`ChannelEvent`].

use std::fmt;

use lectern_core::types::JobId;
use serde::Serialize;
use tokio::sync::mpsc;

use crate::messages::{JobEvent, ProgressPayload};

/// Connection state of a channel.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ChannelStatus {
    /// Constructed, `connect` not yet called.
    Idle,
    Connecting,
    Open,
    /// Torn down, completed, or out of retries. No retry is pending.
    Closed,
    /// The transport failed; a retry may be pending.
    Faulted,
}

impl fmt::Display for ChannelStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ChannelStatus::Idle => "idle",
            ChannelStatus::Connecting => "connecting",
            ChannelStatus::Open => "open",
            ChannelStatus::Closed => "closed",
            ChannelStatus::Faulted => "faulted",
        };
        f.write_str(s)
    }
}

/// What the failure callback receives.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum StatusFailure {
    /// The server reported that the job itself failed. The connection
    /// stays open.
    #[error("Job {job_id} failed: {message}")]
    JobFailed { job_id: JobId, message: String },

    /// The channel gave up reconnecting. Terminal; reported once.
    #[error("Lost connection to job updates after {attempts} reconnection attempts")]
    RetriesExhausted { attempts: u32 },
}

/// Receives a channel's callbacks.
///
/// Every method has a no-op default, so implementors only override
/// what they need.
pub trait StatusHandler: Send + Sync + 'static {
    fn on_progress(&self, _job_id: &str, _progress: &ProgressPayload) {}

    fn on_complete(&self, _event: &JobEvent) {}

    fn on_error(&self, _failure: &StatusFailure) {}

    fn on_status_change(&self, _status: ChannelStatus) {}
}

/// A channel callback, as a value.
#[derive(Debug, Clone, PartialEq)]
pub enum ChannelEvent {
    Progress {
        job_id: JobId,
        progress: ProgressPayload,
    },
    Completed(JobEvent),
    Failed(StatusFailure),
    Status(ChannelStatus),
}

impl StatusHandler for mpsc::UnboundedSender<ChannelEvent> {
    fn on_progress(&self, job_id: &str, progress: &ProgressPayload) {
        let _ = self.send(ChannelEvent::Progress {
            job_id: job_id.to_string(),
            progress: progress.clone(),
        });
    }

    fn on_complete(&self, event: &JobEvent) {
        let _ = self.send(ChannelEvent::Completed(event.clone()));
    }

    fn on_error(&self, failure: &StatusFailure) {
        let _ = self.send(ChannelEvent::Failed(failure.clone()));
    }

    fn on_status_change(&self, status: ChannelStatus) {
        let _ = self.send(ChannelEvent::Status(status));
    }
}
