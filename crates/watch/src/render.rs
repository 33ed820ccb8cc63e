//! Human-readable lines for channel events.

use lectern_status::api::JobSnapshot;
use lectern_status::messages::ProgressPayload;
use lectern_status::{ChannelEvent, ChannelStatus};

/// One line per progress update, e.g.
/// `[ 42%] transcription - Transcribing (eta 1m 05s, transcriber)`.
pub fn format_progress(progress: &ProgressPayload) -> String {
    let percent = progress.percent.clamp(0.0, 100.0);
    let mut line = format!("[{percent:>3.0}%] {}", progress.stage);

    if !progress.message.is_empty() {
        line.push_str(" - ");
        line.push_str(&progress.message);
    }

    let mut details = Vec::new();
    if let Some(eta) = progress.eta_seconds {
        details.push(format!("eta {}", format_eta(eta)));
    }
    if let Some(agent) = &progress.agent_name {
        details.push(agent.clone());
    }
    if !details.is_empty() {
        line.push_str(&format!(" ({})", details.join(", ")));
    }

    line
}

/// `42s`, `1m 05s`, `2h 03m`.
pub fn format_eta(seconds: f64) -> String {
    let total = seconds.max(0.0).round() as u64;
    match total {
        0..=59 => format!("{total}s"),
        60..=3599 => format!("{}m {:02}s", total / 60, total % 60),
        _ => format!("{}h {:02}m", total / 3600, (total % 3600) / 60),
    }
}

/// The line to print for `event`, if any.
pub fn describe(event: &ChannelEvent) -> Option<String> {
    match event {
        ChannelEvent::Progress { progress, .. } => Some(format_progress(progress)),
        ChannelEvent::Completed(event) => Some(format!("Job {} completed", event.job_id)),
        ChannelEvent::Failed(failure) => Some(failure.to_string()),
        ChannelEvent::Status(ChannelStatus::Open) => Some("Connected to job updates".into()),
        ChannelEvent::Status(ChannelStatus::Faulted) => {
            Some("Connection to job updates lost, retrying".into())
        }
        ChannelEvent::Status(_) => None,
    }
}

/// Summary of a REST snapshot.
pub fn format_snapshot(snapshot: &JobSnapshot) -> String {
    match (&snapshot.progress, &snapshot.error) {
        (_, Some(error)) => format!("Job {} is {}: {error}", snapshot.job_id, snapshot.status),
        (Some(progress), None) => format!(
            "Job {} is {} {}",
            snapshot.job_id,
            snapshot.status,
            format_progress(progress)
        ),
        (None, None) => format!("Job {} is {}", snapshot.job_id, snapshot.status),
    }
}
