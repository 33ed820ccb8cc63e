//! Job-status WebSocket message types and parser.
//!
//! The server pushes JSON objects tagged by a `"type"` field
//! (`progress`, `complete`, `error`) with the job fields inline. This
//! module deserializes them into a strongly-typed [`InboundMessage`]
//! enum, and serializes the client's keep-alive frame.

use chrono::{NaiveDateTime, Utc};
use lectern_core::types::{JobId, Timestamp};
use serde::{Deserialize, Serialize};

/// All known server-to-client message types.
///
/// Deserialized via the internally-tagged `"type"` field. Any tag this
/// client does not know lands in [`InboundMessage::Unknown`]; a missing
/// tag is a parse error.
#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "type")]
pub enum InboundMessage {
    /// The job advanced (stage change or percentage update).
    #[serde(rename = "progress")]
    Progress(JobEvent),

    /// The job finished successfully.
    #[serde(rename = "complete")]
    Complete(JobEvent),

    /// The job failed on the server.
    #[serde(rename = "error")]
    Error(JobEvent),

    #[serde(other)]
    Unknown,
}

/// Fields shared by every job event.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct JobEvent {
    pub job_id: JobId,
    pub progress: Option<ProgressPayload>,
    pub error: Option<String>,
    /// Server-side timestamp, as sent. See [`JobEvent::timestamp_utc`].
    pub timestamp: Option<String>,
}

impl JobEvent {
    /// Parse the raw timestamp.
    ///
    /// Accepts RFC 3339 and naive ISO-8601 (interpreted as UTC, which
    /// is what Python's `datetime.isoformat()` emits for naive values).
    pub fn timestamp_utc(&self) -> Option<Timestamp> {
        let raw = self.timestamp.as_deref()?;
        if let Ok(ts) = chrono::DateTime::parse_from_rfc3339(raw) {
            return Some(ts.with_timezone(&Utc));
        }
        NaiveDateTime::parse_from_str(raw, "%Y-%m-%dT%H:%M:%S%.f")
            .ok()
            .map(|naive| naive.and_utc())
    }
}

/// Progress details carried by `progress` events.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProgressPayload {
    /// Pipeline stage, e.g. `"transcription"`.
    pub stage: String,
    /// Completion percentage (0-100).
    pub percent: f64,
    #[serde(default)]
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub eta_seconds: Option<f64>,
    /// Name of the processing agent handling this stage, if reported.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub agent_name: Option<String>,
}

/// Client-to-server messages.
#[derive(Debug, Clone, Copy, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum OutboundMessage {
    Ping,
}

/// Parse a job-status WebSocket text message into a typed enum.
///
/// Returns `Err` for malformed JSON or a missing `type` field.
/// Callers should log and continue.
pub fn parse_message(text: &str) -> Result<InboundMessage, serde_json::Error> {
    serde_json::from_str(text)
}

/// Encode an outbound message as a JSON text payload.
pub fn encode_message(msg: OutboundMessage) -> Result<String, serde_json::Error> {
    serde_json::to_string(&msg)
}
