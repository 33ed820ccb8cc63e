//! Shared types and wire constants for the Lectern job-status client.

pub mod job_events;
pub mod types;
