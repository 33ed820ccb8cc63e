//! WebSocket message type constants for live job-progress updates.
//!
//! Used by the status channel when parsing inbound job events and when
//! sending keep-alive frames back to the server.

/// Progress update during job processing (stage + percentage).
pub const MSG_TYPE_PROGRESS: &str = "progress";

/// Job completed successfully. The server sends nothing further.
pub const MSG_TYPE_COMPLETE: &str = "complete";

/// Job failed on the server. The connection itself stays usable.
pub const MSG_TYPE_ERROR: &str = "error";

/// Client-to-server keep-alive.
pub const MSG_TYPE_PING: &str = "ping";

/// WebSocket close code for a normal, intentional closure.
///
/// Any other close code (or a dropped socket) is treated as abnormal.
pub const CLOSE_CODE_NORMAL: u16 = 1000;
