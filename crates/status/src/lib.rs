//! Live job-status client for the Lectern lecture-processing platform.
//!
//! Provides a reconnecting WebSocket channel that follows one job's
//! progress ([`channel::JobStatusChannel`]), typed message parsing,
//! the backoff policy, and a REST client for reconciling state after a
//! reconnect gap.

pub mod api;
pub mod channel;
pub mod client;
pub mod config;
pub mod events;
pub mod heartbeat;
pub mod messages;
pub mod processor;
pub mod reconnect;

pub use channel::JobStatusChannel;
pub use config::ChannelConfig;
pub use events::{ChannelEvent, ChannelStatus, StatusFailure, StatusHandler};
