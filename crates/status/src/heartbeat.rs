//! Client keep-alive: the ping timer and the frame it sends.

use std::time::Duration;

use tokio::time::{interval_at, Instant, Interval, MissedTickBehavior};
use tokio_tungstenite::tungstenite::Message;

use crate::messages::{encode_message, OutboundMessage};

/// Longest keep-alive period; longer requests are clamped to it.
pub const MAX_KEEPALIVE_PERIOD: Duration = Duration::from_secs(86_400);

/// Ticker for keep-alive pings while a connection is open.
///
/// The first tick fires one full `period` after the connection opens,
/// not immediately. Ticks missed while the session was busy are not
/// replayed in a burst. `period` is clamped to
/// `[1ms, MAX_KEEPALIVE_PERIOD]`.
pub fn keepalive_ticker(period: Duration) -> Interval {
    let period = period.clamp(Duration::from_millis(1), MAX_KEEPALIVE_PERIOD);
    let mut ticker = interval_at(Instant::now() + period, period);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
    ticker
}

/// The `{"type":"ping"}` text frame.
pub fn ping_frame() -> Result<Message, serde_json::Error> {
    encode_message(OutboundMessage::Ping).map(Message::Text)
}
