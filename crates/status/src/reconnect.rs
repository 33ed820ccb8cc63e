//! Exponential-backoff policy for job-status reconnection.
//!
//! When the connection to the status server drops, the channel asks
//! [`ReconnectConfig::delay_for_attempt`] how long to wait before the
//! next attempt, and [`ReconnectConfig::should_retry`] whether it may
//! try at all. The counter itself lives in the channel and is reset on
//! every successful open.

use std::time::Duration;

use rand::Rng;

/// Longest delay ever scheduled between attempts.
pub const MAX_RECONNECT_DELAY: Duration = Duration::from_secs(3600);

/// Tunable parameters for the exponential-backoff strategy.
#[derive(Debug, Clone, PartialEq)]
pub struct ReconnectConfig {
    /// Delay before the first reconnection attempt.
    pub base_delay: Duration,
    /// Factor by which the delay grows after each failed attempt.
    pub multiplier: f64,
    /// Reconnection attempts allowed before giving up.
    pub max_attempts: u32,
    /// Scale each delay by a random factor in `[0.5, 1.0]`.
    ///
    /// Off by default, so every client backs off on the same schedule.
    pub jitter: bool,
}

impl Default for ReconnectConfig {
    fn default() -> Self {
        Self {
            base_delay: Duration::from_millis(3000),
            multiplier: 1.5,
            max_attempts: 5,
            jitter: false,
        }
    }
}

impl ReconnectConfig {
    /// Delay before reconnection attempt `attempt` (1-based).
    ///
    /// `base_delay * multiplier^(attempt - 1)`, without jitter, capped
    /// at [`MAX_RECONNECT_DELAY`]. Attempt 0 is treated as attempt 1.
    pub fn delay_for_attempt(&self, attempt: u32) -> Duration {
        if self.base_delay.is_zero() {
            return Duration::ZERO;
        }
        let exponent = attempt.saturating_sub(1).min(i32::MAX as u32) as i32;
        let factor = self.multiplier.powi(exponent);
        Duration::try_from_secs_f64(self.base_delay.as_secs_f64() * factor)
            .map_or(MAX_RECONNECT_DELAY, |delay| delay.min(MAX_RECONNECT_DELAY))
    }

    /// Whether another attempt may be scheduled after `attempts_made`
    /// consecutive failed reconnections.
    pub fn should_retry(&self, attempts_made: u32) -> bool {
        attempts_made < self.max_attempts
    }

    /// The delay actually slept for `attempt`, with jitter applied when
    /// enabled.
    pub fn next_delay(&self, attempt: u32) -> Duration {
        let delay = self.delay_for_attempt(attempt);
        if self.jitter {
            apply_jitter(delay)
        } else {
            delay
        }
    }
}

fn apply_jitter(delay: Duration) -> Duration {
    let factor: f64 = rand::rng().random_range(0.5..=1.0);
    delay.mul_f64(factor)
}
