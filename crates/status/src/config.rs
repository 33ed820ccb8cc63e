//! Channel configuration loaded from environment variables.

use std::time::Duration;

use crate::heartbeat::MAX_KEEPALIVE_PERIOD;
use crate::reconnect::{ReconnectConfig, MAX_RECONNECT_DELAY};

/// Largest accepted `RECONNECT_GROWTH_FACTOR`.
pub const MAX_GROWTH_FACTOR: f64 = 10.0;

/// Default keep-alive interval while the connection is open.
pub const DEFAULT_HEARTBEAT_INTERVAL: Duration = Duration::from_secs(30);

/// Default bound on a single connection-establishment attempt.
pub const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(10);

/// Connection settings shared by every channel a process creates.
///
/// All fields have defaults suitable for local development.
#[derive(Debug, Clone)]
pub struct ChannelConfig {
    /// WebSocket base URL; the job id is appended as a path segment.
    pub ws_base_url: String,
    /// REST base URL used for job-status reconciliation.
    pub api_base_url: String,
    pub reconnect: ReconnectConfig,
    pub heartbeat_interval: Duration,
    /// An attempt that has not opened within this window is a fault.
    pub connect_timeout: Duration,
}

impl Default for ChannelConfig {
    fn default() -> Self {
        Self {
            ws_base_url: "ws://localhost:8000/ws/jobs".into(),
            api_base_url: "http://localhost:8000/api".into(),
            reconnect: ReconnectConfig::default(),
            heartbeat_interval: DEFAULT_HEARTBEAT_INTERVAL,
            connect_timeout: DEFAULT_CONNECT_TIMEOUT,
        }
    }
}

/// An environment variable was present but could not be parsed.
#[derive(Debug, thiserror::Error)]
#[error("{var} must be {expected}, got {value:?}")]
pub struct ConfigError {
    pub var: &'static str,
    pub expected: &'static str,
    pub value: String,
}

impl ChannelConfig {
    /// Load configuration from environment variables with defaults.
    ///
    /// | Env Var                   | Default                        |
    /// |---------------------------|--------------------------------|
    /// | `STATUS_WS_URL`           | `ws://localhost:8000/ws/jobs`  |
    /// | `STATUS_API_URL`          | `http://localhost:8000/api`    |
    /// | `RECONNECT_BASE_DELAY_MS` | `3000`                         |
    /// | `RECONNECT_GROWTH_FACTOR` | `1.5`                          |
    /// | `RECONNECT_MAX_ATTEMPTS`  | `5`                            |
    /// | `RECONNECT_JITTER`        | `false`                        |
    /// | `HEARTBEAT_INTERVAL_SECS` | `30`                           |
    /// | `CONNECT_TIMEOUT_SECS`    | `10`                           |
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|var| std::env::var(var).ok())
    }

    /// Same as [`from_env`](Self::from_env), reading from an arbitrary
    /// source.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let defaults = Self::default();

        let ws_base_url = lookup("STATUS_WS_URL").unwrap_or(defaults.ws_base_url);
        let api_base_url = lookup("STATUS_API_URL").unwrap_or(defaults.api_base_url);

        let base_delay_ms: u64 =
            parse_var(&lookup, "RECONNECT_BASE_DELAY_MS", "at most 3600000 ms")?
                .unwrap_or(defaults.reconnect.base_delay.as_millis() as u64);
        if u128::from(base_delay_ms) > MAX_RECONNECT_DELAY.as_millis() {
            return Err(ConfigError {
                var: "RECONNECT_BASE_DELAY_MS",
                expected: "at most 3600000 ms",
                value: base_delay_ms.to_string(),
            });
        }

        let multiplier: f64 =
            parse_var(&lookup, "RECONNECT_GROWTH_FACTOR", "a number between 1.0 and 10.0")?
                .unwrap_or(defaults.reconnect.multiplier);
        if !(1.0..=MAX_GROWTH_FACTOR).contains(&multiplier) {
            return Err(ConfigError {
                var: "RECONNECT_GROWTH_FACTOR",
                expected: "a number between 1.0 and 10.0",
                value: multiplier.to_string(),
            });
        }

        let max_attempts: u32 = parse_var(&lookup, "RECONNECT_MAX_ATTEMPTS", "a valid u32")?
            .unwrap_or(defaults.reconnect.max_attempts);

        let jitter = match lookup("RECONNECT_JITTER") {
            None => defaults.reconnect.jitter,
            Some(v) => parse_bool(&v).ok_or(ConfigError {
                var: "RECONNECT_JITTER",
                expected: "a boolean",
                value: v,
            })?,
        };

        let heartbeat_secs: u64 =
            parse_var(&lookup, "HEARTBEAT_INTERVAL_SECS", "between 1 and 86400 seconds")?
                .unwrap_or(defaults.heartbeat_interval.as_secs());
        if heartbeat_secs == 0 || heartbeat_secs > MAX_KEEPALIVE_PERIOD.as_secs() {
            return Err(ConfigError {
                var: "HEARTBEAT_INTERVAL_SECS",
                expected: "between 1 and 86400 seconds",
                value: heartbeat_secs.to_string(),
            });
        }

        let connect_timeout_secs: u64 =
            parse_var(&lookup, "CONNECT_TIMEOUT_SECS", "a valid u64")?
                .unwrap_or(defaults.connect_timeout.as_secs());

        Ok(Self {
            ws_base_url,
            api_base_url,
            reconnect: ReconnectConfig {
                base_delay: Duration::from_millis(base_delay_ms),
                multiplier,
                max_attempts,
                jitter,
            },
            heartbeat_interval: Duration::from_secs(heartbeat_secs),
            connect_timeout: Duration::from_secs(connect_timeout_secs),
        })
    }
}

fn parse_var<F, T>(
    lookup: &F,
    var: &'static str,
    expected: &'static str,
) -> Result<Option<T>, ConfigError>
where
    F: Fn(&str) -> Option<String>,
    T: std::str::FromStr,
{
    match lookup(var) {
        None => Ok(None),
        Some(value) => value
            .trim()
            .parse()
            .map(Some)
            .map_err(|_| ConfigError {
                var,
                expected,
                value,
            }),
    }
}

fn parse_bool(value: &str) -> Option<bool> {
    match value.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Some(true),
        "0" | "false" | "no" | "off" => Some(false),
        _ => None,
    }
}
