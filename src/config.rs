//! Transport configuration loaded from environment variables.
//!
//! Follows 12-factor style: all settings come from environment variables
//! (or a `.env` file via `dotenvy`). `SERVER_URL` is additionally re-read on
//! every connect through [`crate::channel::EnvEndpoint`].

use std::time::Duration;

use crate::channel::ReconnectPolicy;
use crate::error::TransportError;
use crate::service::heartbeat_monitor::{DEFAULT_HEARTBEAT_INTERVAL, DEFAULT_HEARTBEAT_TIMEOUT};
use crate::service::request_dispatcher::{DEFAULT_ACK_TIMEOUT, DEFAULT_MAX_RETRIES};

/// Environment variable holding the endpoint URL.
pub const SERVER_URL_KEY: &str = "SERVER_URL";

/// Endpoint used when `SERVER_URL` is not set.
pub const DEFAULT_SERVER_URL: &str = "ws://127.0.0.1:3000/ws";

/// Top-level transport configuration.
///
/// Loaded once at startup via [`TransportConfig::from_env`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransportConfig {
    /// Endpoint URL at startup (e.g. `ws://127.0.0.1:3000/ws`).
    pub server_url: String,

    /// Token to connect with at startup, if any.
    pub auth_token: Option<String>,

    /// Interval between liveness probes.
    pub heartbeat_interval: Duration,

    /// Bound on a single probe's ack.
    pub heartbeat_timeout: Duration,

    /// Bound on a single acknowledged-call attempt.
    pub ack_timeout: Duration,

    /// Retries after the first attempt of an acknowledged call.
    pub ack_max_retries: u32,

    /// Transport reconnect delay floor.
    pub reconnect_delay_min: Duration,

    /// Transport reconnect delay ceiling.
    pub reconnect_delay_max: Duration,

    /// Transport connect timeout.
    pub connect_timeout: Duration,

    /// Capacity of the host intent queue.
    pub intent_queue_capacity: usize,

    /// Emit logs as JSON.
    pub log_json: bool,
}

impl TransportConfig {
    /// Loads configuration from environment variables.
    ///
    /// Falls back to sensible defaults when a variable is not set.
    /// Calls `dotenvy::dotenv().ok()` to optionally load a `.env` file.
    ///
    /// # Errors
    ///
    /// Returns [`TransportError::InvalidConfig`] if the resulting settings
    /// fail [`TransportConfig::validate`].
    pub fn from_env() -> Result<Self, TransportError> {
        dotenvy::dotenv().ok();

        let defaults = Self::default();

        let server_url =
            std::env::var(SERVER_URL_KEY).unwrap_or_else(|_| DEFAULT_SERVER_URL.to_string());
        let auth_token = std::env::var("AUTH_TOKEN").ok().filter(|t| !t.trim().is_empty());

        let heartbeat_interval = Duration::from_secs(parse_env(
            "HEARTBEAT_INTERVAL_SECS",
            defaults.heartbeat_interval.as_secs(),
        ));
        let heartbeat_timeout = Duration::from_secs(parse_env(
            "HEARTBEAT_TIMEOUT_SECS",
            defaults.heartbeat_timeout.as_secs(),
        ));
        let ack_timeout =
            Duration::from_secs(parse_env("ACK_TIMEOUT_SECS", defaults.ack_timeout.as_secs()));
        let ack_max_retries = parse_env("ACK_MAX_RETRIES", defaults.ack_max_retries);

        let reconnect_delay_min = Duration::from_millis(parse_env(
            "RECONNECT_DELAY_MIN_MS",
            millis(defaults.reconnect_delay_min),
        ));
        let reconnect_delay_max = Duration::from_millis(parse_env(
            "RECONNECT_DELAY_MAX_MS",
            millis(defaults.reconnect_delay_max),
        ));
        let connect_timeout = Duration::from_millis(parse_env(
            "CONNECT_TIMEOUT_MS",
            millis(defaults.connect_timeout),
        ));

        let intent_queue_capacity =
            parse_env("INTENT_QUEUE_CAPACITY", defaults.intent_queue_capacity);
        let log_json = parse_env_bool("LOG_JSON", defaults.log_json);

        let config = Self {
            server_url,
            auth_token,
            heartbeat_interval,
            heartbeat_timeout,
            ack_timeout,
            ack_max_retries,
            reconnect_delay_min,
            reconnect_delay_max,
            connect_timeout,
            intent_queue_capacity,
            log_json,
        };
        config.validate()?;
        Ok(config)
    }

    /// Checks the settings for values the runtime cannot honour.
    ///
    /// # Errors
    ///
    /// Returns [`TransportError::InvalidConfig`] naming the first offending
    /// setting.
    pub fn validate(&self) -> Result<(), TransportError> {
        let invalid = |msg: &str| Err(TransportError::InvalidConfig(msg.to_string()));
        if self.heartbeat_interval.is_zero() {
            return invalid("heartbeat interval must be positive");
        }
        if self.heartbeat_timeout.is_zero() || self.ack_timeout.is_zero() {
            return invalid("ack timeouts must be positive");
        }
        if self.heartbeat_timeout >= self.heartbeat_interval {
            return invalid("heartbeat timeout must be shorter than the interval");
        }
        if self.reconnect_delay_min > self.reconnect_delay_max {
            return invalid("reconnect delay floor exceeds its ceiling");
        }
        if self.intent_queue_capacity == 0 {
            return invalid("intent queue capacity must be positive");
        }
        Ok(())
    }

    /// Returns the reconnect policy handed to the transport.
    #[must_use]
    pub fn reconnect_policy(&self) -> ReconnectPolicy {
        ReconnectPolicy {
            delay_min: self.reconnect_delay_min,
            delay_max: self.reconnect_delay_max,
            connect_timeout: self.connect_timeout,
        }
    }
}

impl Default for TransportConfig {
    fn default() -> Self {
        let policy = ReconnectPolicy::default();
        Self {
            server_url: DEFAULT_SERVER_URL.to_string(),
            auth_token: None,
            heartbeat_interval: DEFAULT_HEARTBEAT_INTERVAL,
            heartbeat_timeout: DEFAULT_HEARTBEAT_TIMEOUT,
            ack_timeout: DEFAULT_ACK_TIMEOUT,
            ack_max_retries: DEFAULT_MAX_RETRIES,
            reconnect_delay_min: policy.delay_min,
            reconnect_delay_max: policy.delay_max,
            connect_timeout: policy.connect_timeout,
            intent_queue_capacity: 256,
            log_json: false,
        }
    }
}

fn millis(d: Duration) -> u64 {
    u64::try_from(d.as_millis()).unwrap_or(u64::MAX)
}

/// Parses an environment variable as `T`, returning `default` on missing
/// or invalid values.
fn parse_env<T: std::str::FromStr>(key: &str, default: T) -> T {
    std::env::var(key)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}

/// Parses an environment variable as a boolean. Accepts `"true"`, `"1"`,
/// `"false"`, `"0"` (case-insensitive). Returns `default` otherwise.
fn parse_env_bool(key: &str, default: bool) -> bool {
    match std::env::var(key).map(|v| v.to_ascii_lowercase()).ok().as_deref() {
        Some("true" | "1") => true,
        Some("false" | "0") => false,
        _ => default,
    }
}
