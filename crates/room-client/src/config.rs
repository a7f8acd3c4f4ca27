//! Room client configuration.
//!
//! Configuration is loaded from environment variables. Only the signaling
//! URL is required; everything else has a default.

use common::config::{ObservabilityConfig, DEFAULT_LOG_LEVEL};
use std::collections::HashMap;
use std::env;
use std::str::FromStr;
use std::time::Duration;
use thiserror::Error;

/// Default per-request acknowledgement deadline in milliseconds.
pub const DEFAULT_REQUEST_TIMEOUT_MS: u64 = 5_000;

/// Default number of reconnect attempts after an unexpected link loss.
pub const DEFAULT_RECONNECT_ATTEMPTS: u32 = 5;

/// Default base reconnect backoff in milliseconds.
pub const DEFAULT_RECONNECT_BACKOFF_MS: u64 = 1_000;

/// Default reconnect backoff cap in milliseconds.
pub const DEFAULT_RECONNECT_BACKOFF_MAX_MS: u64 = 30_000;

/// Default time leave waits for an in-flight consume to drain.
pub const DEFAULT_LEAVE_DRAIN_TIMEOUT_MS: u64 = 2_000;

/// Room client configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Config {
    /// Signaling server URL (`ws://` or `wss://`).
    pub signaling_url: String,

    /// Deadline for each signaling request (default: 5s).
    pub request_timeout: Duration,

    /// Reconnect attempts after an unexpected link loss (default: 5, 0 disables).
    pub reconnect_attempts: u32,

    /// First reconnect delay, doubled per attempt (default: 1s).
    pub reconnect_backoff: Duration,

    /// Upper bound on the reconnect delay (default: 30s).
    pub reconnect_backoff_max: Duration,

    /// How long leave waits for an in-flight consume (default: 2s).
    pub leave_drain_timeout: Duration,

    /// Open the front camera first (default: true).
    pub prefer_front_camera: bool,

    /// Logging configuration.
    pub observability: ObservabilityConfig,
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("Missing required environment variable: {0}")]
    MissingEnvVar(String),

    #[error("Invalid configuration value: {0}")]
    InvalidValue(String),
}

impl Config {
    /// Configuration with defaults for everything but the URL.
    #[must_use]
    pub fn new(signaling_url: impl Into<String>) -> Self {
        Self {
            signaling_url: signaling_url.into(),
            request_timeout: Duration::from_millis(DEFAULT_REQUEST_TIMEOUT_MS),
            reconnect_attempts: DEFAULT_RECONNECT_ATTEMPTS,
            reconnect_backoff: Duration::from_millis(DEFAULT_RECONNECT_BACKOFF_MS),
            reconnect_backoff_max: Duration::from_millis(DEFAULT_RECONNECT_BACKOFF_MAX_MS),
            leave_drain_timeout: Duration::from_millis(DEFAULT_LEAVE_DRAIN_TIMEOUT_MS),
            prefer_front_camera: true,
            observability: ObservabilityConfig::default(),
        }
    }

    /// Load configuration from environment variables.
    ///
    /// # Errors
    ///
    /// See [`Config::from_vars`].
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_vars(&env::vars().collect())
    }

    /// Load configuration from a `HashMap` (for testing).
    ///
    /// # Errors
    ///
    /// Returns `MissingEnvVar` if `ROOM_SIGNALING_URL` is absent and
    /// `InvalidValue` for a malformed URL or number.
    pub fn from_vars(vars: &HashMap<String, String>) -> Result<Self, ConfigError> {
        let signaling_url = vars
            .get("ROOM_SIGNALING_URL")
            .ok_or_else(|| ConfigError::MissingEnvVar("ROOM_SIGNALING_URL".to_string()))?
            .clone();

        if !(signaling_url.starts_with("ws://") || signaling_url.starts_with("wss://")) {
            return Err(ConfigError::InvalidValue(format!(
                "ROOM_SIGNALING_URL must use ws:// or wss://, got {signaling_url}"
            )));
        }

        let request_timeout_ms: u64 =
            parse_var(vars, "ROOM_REQUEST_TIMEOUT_MS", DEFAULT_REQUEST_TIMEOUT_MS)?;
        if request_timeout_ms == 0 {
            return Err(ConfigError::InvalidValue(
                "ROOM_REQUEST_TIMEOUT_MS must be greater than zero".to_string(),
            ));
        }

        let reconnect_attempts =
            parse_var(vars, "ROOM_RECONNECT_ATTEMPTS", DEFAULT_RECONNECT_ATTEMPTS)?;
        let reconnect_backoff_ms: u64 =
            parse_var(vars, "ROOM_RECONNECT_BACKOFF_MS", DEFAULT_RECONNECT_BACKOFF_MS)?;
        let reconnect_backoff_max_ms: u64 = parse_var(
            vars,
            "ROOM_RECONNECT_BACKOFF_MAX_MS",
            DEFAULT_RECONNECT_BACKOFF_MAX_MS,
        )?;
        if reconnect_backoff_max_ms < reconnect_backoff_ms {
            return Err(ConfigError::InvalidValue(format!(
                "ROOM_RECONNECT_BACKOFF_MAX_MS ({reconnect_backoff_max_ms}) is below \
                 ROOM_RECONNECT_BACKOFF_MS ({reconnect_backoff_ms})"
            )));
        }

        let leave_drain_timeout_ms: u64 = parse_var(
            vars,
            "ROOM_LEAVE_DRAIN_TIMEOUT_MS",
            DEFAULT_LEAVE_DRAIN_TIMEOUT_MS,
        )?;
        let prefer_front_camera = parse_var(vars, "ROOM_PREFER_FRONT_CAMERA", true)?;

        let log_level = vars
            .get("ROOM_LOG_LEVEL")
            .cloned()
            .unwrap_or_else(|| DEFAULT_LOG_LEVEL.to_string());
        let json_logs = parse_var(vars, "ROOM_JSON_LOGS", false)?;

        Ok(Config {
            signaling_url,
            request_timeout: Duration::from_millis(request_timeout_ms),
            reconnect_attempts,
            reconnect_backoff: Duration::from_millis(reconnect_backoff_ms),
            reconnect_backoff_max: Duration::from_millis(reconnect_backoff_max_ms),
            leave_drain_timeout: Duration::from_millis(leave_drain_timeout_ms),
            prefer_front_camera,
            observability: ObservabilityConfig {
                log_level,
                json_logs,
            },
        })
    }
}

fn parse_var<T: FromStr>(
    vars: &HashMap<String, String>,
    name: &str,
    default: T,
) -> Result<T, ConfigError> {
    match vars.get(name) {
        Some(raw) => raw
            .trim()
            .parse()
            .map_err(|_| ConfigError::InvalidValue(format!("{name}={raw}"))),
        None => Ok(default),
    }
}
