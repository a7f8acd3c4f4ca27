//! Tracing and metrics for the room client.
//!
//! # Privacy
//!
//! Session entry points use `#[instrument(skip_all)]` with an explicit
//! field list. Screen-capture permission tokens and SDP/DTLS payloads are
//! never logged; room and peer ids appear in log fields but never in
//! metric labels.
//!
//! # Metrics
//!
//! | Metric | Type | Labels |
//! |--------|------|--------|
//! | `room_signaling_requests_total` | Counter | `operation`, `outcome` |
//! | `room_signaling_request_duration_seconds` | Histogram | `operation` |
//! | `room_signaling_notifications_total` | Counter | `operation` |
//! | `room_signaling_events_total` | Counter | `event` |
//! | `room_signaling_reconnects_total` | Counter | `outcome` |
//! | `room_consumes_total` | Counter | `outcome` |
//! | `room_remote_streams` | Gauge | none |
//! | `room_session_mailbox_depth` | Gauge | none |
//! | `room_session_transitions_total` | Counter | `state` |
//! | `room_cleanup_errors_total` | Counter | `step` |

pub mod metrics;

use common::config::ObservabilityConfig;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::EnvFilter;

/// Install the global tracing subscriber.
///
/// `RUST_LOG` overrides `config.log_level` when set.
///
/// # Errors
///
/// Returns an error if the filter is invalid or a global subscriber is
/// already installed.
pub fn init_tracing(config: &ObservabilityConfig) -> Result<(), String> {
    let filter = match EnvFilter::try_from_default_env() {
        Ok(filter) => filter,
        Err(_) => EnvFilter::try_new(&config.log_level)
            .map_err(|e| format!("Invalid log filter '{}': {e}", config.log_level))?,
    };

    let registry = tracing_subscriber::registry().with(filter);
    let result = if config.json_logs {
        registry.with(tracing_subscriber::fmt::layer().json()).try_init()
    } else {
        registry.with(tracing_subscriber::fmt::layer()).try_init()
    };
    result.map_err(|e| format!("Failed to install tracing subscriber: {e}"))
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    #[test]
    fn test_init_tracing_installs_once() {
        let config = ObservabilityConfig::default();
        // Another test binary thread may have installed one already
        let _ = init_tracing(&config);
        assert!(init_tracing(&config).is_err());
    }
}
