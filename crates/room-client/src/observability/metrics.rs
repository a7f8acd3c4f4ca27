//! Metric definitions for the room client.
//!
//! All metrics follow Prometheus naming conventions:
//! - `room_` prefix
//! - `_total` suffix for counters
//! - `_seconds` suffix for duration histograms
//!
//! # Cardinality
//!
//! Labels are bounded:
//! - `operation`: signaling operation names (~10 values)
//! - `outcome`: `success` or a `RoomError::kind` label (~10 values)
//! - `event`: known server push names, anything else is `unknown`
//! - `state`: session states (4 values)
//! - `step`: leave cleanup steps (~6 values)
//!
//! Room, peer and producer ids are never used as labels.
//!
//! No recorder is installed here; the host application chooses one.

use metrics::{counter, gauge, histogram};
use signaling_protocol::events::name;
use std::time::Duration;

/// Record a completed signaling request.
///
/// Metrics: `room_signaling_requests_total`, `room_signaling_request_duration_seconds`
/// Labels: `operation`, `outcome`
pub fn record_signaling_request(operation: &str, outcome: &str, duration: Duration) {
    counter!(
        "room_signaling_requests_total",
        "operation" => operation.to_string(),
        "outcome" => outcome.to_string()
    )
    .increment(1);
    histogram!(
        "room_signaling_request_duration_seconds",
        "operation" => operation.to_string()
    )
    .record(duration.as_secs_f64());
}

/// Record a fire-and-forget notification.
///
/// Metric: `room_signaling_notifications_total`
/// Labels: `operation`
pub fn record_signaling_notify(operation: &str) {
    counter!(
        "room_signaling_notifications_total",
        "operation" => operation.to_string()
    )
    .increment(1);
}

/// Record a server push.
///
/// Metric: `room_signaling_events_total`
/// Labels: `event`
pub fn record_event_received(event: &str) {
    let event = if name::ALL.contains(&event) {
        event
    } else {
        "unknown"
    };
    counter!("room_signaling_events_total", "event" => event.to_string()).increment(1);
}

/// Record one reconnect attempt.
///
/// Metric: `room_signaling_reconnects_total`
/// Labels: `outcome` (success, error)
pub fn record_reconnect_attempt(outcome: &str) {
    counter!("room_signaling_reconnects_total", "outcome" => outcome.to_string()).increment(1);
}

/// Record the end of a remote stream consumption.
///
/// Metric: `room_consumes_total`
/// Labels: `outcome` (success, discarded, or an error kind)
pub fn record_consume(outcome: &str) {
    counter!("room_consumes_total", "outcome" => outcome.to_string()).increment(1);
}

/// Set the number of known remote streams.
///
/// Metric: `room_remote_streams`
pub fn set_remote_streams(count: usize) {
    // usize to f64 conversion is safe for realistic stream counts
    #[allow(clippy::cast_precision_loss)]
    gauge!("room_remote_streams").set(count as f64);
}

/// Set the session actor's mailbox depth.
///
/// Metric: `room_session_mailbox_depth`
pub fn set_session_mailbox_depth(depth: usize) {
    #[allow(clippy::cast_precision_loss)]
    gauge!("room_session_mailbox_depth").set(depth as f64);
}

/// Record a session state transition.
///
/// Metric: `room_session_transitions_total`
/// Labels: `state`
pub fn record_session_transition(state: &str) {
    counter!("room_session_transitions_total", "state" => state.to_string()).increment(1);
}

/// Record a failed leave cleanup step. Cleanup continues regardless.
///
/// Metric: `room_cleanup_errors_total`
/// Labels: `step`
pub fn record_cleanup_error(step: &str) {
    counter!("room_cleanup_errors_total", "step" => step.to_string()).increment(1);
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use metrics_util::debugging::{DebugValue, DebuggingRecorder};
    use metrics_util::MetricKind;

    /// Run `f` against a local recorder and return `(kind, name, labels, value)` rows.
    fn capture(f: impl FnOnce()) -> Vec<(MetricKind, String, Vec<(String, String)>, DebugValue)> {
        let recorder = DebuggingRecorder::new();
        let snapshotter = recorder.snapshotter();
        metrics::with_local_recorder(&recorder, f);

        snapshotter
            .snapshot()
            .into_vec()
            .into_iter()
            .map(|(key, _, _, value)| {
                let (kind, key) = key.into_parts();
                let labels = key
                    .labels()
                    .map(|l| (l.key().to_string(), l.value().to_string()))
                    .collect();
                (kind, key.name().to_string(), labels, value)
            })
            .collect()
    }

    #[test]
    fn test_signaling_request_records_counter_and_histogram() {
        let rows = capture(|| {
            record_signaling_request("joinRoom", "success", Duration::from_millis(20));
            record_signaling_request("joinRoom", "timeout", Duration::from_secs(5));
        });

        let counters: Vec<_> = rows
            .iter()
            .filter(|(_, name, _, _)| name == "room_signaling_requests_total")
            .collect();
        assert_eq!(counters.len(), 2);
        assert!(counters.iter().any(|(_, _, labels, value)| {
            labels.contains(&("outcome".to_string(), "timeout".to_string()))
                && *value == DebugValue::Counter(1)
        }));

        let histogram = rows
            .iter()
            .find(|(_, name, _, _)| name == "room_signaling_request_duration_seconds")
            .unwrap();
        match &histogram.3 {
            DebugValue::Histogram(samples) => assert_eq!(samples.len(), 2),
            other => panic!("expected histogram, got {other:?}"),
        }
    }

    #[test]
    fn test_unknown_events_share_one_label() {
        let rows = capture(|| {
            record_event_received("peerJoined");
            record_event_received("somethingNew");
            record_event_received("anotherThing");
        });

        let labels: Vec<_> = rows
            .iter()
            .filter(|(_, name, _, _)| name == "room_signaling_events_total")
            .flat_map(|(_, _, labels, _)| labels.iter().map(|(_, v)| v.clone()))
            .collect();
        assert_eq!(labels.len(), 2);
        assert!(labels.contains(&"peerJoined".to_string()));
        assert!(labels.contains(&"unknown".to_string()));
    }

    #[test]
    fn test_gauges_and_counters_record() {
        let rows = capture(|| {
            set_remote_streams(3);
            set_session_mailbox_depth(0);
            record_session_transition("joined");
            record_cleanup_error("drain");
            record_consume("success");
            record_reconnect_attempt("error");
            record_signaling_notify("resume");
        });

        let find = |metric: &str| {
            rows.iter()
                .find(|(_, name, _, _)| name == metric)
                .map(|(_, _, _, value)| value)
        };
        assert_eq!(
            find("room_remote_streams"),
            Some(&DebugValue::Gauge(3.0.into()))
        );
        assert_eq!(
            find("room_cleanup_errors_total"),
            Some(&DebugValue::Counter(1))
        );
        assert!(find("room_session_transitions_total").is_some());
        assert!(find("room_consumes_total").is_some());
        assert!(find("room_signaling_reconnects_total").is_some());
        assert!(find("room_signaling_notifications_total").is_some());
        assert!(find("room_session_mailbox_depth").is_some());
    }
}
