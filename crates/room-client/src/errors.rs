//! Room client error types.
//!
//! Errors surface to the UI layer through [`RoomSessionHandle`] intents and
//! are labelled for metrics through [`RoomError::kind`].
//!
//! [`RoomSessionHandle`]: crate::session::RoomSessionHandle

use common::types::StreamSource;
use signaling_protocol::CodecError;
use thiserror::Error;

/// Room client error type.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RoomError {
    /// No active signaling connection.
    #[error("Signaling channel not connected")]
    NotConnected,

    /// No acknowledgement within the request deadline.
    #[error("Request timed out: {operation}")]
    Timeout { operation: String },

    /// Response could not be parsed into the expected shape.
    #[error("Decode error: {0}")]
    Decode(String),

    /// Server answered the request with an error.
    #[error("Request rejected: {operation}: {reason}")]
    Rejected { operation: String, reason: String },

    /// Camera, microphone or screen capture denied or missing.
    #[error("Capture unavailable: {0}")]
    CaptureUnavailable(StreamSource),

    /// Operation needs transports that do not exist yet.
    #[error("Transport unavailable")]
    TransportUnavailable,

    /// Opaque media engine failure.
    #[error("Media engine failure: {0}")]
    AdapterFailure(String),

    /// Intent not valid in the current session state.
    #[error("Invalid state: {0}")]
    InvalidState(String),

    /// Pending join cancelled by leave.
    #[error("Join aborted")]
    JoinAborted,

    /// Internal error (actor gone, channel closed).
    #[error("Internal error: {0}")]
    Internal(String),
}

impl RoomError {
    /// Bounded label for metrics.
    #[must_use]
    pub const fn kind(&self) -> &'static str {
        match self {
            RoomError::NotConnected => "not_connected",
            RoomError::Timeout { .. } => "timeout",
            RoomError::Decode(_) => "decode",
            RoomError::Rejected { .. } => "rejected",
            RoomError::CaptureUnavailable(_) => "capture_unavailable",
            RoomError::TransportUnavailable => "transport_unavailable",
            RoomError::AdapterFailure(_) => "adapter_failure",
            RoomError::InvalidState(_) => "invalid_state",
            RoomError::JoinAborted => "join_aborted",
            RoomError::Internal(_) => "internal",
        }
    }
}

impl From<CodecError> for RoomError {
    fn from(err: CodecError) -> Self {
        RoomError::Decode(err.to_string())
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    #[test]
    fn test_codec_error_becomes_decode() {
        let err: RoomError = CodecError::MissingField("event").into();
        assert!(matches!(err, RoomError::Decode(ref msg) if msg.contains("event")));
        assert_eq!(err.kind(), "decode");
    }

    #[test]
    fn test_display_includes_operation() {
        let err = RoomError::Timeout {
            operation: "consume".to_string(),
        };
        assert_eq!(err.to_string(), "Request timed out: consume");

        let err = RoomError::Rejected {
            operation: "joinRoom".to_string(),
            reason: "room full".to_string(),
        };
        assert_eq!(err.to_string(), "Request rejected: joinRoom: room full");
    }

    #[test]
    fn test_kind_labels_are_distinct() {
        let errors = [
            RoomError::NotConnected,
            RoomError::Timeout {
                operation: String::new(),
            },
            RoomError::Decode(String::new()),
            RoomError::Rejected {
                operation: String::new(),
                reason: String::new(),
            },
            RoomError::CaptureUnavailable(StreamSource::Camera),
            RoomError::TransportUnavailable,
            RoomError::AdapterFailure(String::new()),
            RoomError::InvalidState(String::new()),
            RoomError::JoinAborted,
            RoomError::Internal(String::new()),
        ];
        let mut kinds: Vec<_> = errors.iter().map(RoomError::kind).collect();
        kinds.sort_unstable();
        kinds.dedup();
        assert_eq!(kinds.len(), errors.len());
    }
}
