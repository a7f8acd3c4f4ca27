//! Media engine boundary.
//!
//! The room session never touches codecs, ICE or capture hardware. It
//! drives an implementation of [`MediaEngine`] and reacts to the
//! callbacks the engine makes through [`TransportListener`] and
//! [`ProducerListener`].
//!
//! ```text
//! RoomSession ──create_transport──► MediaEngine ──► MediaTransport
//!      ▲                                                 │
//!      └──── TransportListener (connect, produce) ◄──────┘
//! ```

pub mod platform;

pub use platform::{AudioOutput, CallPlatform, NoopPlatform};

use crate::errors::RoomError;
use async_trait::async_trait;
use common::types::{ConsumerId, MediaKind, ProducerId, StreamSource, TransportId};
use serde_json::Value;
use signaling_protocol::messages::{AppData, TransportOptions};
use std::fmt;
use std::sync::Arc;
use thiserror::Error;

/// Media engine failure.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum MediaError {
    /// Permission denied or device missing.
    #[error("Capture unavailable: {0}")]
    CaptureUnavailable(StreamSource),

    /// Object already closed or disposed.
    #[error("Media object closed")]
    Closed,

    /// Anything else the engine reports.
    #[error("{0}")]
    Failed(String),
}

impl From<MediaError> for RoomError {
    fn from(err: MediaError) -> Self {
        match err {
            MediaError::CaptureUnavailable(source) => RoomError::CaptureUnavailable(source),
            other => RoomError::AdapterFailure(other.to_string()),
        }
    }
}

/// Direction of a transport.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TransportDirection {
    Send,
    Recv,
}

impl TransportDirection {
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            TransportDirection::Send => "send",
            TransportDirection::Recv => "recv",
        }
    }

    #[must_use]
    pub const fn is_sender(&self) -> bool {
        matches!(self, TransportDirection::Send)
    }
}

/// Renderable media handle, either a local capture or a consumed remote stream.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct MediaTrack {
    /// Engine-assigned track id.
    pub id: String,
    pub kind: MediaKind,
}

/// What to capture.
#[derive(Clone, PartialEq, Eq)]
pub struct CaptureRequest {
    pub source: StreamSource,
    /// Camera facing; ignored for other sources.
    pub front_camera: bool,
    /// One-shot OS permission token, screen capture only.
    pub screen_token: Option<String>,
}

impl fmt::Debug for CaptureRequest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CaptureRequest")
            .field("source", &self.source)
            .field("front_camera", &self.front_camera)
            .field(
                "screen_token",
                &self.screen_token.as_ref().map(|_| "[REDACTED]"),
            )
            .finish()
    }
}

/// Parameters for consuming a remote producer.
#[derive(Debug, Clone, PartialEq)]
pub struct ConsumeParams {
    pub consumer_id: ConsumerId,
    pub producer_id: ProducerId,
    pub kind: MediaKind,
    pub rtp_parameters: Value,
}

/// Why a local producer closed without being asked to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProducerCloseReason {
    /// The send transport went away.
    TransportClosed,
    /// The capture behind the track ended (device unplugged, OS stopped a screen share).
    TrackEnded,
}

/// Callbacks a transport makes into the session.
#[async_trait]
pub trait TransportListener: Send + Sync {
    /// DTLS parameters are ready; the server must learn them before media flows.
    async fn on_connect(
        &self,
        transport_id: &TransportId,
        dtls_parameters: Value,
    ) -> Result<(), MediaError>;

    /// A producer is being created; resolves to the server-assigned id.
    /// Only called for send transports.
    async fn on_produce(
        &self,
        transport_id: &TransportId,
        kind: MediaKind,
        rtp_parameters: Value,
        app_data: AppData,
    ) -> Result<ProducerId, MediaError>;

    /// Connection state changed (`connected`, `failed`, ...). Informational.
    fn on_connection_state(&self, _transport_id: &TransportId, _state: &str) {}
}

/// Callbacks a producer makes into the session.
pub trait ProducerListener: Send + Sync {
    fn on_closed(&self, producer_id: &ProducerId, reason: ProducerCloseReason);
}

/// A published local stream.
#[async_trait]
pub trait MediaProducer: Send + Sync {
    fn id(&self) -> &ProducerId;
    fn source(&self) -> StreamSource;
    async fn pause(&self) -> Result<(), MediaError>;
    async fn resume(&self) -> Result<(), MediaError>;
    /// Idempotent.
    async fn close(&self);
}

/// A local subscription to a remote producer.
#[async_trait]
pub trait MediaConsumer: Send + Sync {
    fn id(&self) -> &ConsumerId;
    fn producer_id(&self) -> &ProducerId;
    fn kind(&self) -> MediaKind;
    fn track(&self) -> MediaTrack;
    /// Idempotent.
    async fn close(&self);
}

/// One direction of negotiated media.
#[async_trait]
pub trait MediaTransport: Send + Sync {
    fn id(&self) -> &TransportId;
    fn direction(&self) -> TransportDirection;

    /// Publish `track`. Send transports only.
    async fn produce(
        &self,
        track: MediaTrack,
        source: StreamSource,
        listener: Arc<dyn ProducerListener>,
    ) -> Result<Arc<dyn MediaProducer>, MediaError>;

    /// Subscribe to a remote producer. Receive transports only.
    ///
    /// Not safe to call concurrently on the same transport.
    async fn consume(&self, params: ConsumeParams) -> Result<Arc<dyn MediaConsumer>, MediaError>;

    /// Idempotent.
    async fn close(&self);
}

/// The media engine.
#[async_trait]
pub trait MediaEngine: Send + Sync + 'static {
    /// Load the router's capabilities. Must precede transport creation.
    async fn load_capabilities(&self, router_capabilities: &Value) -> Result<(), MediaError>;

    /// Capabilities of this device, sent with every consume request.
    fn local_capabilities(&self) -> Result<Value, MediaError>;

    async fn create_transport(
        &self,
        direction: TransportDirection,
        options: TransportOptions,
        listener: Arc<dyn TransportListener>,
    ) -> Result<Arc<dyn MediaTransport>, MediaError>;

    /// Acquire a capture device and return its track.
    async fn open_capture(&self, request: CaptureRequest) -> Result<MediaTrack, MediaError>;

    /// Start or stop the device behind an open capture without releasing the track.
    async fn set_capture_active(&self, source: StreamSource, active: bool)
        -> Result<(), MediaError>;

    /// Release a capture. Idempotent.
    async fn close_capture(&self, source: StreamSource);

    /// Toggle between front and back camera. Returns whether the front camera is now active.
    async fn switch_camera(&self) -> Result<bool, MediaError>;

    /// Release transports, producers, consumers and tracks. Idempotent.
    ///
    /// The engine stays usable: the next join loads capabilities again.
    async fn dispose(&self);
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    #[test]
    fn test_media_error_conversion() {
        assert_eq!(
            RoomError::from(MediaError::CaptureUnavailable(StreamSource::Camera)),
            RoomError::CaptureUnavailable(StreamSource::Camera)
        );
        assert!(matches!(
            RoomError::from(MediaError::Failed("ice failed".to_string())),
            RoomError::AdapterFailure(ref msg) if msg == "ice failed"
        ));
    }

    #[test]
    fn test_capture_request_debug_redacts_token() {
        let request = CaptureRequest {
            source: StreamSource::Screen,
            front_camera: true,
            screen_token: Some("projection-grant-42".to_string()),
        };
        let output = format!("{request:?}");
        assert!(output.contains("[REDACTED]"));
        assert!(!output.contains("projection-grant-42"));
    }
}
