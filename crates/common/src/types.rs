//! Common data types for Roomcast components.
//!
//! Identifiers are assigned by the signaling server (or, for consumers and
//! transports, by the server on our behalf) and are opaque strings on the
//! client side. Each gets its own newtype so a producer id can never be
//! passed where a consumer id is expected.

use serde::{Deserialize, Serialize};
use std::fmt;

macro_rules! string_id {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(String);

        impl $name {
            /// Wrap a raw identifier.
            #[must_use]
            pub fn new(id: impl Into<String>) -> Self {
                Self(id.into())
            }

            /// Borrow the raw identifier.
            #[must_use]
            pub fn as_str(&self) -> &str {
                &self.0
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(&self.0)
            }
        }

        impl From<&str> for $name {
            fn from(id: &str) -> Self {
                Self(id.to_string())
            }
        }

        impl From<String> for $name {
            fn from(id: String) -> Self {
                Self(id)
            }
        }
    };
}

string_id!(
    /// Identifier of a room on the signaling server.
    RoomId
);
string_id!(
    /// Server-assigned identifier of a remote participant (its socket id).
    PeerId
);
string_id!(
    /// Server-assigned identifier of a published media stream.
    ProducerId
);
string_id!(
    /// Identifier of a local subscription to a remote producer.
    ConsumerId
);
string_id!(
    /// Identifier of a send or receive transport.
    TransportId
);

/// Media kind as negotiated by the media engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MediaKind {
    Audio,
    Video,
}

impl MediaKind {
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            MediaKind::Audio => "audio",
            MediaKind::Video => "video",
        }
    }
}

impl fmt::Display for MediaKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Application-level purpose of a stream, carried in the producer's
/// `appData.source`. Camera and screen share are both `video`; only the
/// source tells them apart.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum StreamSource {
    #[serde(rename = "webcam")]
    Camera,
    #[serde(rename = "mic")]
    Microphone,
    #[serde(rename = "screen")]
    Screen,
}

impl StreamSource {
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            StreamSource::Camera => "webcam",
            StreamSource::Microphone => "mic",
            StreamSource::Screen => "screen",
        }
    }

    /// Media kind a local producer of this source publishes.
    #[must_use]
    pub const fn media_kind(&self) -> MediaKind {
        match self {
            StreamSource::Microphone => MediaKind::Audio,
            StreamSource::Camera | StreamSource::Screen => MediaKind::Video,
        }
    }
}

impl fmt::Display for StreamSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Classification of a remote stream for rendering and per-peer bookkeeping.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StreamKind {
    Audio,
    Video,
    Screen,
}

impl StreamKind {
    /// Classify a stream from its media kind and source tag.
    ///
    /// Audio is always audio; video is a screen share only when tagged so.
    #[must_use]
    pub fn classify(kind: MediaKind, source: Option<StreamSource>) -> Self {
        match (kind, source) {
            (MediaKind::Audio, _) => StreamKind::Audio,
            (MediaKind::Video, Some(StreamSource::Screen)) => StreamKind::Screen,
            (MediaKind::Video, _) => StreamKind::Video,
        }
    }

    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            StreamKind::Audio => "audio",
            StreamKind::Video => "video",
            StreamKind::Screen => "screen",
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    #[test]
    fn test_ids_serialize_transparently() {
        let id = ProducerId::new("p1");
        assert_eq!(serde_json::to_string(&id).unwrap(), "\"p1\"");

        let parsed: PeerId = serde_json::from_str("\"socket-9\"").unwrap();
        assert_eq!(parsed.as_str(), "socket-9");
        assert_eq!(parsed.to_string(), "socket-9");
    }

    #[test]
    fn test_stream_source_wire_names() {
        assert_eq!(
            serde_json::to_string(&StreamSource::Camera).unwrap(),
            "\"webcam\""
        );
        let source: StreamSource = serde_json::from_str("\"screen\"").unwrap();
        assert_eq!(source, StreamSource::Screen);
        assert_eq!(StreamSource::Microphone.media_kind(), MediaKind::Audio);
    }

    #[test]
    fn test_classify_distinguishes_screen_from_camera() {
        assert_eq!(
            StreamKind::classify(MediaKind::Video, Some(StreamSource::Screen)),
            StreamKind::Screen
        );
        assert_eq!(
            StreamKind::classify(MediaKind::Video, Some(StreamSource::Camera)),
            StreamKind::Video
        );
        assert_eq!(StreamKind::classify(MediaKind::Video, None), StreamKind::Video);
        // A mislabeled audio stream is still audio
        assert_eq!(
            StreamKind::classify(MediaKind::Audio, Some(StreamSource::Screen)),
            StreamKind::Audio
        );
    }
}
