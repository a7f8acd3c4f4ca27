//! Push events sent by the signaling server.

use crate::codec::{from_payload, to_payload, CodecError};
use crate::frame::InboundFrame;
use crate::messages::{AppData, ProducerAnnouncement};
use common::types::{ConsumerId, MediaKind, PeerId, ProducerId, StreamKind};
use serde::{Deserialize, Serialize};

/// Push event names.
pub mod name {
    pub const PEER_JOINED: &str = "peerJoined";
    pub const PEER_LEFT: &str = "peerLeave";
    pub const NEW_PRODUCER: &str = "newProducer";
    pub const CONSUMER_CLOSED: &str = "consumerClosed";
    pub const PRODUCER_PAUSED: &str = "producerPaused";
    pub const PRODUCER_RESUMED: &str = "producerResumed";
    pub const PRODUCER_SCORE: &str = "producerScore";
    pub const ACTIVE_SPEAKER: &str = "activeSpeaker";

    /// Every push event the client understands.
    pub const ALL: &[&str] = &[
        PEER_JOINED,
        PEER_LEFT,
        NEW_PRODUCER,
        CONSUMER_CLOSED,
        PRODUCER_PAUSED,
        PRODUCER_RESUMED,
        PRODUCER_SCORE,
        ACTIVE_SPEAKER,
    ];
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PeerNotice {
    #[serde(rename = "socketId", alias = "id", alias = "peerId")]
    pub peer_id: PeerId,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConsumerClosedNotice {
    pub consumer_id: ConsumerId,
}

/// Pause or resume of a remote producer.
///
/// Only the producer id is guaranteed. When the pause overtakes the
/// `newProducer` announcement, the owner and kind (if sent) are recorded
/// on the stub, so the stub leaves with its owner.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProducerStateNotice {
    pub producer_id: ProducerId,
    #[serde(
        default,
        rename = "socketId",
        alias = "ownerId",
        skip_serializing_if = "Option::is_none"
    )]
    pub owner_id: Option<PeerId>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub kind: Option<MediaKind>,
    #[serde(default)]
    pub app_data: AppData,
}

impl ProducerStateNotice {
    /// Stream classification, when the server sent the media kind.
    #[must_use]
    pub fn stream_kind(&self) -> Option<StreamKind> {
        self.kind.map(|kind| StreamKind::classify(kind, self.app_data.source))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScoreEntry {
    pub score: u32,
}

/// Transmission quality report for one producer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProducerScoreNotice {
    pub producer_id: ProducerId,
    #[serde(default)]
    pub score: Vec<ScoreEntry>,
}

impl ProducerScoreNotice {
    /// Score of the first encoding, the only one the client tracks.
    #[must_use]
    pub fn primary_score(&self) -> Option<u32> {
        self.score.first().map(|entry| entry.score)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AudioLevel {
    #[serde(rename = "producerId", alias = "audioProducerId")]
    pub producer_id: ProducerId,
    /// Level in dBov, 0 is loudest.
    #[serde(rename = "levelDb", alias = "volume")]
    pub level_db: f64,
}

/// A decoded server push.
#[derive(Debug, Clone, PartialEq)]
pub enum ServerEvent {
    PeerJoined(PeerNotice),
    PeerLeft(PeerNotice),
    NewProducer(ProducerAnnouncement),
    ConsumerClosed(ConsumerClosedNotice),
    ProducerPaused(ProducerStateNotice),
    ProducerResumed(ProducerStateNotice),
    ProducerScore(ProducerScoreNotice),
    ActiveSpeaker(Vec<AudioLevel>),
}

impl ServerEvent {
    /// Decode a push event from its name and payload.
    ///
    /// # Errors
    ///
    /// Returns `UnknownEvent` for names outside [`name`], or `InvalidPayload`
    /// if the payload does not match the event.
    pub fn decode(event: &str, data: serde_json::Value) -> Result<Self, CodecError> {
        Ok(match event {
            name::PEER_JOINED => ServerEvent::PeerJoined(from_payload(event, data)?),
            name::PEER_LEFT => ServerEvent::PeerLeft(from_payload(event, data)?),
            name::NEW_PRODUCER => ServerEvent::NewProducer(from_payload(event, data)?),
            name::CONSUMER_CLOSED => ServerEvent::ConsumerClosed(from_payload(event, data)?),
            name::PRODUCER_PAUSED => ServerEvent::ProducerPaused(from_payload(event, data)?),
            name::PRODUCER_RESUMED => ServerEvent::ProducerResumed(from_payload(event, data)?),
            name::PRODUCER_SCORE => ServerEvent::ProducerScore(from_payload(event, data)?),
            name::ACTIVE_SPEAKER => ServerEvent::ActiveSpeaker(from_payload(event, data)?),
            other => return Err(CodecError::UnknownEvent(other.to_string())),
        })
    }

    /// Wire name of this event.
    #[must_use]
    pub fn name(&self) -> &'static str {
        match self {
            ServerEvent::PeerJoined(_) => name::PEER_JOINED,
            ServerEvent::PeerLeft(_) => name::PEER_LEFT,
            ServerEvent::NewProducer(_) => name::NEW_PRODUCER,
            ServerEvent::ConsumerClosed(_) => name::CONSUMER_CLOSED,
            ServerEvent::ProducerPaused(_) => name::PRODUCER_PAUSED,
            ServerEvent::ProducerResumed(_) => name::PRODUCER_RESUMED,
            ServerEvent::ProducerScore(_) => name::PRODUCER_SCORE,
            ServerEvent::ActiveSpeaker(_) => name::ACTIVE_SPEAKER,
        }
    }

    /// Build the push frame for this event (server side).
    ///
    /// # Errors
    ///
    /// Returns an error if the payload cannot be serialized.
    pub fn to_frame(&self) -> Result<InboundFrame, CodecError> {
        let event = self.name();
        let data = match self {
            ServerEvent::PeerJoined(notice) | ServerEvent::PeerLeft(notice) => {
                to_payload(event, notice)?
            }
            ServerEvent::NewProducer(announcement) => to_payload(event, announcement)?,
            ServerEvent::ConsumerClosed(notice) => to_payload(event, notice)?,
            ServerEvent::ProducerPaused(notice) | ServerEvent::ProducerResumed(notice) => {
                to_payload(event, notice)?
            }
            ServerEvent::ProducerScore(notice) => to_payload(event, notice)?,
            ServerEvent::ActiveSpeaker(levels) => to_payload(event, levels)?,
        };
        Ok(InboundFrame::Event {
            event: event.to_string(),
            data,
        })
    }
}
