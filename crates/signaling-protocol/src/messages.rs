//! Client operations and their payloads.
//!
//! Field names follow the server's camelCase convention. The owning peer
//! of a producer is sent as `socketId`; older servers use `ownerId`.

use common::types::{
    ConsumerId, MediaKind, PeerId, ProducerId, RoomId, StreamSource, TransportId,
};
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;

/// Operation names sent by the client.
pub mod op {
    pub const JOIN_ROOM: &str = "joinRoom";
    pub const CREATE_TRANSPORT: &str = "createWebRtcTransport";
    pub const CONNECT_TRANSPORT: &str = "connectTransport";
    pub const PRODUCE: &str = "produce";
    pub const CONSUME: &str = "consume";
    /// Resume a server-side consumer (consumers start paused).
    pub const RESUME_CONSUMER: &str = "resume";
    pub const PAUSE_PRODUCER: &str = "pauseProducer";
    pub const RESUME_PRODUCER: &str = "resumeProducer";
    pub const CLOSE_PRODUCER: &str = "closeProducer";
}

/// Application metadata attached to a producer.
///
/// The source tag is application-defined. Tags this client does not know
/// decode as `None`, leaving classification to the media kind.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AppData {
    #[serde(
        default,
        deserialize_with = "known_source",
        skip_serializing_if = "Option::is_none"
    )]
    pub source: Option<StreamSource>,
}

fn known_source<'de, D>(deserializer: D) -> Result<Option<StreamSource>, D::Error>
where
    D: Deserializer<'de>,
{
    let raw = Option::<Value>::deserialize(deserializer)?;
    Ok(raw.and_then(|value| serde_json::from_value(value).ok()))
}

impl AppData {
    #[must_use]
    pub fn with_source(source: StreamSource) -> Self {
        Self {
            source: Some(source),
        }
    }
}

/// A published stream as announced by the server, either in the join
/// response or in a `newProducer` push.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProducerAnnouncement {
    #[serde(alias = "id")]
    pub producer_id: ProducerId,
    #[serde(rename = "socketId", alias = "ownerId")]
    pub owner_id: PeerId,
    pub kind: MediaKind,
    #[serde(default)]
    pub paused: bool,
    #[serde(default)]
    pub app_data: AppData,
}

impl ProducerAnnouncement {
    /// Source tag, if the publisher set one.
    #[must_use]
    pub fn source(&self) -> Option<StreamSource> {
        self.app_data.source
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct JoinRoomRequest {
    pub room_id: RoomId,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct JoinRoomResponse {
    /// Router RTP capabilities, opaque to the client.
    pub rtp_capabilities: Value,
    #[serde(default, alias = "peers")]
    pub existing_peers: Vec<PeerId>,
    #[serde(default, alias = "producers")]
    pub existing_producers: Vec<ProducerAnnouncement>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct CreateTransportRequest {
    pub sender: bool,
}

/// Connection parameters for a server-side WebRTC transport.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TransportOptions {
    #[serde(alias = "id")]
    pub transport_id: TransportId,
    pub ice_parameters: Value,
    pub ice_candidates: Value,
    pub dtls_parameters: Value,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConnectTransportRequest {
    pub transport_id: TransportId,
    pub dtls_parameters: Value,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProduceRequest {
    pub transport_id: TransportId,
    pub kind: MediaKind,
    pub rtp_parameters: Value,
    #[serde(default)]
    pub app_data: AppData,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProduceResponse {
    #[serde(alias = "producerId")]
    pub id: ProducerId,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConsumeRequest {
    pub producer_id: ProducerId,
    pub transport_id: TransportId,
    pub rtp_capabilities: Value,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConsumeResponse {
    #[serde(rename = "id", alias = "consumerId")]
    pub consumer_id: ConsumerId,
    pub producer_id: ProducerId,
    pub kind: MediaKind,
    pub rtp_parameters: Value,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResumeConsumerRequest {
    pub consumer_id: ConsumerId,
}

/// Payload of `pauseProducer`, `resumeProducer` and `closeProducer`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProducerRequest {
    pub producer_id: ProducerId,
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_join_response_with_existing_producers() {
        let response: JoinRoomResponse = serde_json::from_value(json!({
            "rtpCapabilities": {"codecs": []},
            "existingPeers": ["u1"],
            "existingProducers": [
                {"producerId": "p1", "socketId": "u1", "kind": "video", "paused": true,
                 "appData": {"source": "screen"}},
                {"producerId": "p2", "ownerId": "u1", "kind": "audio"}
            ]
        }))
        .unwrap();

        assert_eq!(response.existing_peers, vec![PeerId::new("u1")]);
        assert_eq!(response.existing_producers.len(), 2);

        let screen = response.existing_producers.first().unwrap();
        assert!(screen.paused);
        assert_eq!(screen.source(), Some(StreamSource::Screen));

        let mic = response.existing_producers.get(1).unwrap();
        assert_eq!(mic.owner_id.as_str(), "u1");
        assert!(!mic.paused);
        assert_eq!(mic.source(), None);
    }

    #[test]
    fn test_join_response_defaults_missing_lists() {
        let response: JoinRoomResponse =
            serde_json::from_value(json!({"rtpCapabilities": {}})).unwrap();
        assert!(response.existing_peers.is_empty());
        assert!(response.existing_producers.is_empty());
    }

    #[test]
    fn test_unknown_source_tag_decodes_as_untagged() {
        let response: JoinRoomResponse = serde_json::from_value(json!({
            "rtpCapabilities": {},
            "existingProducers": [
                {"producerId": "p1", "socketId": "u1", "kind": "video",
                 "appData": {"source": "screenAudio", "label": "desk"}},
                {"producerId": "p2", "socketId": "u1", "kind": "audio",
                 "appData": {"source": 7}},
                {"producerId": "p3", "socketId": "u1", "kind": "video",
                 "appData": {"source": null}}
            ]
        }))
        .unwrap();

        assert_eq!(response.existing_producers.len(), 3);
        assert!(response
            .existing_producers
            .iter()
            .all(|producer| producer.source().is_none()));
    }

    #[test]
    fn test_transport_options_accept_id_alias() {
        let options: TransportOptions = serde_json::from_value(json!({
            "id": "t1",
            "iceParameters": {},
            "iceCandidates": [],
            "dtlsParameters": {}
        }))
        .unwrap();
        assert_eq!(options.transport_id.as_str(), "t1");
    }

    #[test]
    fn test_produce_request_carries_source_tag() {
        let request = ProduceRequest {
            transport_id: TransportId::new("t1"),
            kind: MediaKind::Video,
            rtp_parameters: json!({}),
            app_data: AppData::with_source(StreamSource::Camera),
        };
        let value = serde_json::to_value(&request).unwrap();
        assert_eq!(value["transportId"], "t1");
        assert_eq!(value["appData"]["source"], "webcam");
    }

    #[test]
    fn test_consume_response_id_field() {
        let response: ConsumeResponse = serde_json::from_value(json!({
            "id": "c1",
            "producerId": "p1",
            "kind": "audio",
            "rtpParameters": {}
        }))
        .unwrap();
        assert_eq!(response.consumer_id.as_str(), "c1");
        assert_eq!(response.kind, MediaKind::Audio);
    }
}
