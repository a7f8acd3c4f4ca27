//! Message types for the room session actor.
//!
//! Intents from the UI carry a `respond_to` oneshot. Channel lifecycle,
//! server pushes and background task results are fire-and-forget.

use crate::errors::RoomError;
use crate::media::{AudioOutput, MediaConsumer, ProducerCloseReason};
use crate::registry::{Peer, StreamState};

use common::types::{PeerId, ProducerId, RoomId, StreamSource};
use signaling_protocol::ServerEvent;
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use tokio::sync::oneshot;

/// Membership lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum SessionState {
    #[default]
    Idle,
    Joining,
    Joined,
    Leaving,
}

impl SessionState {
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            SessionState::Idle => "idle",
            SessionState::Joining => "joining",
            SessionState::Joined => "joined",
            SessionState::Leaving => "leaving",
        }
    }
}

impl fmt::Display for SessionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Local capture and publish flags.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LocalMediaState {
    pub camera_open: bool,
    pub mic_open: bool,
    pub screen_share_open: bool,
    pub front_camera: bool,
    /// Own speaking volume, 0-10.
    pub local_volume: u8,
}

impl LocalMediaState {
    /// Everything off, with the given camera facing.
    #[must_use]
    pub const fn with_front_camera(front_camera: bool) -> Self {
        Self {
            camera_open: false,
            mic_open: false,
            screen_share_open: false,
            front_camera,
            local_volume: 0,
        }
    }
}

impl Default for LocalMediaState {
    fn default() -> Self {
        Self::with_front_camera(true)
    }
}

/// Immutable view of the session published to observers.
#[derive(Debug, Clone, Default)]
pub struct RoomSnapshot {
    pub session_state: SessionState,
    /// Room being joined or joined; `None` when idle.
    pub room_id: Option<RoomId>,
    pub signaling_connected: bool,
    pub local: LocalMediaState,
    pub peers: Arc<HashMap<PeerId, Peer>>,
    pub streams: Arc<HashMap<ProducerId, StreamState>>,
}

impl RoomSnapshot {
    #[must_use]
    pub fn is_joined(&self) -> bool {
        self.session_state == SessionState::Joined
    }

    /// Streams owned by `peer`.
    pub fn streams_of<'a>(&'a self, peer: &'a PeerId) -> impl Iterator<Item = &'a StreamState> {
        self.streams
            .values()
            .filter(move |stream| stream.owner.as_ref() == Some(peer))
    }

    /// Cheap equality: maps compare by identity.
    pub(crate) fn same_as(&self, other: &RoomSnapshot) -> bool {
        self.session_state == other.session_state
            && self.room_id == other.room_id
            && self.signaling_connected == other.signaling_connected
            && self.local == other.local
            && Arc::ptr_eq(&self.peers, &other.peers)
            && Arc::ptr_eq(&self.streams, &other.streams)
    }
}

/// Messages handled by the `RoomSession` actor.
pub(crate) enum SessionMessage {
    Join {
        room_id: RoomId,
        respond_to: oneshot::Sender<Result<(), RoomError>>,
    },
    Leave {
        respond_to: oneshot::Sender<()>,
    },
    StartLocalMedia {
        camera: bool,
        mic: bool,
        respond_to: oneshot::Sender<Result<LocalMediaState, RoomError>>,
    },
    ToggleMic {
        respond_to: oneshot::Sender<Result<bool, RoomError>>,
    },
    ToggleCamera {
        respond_to: oneshot::Sender<Result<bool, RoomError>>,
    },
    ToggleScreenShare {
        token: Option<String>,
        respond_to: oneshot::Sender<Result<bool, RoomError>>,
    },
    FlipCamera {
        respond_to: oneshot::Sender<Result<bool, RoomError>>,
    },
    SwitchAudioOutput {
        output: AudioOutput,
        respond_to: oneshot::Sender<Result<(), RoomError>>,
    },

    ChannelConnected,
    ChannelDisconnected,
    ReconnectFailed,

    Server(ServerEvent),

    /// A consume task obtained its consumer. The reply says whether the
    /// stream is still wanted; on `false` the consumer is already closed.
    StreamReady {
        membership: u64,
        producer_id: ProducerId,
        consumer: Arc<dyn MediaConsumer>,
        respond_to: oneshot::Sender<bool>,
    },

    LocalProducerClosed {
        source: StreamSource,
        producer_id: ProducerId,
        reason: ProducerCloseReason,
    },
}

impl SessionMessage {
    /// Bounded label for logs.
    pub(crate) fn label(&self) -> &'static str {
        match self {
            SessionMessage::Join { .. } => "join",
            SessionMessage::Leave { .. } => "leave",
            SessionMessage::StartLocalMedia { .. } => "start_local_media",
            SessionMessage::ToggleMic { .. } => "toggle_mic",
            SessionMessage::ToggleCamera { .. } => "toggle_camera",
            SessionMessage::ToggleScreenShare { .. } => "toggle_screen_share",
            SessionMessage::FlipCamera { .. } => "flip_camera",
            SessionMessage::SwitchAudioOutput { .. } => "switch_audio_output",
            SessionMessage::ChannelConnected => "channel_connected",
            SessionMessage::ChannelDisconnected => "channel_disconnected",
            SessionMessage::ReconnectFailed => "reconnect_failed",
            SessionMessage::Server(event) => event.name(),
            SessionMessage::StreamReady { .. } => "stream_ready",
            SessionMessage::LocalProducerClosed { .. } => "local_producer_closed",
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    #[test]
    fn test_local_media_defaults() {
        let local = LocalMediaState::default();
        assert!(!local.camera_open);
        assert!(!local.mic_open);
        assert!(!local.screen_share_open);
        assert!(local.front_camera);
        assert_eq!(local.local_volume, 0);
    }

    #[test]
    fn test_snapshot_same_as_compares_maps_by_identity() {
        let a = RoomSnapshot::default();
        let b = a.clone();
        assert!(a.same_as(&b));

        let c = RoomSnapshot {
            peers: Arc::new(HashMap::new()),
            ..a.clone()
        };
        assert!(!a.same_as(&c));

        let d = RoomSnapshot {
            session_state: SessionState::Joining,
            ..a.clone()
        };
        assert!(!a.same_as(&d));
    }

    #[test]
    fn test_session_state_labels() {
        assert_eq!(SessionState::default(), SessionState::Idle);
        assert_eq!(SessionState::Joined.to_string(), "joined");
    }
}
