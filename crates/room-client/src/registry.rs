//! Peer and stream registry.
//!
//! Plain data owned by the room session actor. Maps are held behind `Arc`
//! and mutated through `Arc::make_mut`, so a published snapshot is never
//! touched by later updates and publishing one costs two pointer copies.
//!
//! Streams may exist before their announcement: a pause or resume for an
//! unknown producer creates a stub, and the announcement fills it in
//! without losing the observed pause state. A stub records the owner when
//! the server names one and leaves with that peer. Stubs with no owner are
//! dropped on the next peer departure.

use crate::media::MediaTrack;
use common::types::{ConsumerId, PeerId, ProducerId, StreamKind};
use std::collections::HashMap;
use std::sync::Arc;
use tracing::debug;

/// Network score before the server reports one.
pub const DEFAULT_NETWORK_SCORE: u8 = 10;

/// Highest value on the volume and score scales.
pub const MAX_LEVEL: u8 = 10;

/// Map an audio level in dB to the 0-10 volume scale.
#[must_use]
pub fn volume_level(level_db: f64) -> u8 {
    if level_db >= -20.0 {
        10
    } else if level_db >= -40.0 {
        7
    } else if level_db >= -60.0 {
        4
    } else if level_db >= -80.0 {
        1
    } else {
        0
    }
}

/// Clamp a server score to the 0-10 scale.
#[must_use]
pub fn clamp_score(score: u32) -> u8 {
    u8::try_from(score.min(u32::from(MAX_LEVEL))).unwrap_or(MAX_LEVEL)
}

/// A remote participant.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Peer {
    pub id: PeerId,
    pub video_producer_id: Option<ProducerId>,
    pub audio_producer_id: Option<ProducerId>,
    pub screen_producer_id: Option<ProducerId>,
}

impl Peer {
    fn new(id: PeerId) -> Self {
        Self {
            id,
            video_producer_id: None,
            audio_producer_id: None,
            screen_producer_id: None,
        }
    }

    /// Producer currently published for `kind`.
    #[must_use]
    pub fn producer(&self, kind: StreamKind) -> Option<&ProducerId> {
        match kind {
            StreamKind::Audio => self.audio_producer_id.as_ref(),
            StreamKind::Video => self.video_producer_id.as_ref(),
            StreamKind::Screen => self.screen_producer_id.as_ref(),
        }
    }

    fn slot_mut(&mut self, kind: StreamKind) -> &mut Option<ProducerId> {
        match kind {
            StreamKind::Audio => &mut self.audio_producer_id,
            StreamKind::Video => &mut self.video_producer_id,
            StreamKind::Screen => &mut self.screen_producer_id,
        }
    }
}

/// One remote published stream.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StreamState {
    pub producer_id: ProducerId,
    /// Owning peer; absent for a stub created by an early pause/resume.
    pub owner: Option<PeerId>,
    /// Classification; absent for a stub.
    pub kind: Option<StreamKind>,
    pub paused: bool,
    pub network_score: u8,
    pub volume: u8,
    /// Consumer subscribed to this stream, once consumption succeeded.
    pub consumer_id: Option<ConsumerId>,
    /// Renderable track, once consumption succeeded.
    pub track: Option<MediaTrack>,
    /// Whether the server has announced this stream.
    pub announced: bool,
}

impl StreamState {
    fn stub(producer_id: ProducerId) -> Self {
        Self {
            producer_id,
            owner: None,
            kind: None,
            paused: false,
            network_score: DEFAULT_NETWORK_SCORE,
            volume: 0,
            consumer_id: None,
            track: None,
            announced: false,
        }
    }

    /// Whether the stream has a track to render.
    #[must_use]
    pub fn is_rendering(&self) -> bool {
        self.track.is_some()
    }
}

/// Owner and kind known from a pause or resume, used to fill a stub.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StubHint {
    pub owner: Option<PeerId>,
    pub kind: Option<StreamKind>,
}

/// A stream announcement, from the join response or a `newProducer` push.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StreamAnnouncement {
    pub producer_id: ProducerId,
    pub owner: PeerId,
    pub kind: StreamKind,
    pub paused: bool,
}

/// Known peers and streams.
#[derive(Debug, Clone, Default)]
pub struct Registry {
    peers: Arc<HashMap<PeerId, Peer>>,
    streams: Arc<HashMap<ProducerId, StreamState>>,
}

impl Registry {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Immutable view of the peers.
    #[must_use]
    pub fn peers(&self) -> Arc<HashMap<PeerId, Peer>> {
        Arc::clone(&self.peers)
    }

    /// Immutable view of the streams.
    #[must_use]
    pub fn streams(&self) -> Arc<HashMap<ProducerId, StreamState>> {
        Arc::clone(&self.streams)
    }

    #[must_use]
    pub fn peer(&self, id: &PeerId) -> Option<&Peer> {
        self.peers.get(id)
    }

    #[must_use]
    pub fn stream(&self, id: &ProducerId) -> Option<&StreamState> {
        self.streams.get(id)
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.peers.is_empty() && self.streams.is_empty()
    }

    /// Insert a peer if absent. Returns whether it was inserted.
    pub fn upsert_peer(&mut self, id: PeerId) -> bool {
        if self.peers.contains_key(&id) {
            return false;
        }
        Arc::make_mut(&mut self.peers).insert(id.clone(), Peer::new(id));
        true
    }

    /// Record `producer_id` as the peer's stream of `kind`, creating the peer if needed.
    pub fn attach_producer(&mut self, peer_id: &PeerId, kind: StreamKind, producer_id: ProducerId) {
        let peer = Arc::make_mut(&mut self.peers)
            .entry(peer_id.clone())
            .or_insert_with(|| Peer::new(peer_id.clone()));
        *peer.slot_mut(kind) = Some(producer_id);
    }

    /// Clear `producer_id` from whichever peer slot holds it.
    pub fn detach_producer(&mut self, owner: &PeerId, producer_id: &ProducerId) {
        let holds = self.peers.get(owner).is_some_and(|peer| {
            [StreamKind::Audio, StreamKind::Video, StreamKind::Screen]
                .into_iter()
                .any(|kind| peer.producer(kind) == Some(producer_id))
        });
        if !holds {
            return;
        }
        if let Some(peer) = Arc::make_mut(&mut self.peers).get_mut(owner) {
            for kind in [StreamKind::Audio, StreamKind::Video, StreamKind::Screen] {
                let slot = peer.slot_mut(kind);
                if slot.as_ref() == Some(producer_id) {
                    *slot = None;
                }
            }
        }
    }

    /// Record an announced stream and attach it to its owner.
    ///
    /// Returns `true` if the stream was not announced before, meaning the
    /// caller should consume it. A stub keeps its pause state.
    pub fn announce_stream(&mut self, announcement: StreamAnnouncement) -> bool {
        let StreamAnnouncement {
            producer_id,
            owner,
            kind,
            paused,
        } = announcement;

        self.attach_producer(&owner, kind, producer_id.clone());

        let streams = Arc::make_mut(&mut self.streams);
        match streams.get_mut(&producer_id) {
            Some(existing) if existing.announced => {
                debug!(
                    target: "room.registry",
                    producer_id = %producer_id,
                    "Duplicate stream announcement"
                );
                false
            }
            Some(stub) => {
                stub.owner = Some(owner);
                stub.kind = Some(kind);
                stub.announced = true;
                true
            }
            None => {
                let mut state = StreamState::stub(producer_id.clone());
                state.owner = Some(owner);
                state.kind = Some(kind);
                state.paused = paused;
                state.announced = true;
                streams.insert(producer_id, state);
                true
            }
        }
    }

    /// Set the pause flag, creating a stub for an unknown producer.
    ///
    /// `hint` fills in whatever an unannounced stub is still missing.
    pub fn set_paused(&mut self, producer_id: &ProducerId, paused: bool, hint: StubHint) {
        let stream = Arc::make_mut(&mut self.streams)
            .entry(producer_id.clone())
            .or_insert_with(|| StreamState::stub(producer_id.clone()));
        stream.paused = paused;
        if !stream.announced {
            stream.owner = stream.owner.take().or(hint.owner);
            stream.kind = stream.kind.or(hint.kind);
        }
    }

    /// Set the network score of a known stream. Returns whether it exists.
    pub fn set_network_score(&mut self, producer_id: &ProducerId, score: u8) -> bool {
        self.update_stream(producer_id, |stream| stream.network_score = score.min(MAX_LEVEL))
    }

    /// Set the volume of a known stream. Returns whether it exists.
    pub fn set_volume(&mut self, producer_id: &ProducerId, volume: u8) -> bool {
        self.update_stream(producer_id, |stream| stream.volume = volume.min(MAX_LEVEL))
    }

    /// Attach a consumed track. Returns `false` if the stream is gone.
    pub fn attach_track(
        &mut self,
        producer_id: &ProducerId,
        consumer_id: ConsumerId,
        track: MediaTrack,
    ) -> bool {
        self.update_stream(producer_id, |stream| {
            stream.consumer_id = Some(consumer_id);
            stream.track = Some(track);
        })
    }

    /// Remove a stream and detach it from its owner.
    pub fn remove_stream(&mut self, producer_id: &ProducerId) -> Option<StreamState> {
        if !self.streams.contains_key(producer_id) {
            return None;
        }
        let removed = Arc::make_mut(&mut self.streams).remove(producer_id)?;
        if let Some(owner) = &removed.owner {
            self.detach_producer(owner, producer_id);
        }
        Some(removed)
    }

    /// Remove a peer and every stream it owns.
    ///
    /// Unannounced stubs owned by the peer or by nobody are dropped as
    /// well, even when the peer itself is unknown. They never have a
    /// consumer, so they are not returned.
    pub fn remove_peer(&mut self, peer_id: &PeerId) -> Option<(Peer, Vec<StreamState>)> {
        let stale: Vec<ProducerId> = self
            .streams
            .values()
            .filter(|stream| {
                !stream.announced
                    && (stream.owner.is_none() || stream.owner.as_ref() == Some(peer_id))
            })
            .map(|stream| stream.producer_id.clone())
            .collect();
        if !stale.is_empty() {
            let map = Arc::make_mut(&mut self.streams);
            for id in &stale {
                map.remove(id);
            }
            debug!(
                target: "room.registry",
                peer_id = %peer_id,
                stubs = stale.len(),
                "Dropped unannounced streams"
            );
        }

        if !self.peers.contains_key(peer_id) {
            return None;
        }
        let peer = Arc::make_mut(&mut self.peers).remove(peer_id)?;

        let owned: Vec<ProducerId> = self
            .streams
            .values()
            .filter(|stream| stream.owner.as_ref() == Some(peer_id))
            .map(|stream| stream.producer_id.clone())
            .collect();

        let streams = if owned.is_empty() {
            Vec::new()
        } else {
            let map = Arc::make_mut(&mut self.streams);
            owned.iter().filter_map(|id| map.remove(id)).collect()
        };
        Some((peer, streams))
    }

    /// Empty the registry, returning every stream still held.
    pub fn clear(&mut self) -> Vec<StreamState> {
        self.peers = Arc::default();
        let streams = std::mem::take(&mut self.streams);
        match Arc::try_unwrap(streams) {
            Ok(map) => map.into_values().collect(),
            Err(shared) => shared.values().cloned().collect(),
        }
    }

    fn update_stream(&mut self, producer_id: &ProducerId, apply: impl FnOnce(&mut StreamState)) -> bool {
        if !self.streams.contains_key(producer_id) {
            return false;
        }
        match Arc::make_mut(&mut self.streams).get_mut(producer_id) {
            Some(stream) => {
                apply(stream);
                true
            }
            None => false,
        }
    }
}
