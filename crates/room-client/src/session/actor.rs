//! `RoomSession` - the room membership actor.
//!
//! One actor per room client. It owns the signaling channel, the media
//! engine, the registry and local media state, and processes intents,
//! channel lifecycle, server pushes and consume results one at a time.
//!
//! # Membership
//!
//! Every join attempt opens a membership scope (a child cancellation
//! token plus a generation number). Consume tasks run inside it; leave
//! cancels it before disposing the receive transport. Results arriving
//! from an older generation are discarded.
//!
//! # Link loss
//!
//! Losing the signaling link while joined drops the membership (the
//! server forgets it too) but keeps the room id. The session goes back
//! to `Joining` and the next `connect` from the channel joins again. A
//! `connect` that arrives while still joined is ignored and cancels
//! nothing.

use super::consume::{spawn_consume, ConsumeContext};
use super::latch::JoinLatch;
use super::listeners::{MailboxProducerListener, SignalingTransportListener};
use super::mailbox::{Mailbox, MailboxMonitor, WeakMailbox};
use super::messages::{LocalMediaState, RoomSnapshot, SessionMessage, SessionState};
use crate::config::Config;
use crate::errors::RoomError;
use crate::media::{
    AudioOutput, CallPlatform, CaptureRequest, MediaConsumer, MediaEngine, MediaProducer,
    MediaTransport, ProducerCloseReason, TransportDirection,
};
use crate::observability::metrics;
use crate::registry::{clamp_score, volume_level, Registry, StreamAnnouncement, StubHint};
use crate::signaling::{
    ChannelOptions, SignalingChannel, SignalingConnector, EVENT_CONNECT, EVENT_DISCONNECT,
    EVENT_RECONNECT_FAILED,
};

use common::types::{ConsumerId, ProducerId, RoomId, StreamKind, StreamSource};
use dashmap::DashMap;
use signaling_protocol::events::{name, AudioLevel, ProducerStateNotice};
use signaling_protocol::messages::{
    op, CreateTransportRequest, JoinRoomRequest, JoinRoomResponse, ProducerAnnouncement,
    ProducerRequest, TransportOptions,
};
use signaling_protocol::ServerEvent;
use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;
use tokio::sync::{mpsc, oneshot, watch};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, instrument, warn};

/// State shared between the handle and the actor.
#[derive(Debug)]
struct SessionShared {
    /// Scope of the current membership. Cancelled by `leave` before the
    /// leave message is queued, so a join in progress stops early.
    membership: Mutex<CancellationToken>,
}

impl SessionShared {
    fn abort_membership(&self) {
        self.membership
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .cancel();
    }

    fn replace_membership(&self, token: CancellationToken) {
        *self
            .membership
            .lock()
            .unwrap_or_else(PoisonError::into_inner) = token;
    }
}

/// Handle to a `RoomSession`. Cheap to clone.
#[derive(Clone)]
pub struct RoomSessionHandle {
    mailbox: Mailbox,
    snapshot: watch::Receiver<Arc<RoomSnapshot>>,
    shared: Arc<SessionShared>,
    cancel_token: CancellationToken,
}

impl RoomSessionHandle {
    /// Join `room_id`. Resolves once the session is `Joined`.
    ///
    /// # Errors
    ///
    /// - `InvalidState` if a membership already exists
    /// - `JoinAborted` if `leave` is called before the join completes
    /// - any signaling or media error that aborted the join
    pub async fn join(&self, room_id: impl Into<RoomId>) -> Result<(), RoomError> {
        let room_id = room_id.into();
        self.call(|respond_to| SessionMessage::Join {
            room_id,
            respond_to,
        })
        .await
    }

    /// Leave the room. Safe to call at any time, any number of times.
    pub async fn leave(&self) {
        self.shared.abort_membership();

        let (tx, rx) = oneshot::channel();
        if self
            .mailbox
            .send(SessionMessage::Leave { respond_to: tx })
            .is_err()
        {
            return;
        }
        let _ = rx.await;
    }

    /// Publish camera and/or microphone.
    ///
    /// The microphone producer is always created so that unmuting later
    /// is instant; it starts paused unless `mic` is set. A capture
    /// failure leaves the affected flag off without failing the call.
    ///
    /// # Errors
    ///
    /// Returns `TransportUnavailable` before the session has joined.
    pub async fn start_local_media(
        &self,
        camera: bool,
        mic: bool,
    ) -> Result<LocalMediaState, RoomError> {
        self.call(|respond_to| SessionMessage::StartLocalMedia {
            camera,
            mic,
            respond_to,
        })
        .await
    }

    /// Toggle the microphone. Returns whether it is now open.
    ///
    /// # Errors
    ///
    /// `TransportUnavailable` before join, `CaptureUnavailable` if the
    /// microphone cannot be opened.
    pub async fn toggle_mic(&self) -> Result<bool, RoomError> {
        self.call(|respond_to| SessionMessage::ToggleMic { respond_to })
            .await
    }

    /// Toggle the camera. Returns whether it is now open.
    ///
    /// # Errors
    ///
    /// `TransportUnavailable` before join, `CaptureUnavailable` if the
    /// camera cannot be opened.
    pub async fn toggle_camera(&self) -> Result<bool, RoomError> {
        self.call(|respond_to| SessionMessage::ToggleCamera { respond_to })
            .await
    }

    /// Start or stop screen sharing. Starting requires the one-shot OS
    /// permission token. Returns whether sharing is now active.
    ///
    /// # Errors
    ///
    /// `TransportUnavailable` before join, `CaptureUnavailable` when the
    /// token is missing or rejected.
    pub async fn toggle_screen_share(&self, token: Option<String>) -> Result<bool, RoomError> {
        self.call(|respond_to| SessionMessage::ToggleScreenShare { token, respond_to })
            .await
    }

    /// Switch between front and back camera. Returns whether the front
    /// camera is now selected.
    ///
    /// # Errors
    ///
    /// Returns `AdapterFailure` if the engine cannot switch.
    pub async fn flip_camera(&self) -> Result<bool, RoomError> {
        self.call(|respond_to| SessionMessage::FlipCamera { respond_to })
            .await
    }

    /// Route call audio.
    ///
    /// # Errors
    ///
    /// Returns `AdapterFailure` if the platform rejects the route.
    pub async fn switch_audio_output(&self, output: AudioOutput) -> Result<(), RoomError> {
        self.call(|respond_to| SessionMessage::SwitchAudioOutput { output, respond_to })
            .await
    }

    /// Latest published state.
    #[must_use]
    pub fn snapshot(&self) -> Arc<RoomSnapshot> {
        Arc::clone(&self.snapshot.borrow())
    }

    /// Receiver notified on every state change.
    #[must_use]
    pub fn subscribe(&self) -> watch::Receiver<Arc<RoomSnapshot>> {
        self.snapshot.clone()
    }

    /// Stop the actor. It leaves the room on its way out.
    pub fn cancel(&self) {
        self.cancel_token.cancel();
    }

    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        self.cancel_token.is_cancelled()
    }

    async fn call<T>(
        &self,
        message: impl FnOnce(oneshot::Sender<Result<T, RoomError>>) -> SessionMessage,
    ) -> Result<T, RoomError> {
        let (tx, rx) = oneshot::channel();
        self.mailbox.send(message(tx))?;
        rx.await
            .map_err(|e| RoomError::Internal(format!("Response receive failed: {e}")))?
    }
}

fn stub_hint(notice: &ProducerStateNotice) -> StubHint {
    StubHint {
        owner: notice.owner_id.clone(),
        kind: notice.stream_kind(),
    }
}

/// How much of the membership to tear down.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Teardown {
    /// Explicit leave, failed join or actor shutdown.
    Leave,
    /// Signaling link lost; the channel keeps reconnecting.
    LinkLost,
}

/// The room session actor.
pub struct RoomSession {
    receiver: mpsc::UnboundedReceiver<SessionMessage>,
    mailbox: WeakMailbox,
    monitor: Arc<MailboxMonitor>,
    cancel_token: CancellationToken,
    shared: Arc<SessionShared>,
    snapshot_tx: watch::Sender<Arc<RoomSnapshot>>,

    channel: SignalingChannel,
    engine: Arc<dyn MediaEngine>,
    platform: Arc<dyn CallPlatform>,
    leave_drain_timeout: Duration,

    state: SessionState,
    room_id: Option<RoomId>,
    latch: JoinLatch,
    pending_join: Option<oneshot::Sender<Result<(), RoomError>>>,
    call_indicator: bool,

    registry: Registry,
    local: LocalMediaState,

    send_transport: Option<Arc<dyn MediaTransport>>,
    recv_transport: Option<Arc<dyn MediaTransport>>,
    producers: HashMap<StreamSource, Arc<dyn MediaProducer>>,
    captures: HashSet<StreamSource>,
    remote_consumers: HashMap<ProducerId, Arc<dyn MediaConsumer>>,
    /// Consumer id to producer id. Written by consume tasks.
    consumer_index: Arc<DashMap<ConsumerId, ProducerId>>,
    consume_context: Option<Arc<ConsumeContext>>,
    recv_lock: Arc<tokio::sync::Mutex<()>>,

    membership: CancellationToken,
    generation: u64,
}

impl RoomSession {
    /// Spawn a session actor.
    ///
    /// The session connects to `config.signaling_url` through `connector`
    /// on the first `join`. `cancel_token` stops the actor; it is also the
    /// parent of every membership scope.
    pub fn spawn(
        config: &Config,
        connector: Arc<dyn SignalingConnector>,
        engine: Arc<dyn MediaEngine>,
        platform: Arc<dyn CallPlatform>,
        cancel_token: CancellationToken,
    ) -> (RoomSessionHandle, JoinHandle<()>) {
        let (sender, receiver) = mpsc::unbounded_channel();
        let monitor = Arc::new(MailboxMonitor::new());
        let mailbox = Mailbox::new(sender, Arc::clone(&monitor));

        let membership = cancel_token.child_token();
        let shared = Arc::new(SessionShared {
            membership: Mutex::new(membership.clone()),
        });

        let local = LocalMediaState::with_front_camera(config.prefer_front_camera);
        let (snapshot_tx, snapshot_rx) = watch::channel(Arc::new(RoomSnapshot {
            local,
            ..RoomSnapshot::default()
        }));

        let channel = SignalingChannel::new(
            connector,
            config.signaling_url.clone(),
            ChannelOptions::from(config),
        );

        let actor = Self {
            receiver,
            mailbox: mailbox.downgrade(),
            monitor,
            cancel_token: cancel_token.clone(),
            shared: Arc::clone(&shared),
            snapshot_tx,
            channel,
            engine,
            platform,
            leave_drain_timeout: config.leave_drain_timeout,
            state: SessionState::Idle,
            room_id: None,
            latch: JoinLatch::new(),
            pending_join: None,
            call_indicator: false,
            registry: Registry::new(),
            local,
            send_transport: None,
            recv_transport: None,
            producers: HashMap::new(),
            captures: HashSet::new(),
            remote_consumers: HashMap::new(),
            consumer_index: Arc::new(DashMap::new()),
            consume_context: None,
            recv_lock: Arc::new(tokio::sync::Mutex::new(())),
            membership,
            generation: 0,
        };

        let task_handle = tokio::spawn(actor.run());

        let handle = RoomSessionHandle {
            mailbox,
            snapshot: snapshot_rx,
            shared,
            cancel_token,
        };

        (handle, task_handle)
    }

    #[instrument(skip_all, name = "room.session")]
    async fn run(mut self) {
        info!(target: "room.session", "RoomSession started");

        loop {
            tokio::select! {
                () = self.cancel_token.cancelled() => {
                    info!(
                        target: "room.session",
                        "RoomSession received cancellation signal"
                    );
                    break;
                }

                msg = self.receiver.recv() => match msg {
                    Some(message) => {
                        self.handle_message(message).await;
                        self.monitor.record_dequeue();
                        self.publish();
                    }
                    None => {
                        info!(
                            target: "room.session",
                            "RoomSession channel closed, exiting"
                        );
                        break;
                    }
                },
            }
        }

        self.leave().await;
        self.publish();

        info!(
            target: "room.session",
            messages_processed = self.monitor.messages_processed(),
            "RoomSession stopped"
        );
    }

    async fn handle_message(&mut self, message: SessionMessage) {
        debug!(target: "room.session", message = message.label(), "Handling message");

        match message {
            SessionMessage::Join {
                room_id,
                respond_to,
            } => self.handle_join(room_id, respond_to).await,

            SessionMessage::Leave { respond_to } => {
                self.leave().await;
                let _ = respond_to.send(());
            }

            SessionMessage::StartLocalMedia {
                camera,
                mic,
                respond_to,
            } => {
                let result = self.start_local_media(camera, mic).await;
                let _ = respond_to.send(result);
            }

            SessionMessage::ToggleMic { respond_to } => {
                let result = self.toggle_mic().await;
                let _ = respond_to.send(result);
            }

            SessionMessage::ToggleCamera { respond_to } => {
                let result = self.toggle_camera().await;
                let _ = respond_to.send(result);
            }

            SessionMessage::ToggleScreenShare { token, respond_to } => {
                let result = self.toggle_screen_share(token).await;
                let _ = respond_to.send(result);
            }

            SessionMessage::FlipCamera { respond_to } => {
                let result = self.flip_camera().await;
                let _ = respond_to.send(result);
            }

            SessionMessage::SwitchAudioOutput { output, respond_to } => {
                let result = self.platform.route_audio(output).map_err(RoomError::from);
                if result.is_ok() {
                    info!(target: "room.session", output = %output, "Audio output switched");
                }
                let _ = respond_to.send(result);
            }

            SessionMessage::ChannelConnected => self.handle_channel_connected().await,
            SessionMessage::ChannelDisconnected => self.handle_channel_disconnected().await,
            SessionMessage::ReconnectFailed => self.handle_reconnect_failed().await,

            SessionMessage::Server(event) => self.handle_server_event(event).await,

            SessionMessage::StreamReady {
                membership,
                producer_id,
                consumer,
                respond_to,
            } => {
                let wanted = self
                    .handle_stream_ready(membership, producer_id, consumer)
                    .await;
                let _ = respond_to.send(wanted);
            }

            SessionMessage::LocalProducerClosed {
                source,
                producer_id,
                reason,
            } => self.handle_local_producer_closed(source, &producer_id, reason).await,
        }
    }

    // ------------------------------------------------------------------
    // Join
    // ------------------------------------------------------------------

    async fn handle_join(
        &mut self,
        room_id: RoomId,
        respond_to: oneshot::Sender<Result<(), RoomError>>,
    ) {
        if self.state != SessionState::Idle {
            let _ = respond_to.send(Err(RoomError::InvalidState(format!(
                "cannot join while {}",
                self.state
            ))));
            return;
        }

        info!(target: "room.session", room_id = %room_id, "Joining room");
        let membership = self.begin_membership();
        self.room_id = Some(room_id);
        self.pending_join = Some(respond_to);
        self.set_state(SessionState::Joining);
        self.register_handlers();
        self.publish();

        let connected = tokio::select! {
            biased;
            () = membership.cancelled() => Err(RoomError::JoinAborted),
            result = self.channel.connect() => result,
        };
        // On success the channel has queued `ChannelConnected`
        if let Err(e) = connected {
            self.fail_join(e).await;
        }
    }

    async fn handle_channel_connected(&mut self) {
        if self.state != SessionState::Joining {
            debug!(
                target: "room.session",
                state = %self.state,
                "Ignoring connect outside of a join"
            );
            return;
        }
        if !self.latch.try_acquire() {
            debug!(target: "room.session", "Join already in progress");
            return;
        }

        let membership = self.membership.clone();
        let result = tokio::select! {
            biased;
            () = membership.cancelled() => Err(RoomError::JoinAborted),
            result = self.join_room() => result,
        };

        match result {
            Ok(()) => {
                self.set_state(SessionState::Joined);
                if !self.call_indicator {
                    self.platform.set_call_indicator(true);
                    self.call_indicator = true;
                }
                info!(
                    target: "room.session",
                    room_id = ?self.room_id,
                    peers = self.registry.peers().len(),
                    streams = self.registry.streams().len(),
                    "Joined room"
                );
                if let Some(respond_to) = self.pending_join.take() {
                    let _ = respond_to.send(Ok(()));
                }
            }
            Err(e) => self.fail_join(e).await,
        }
    }

    /// Run the join exchange. Any error aborts the join.
    #[instrument(skip_all, name = "room.session.join", fields(room_id = ?self.room_id))]
    async fn join_room(&mut self) -> Result<(), RoomError> {
        let room_id = self
            .room_id
            .clone()
            .ok_or_else(|| RoomError::InvalidState("no room to join".to_string()))?;

        let response: JoinRoomResponse = self
            .channel
            .request(op::JOIN_ROOM, &JoinRoomRequest { room_id })
            .await?;

        self.engine
            .load_capabilities(&response.rtp_capabilities)
            .await?;
        let rtp_capabilities = self.engine.local_capabilities()?;

        let (send_options, recv_options) = tokio::try_join!(
            self.channel.request::<_, TransportOptions>(
                op::CREATE_TRANSPORT,
                &CreateTransportRequest { sender: true }
            ),
            self.channel.request::<_, TransportOptions>(
                op::CREATE_TRANSPORT,
                &CreateTransportRequest { sender: false }
            ),
        )?;

        let send = self
            .engine
            .create_transport(
                TransportDirection::Send,
                send_options,
                Arc::new(SignalingTransportListener::new(
                    self.channel.clone(),
                    TransportDirection::Send,
                )),
            )
            .await?;
        self.send_transport = Some(send);

        let recv = self
            .engine
            .create_transport(
                TransportDirection::Recv,
                recv_options,
                Arc::new(SignalingTransportListener::new(
                    self.channel.clone(),
                    TransportDirection::Recv,
                )),
            )
            .await?;
        self.recv_transport = Some(Arc::clone(&recv));

        self.consume_context = Some(Arc::new(ConsumeContext {
            channel: self.channel.clone(),
            transport: recv,
            rtp_capabilities,
            recv_lock: Arc::clone(&self.recv_lock),
            consumers: Arc::clone(&self.consumer_index),
            mailbox: self.mailbox.clone(),
            membership: self.generation,
        }));

        for peer in response.existing_peers {
            self.registry.upsert_peer(peer);
        }
        for announcement in response.existing_producers {
            self.announce(announcement);
        }
        Ok(())
    }

    async fn fail_join(&mut self, error: RoomError) {
        warn!(
            target: "room.session",
            room_id = ?self.room_id,
            error = %error,
            "Join failed"
        );
        self.teardown(Teardown::Leave).await;
        self.room_id = None;
        self.set_state(SessionState::Idle);
        if let Some(respond_to) = self.pending_join.take() {
            let _ = respond_to.send(Err(error));
        }
    }

    /// Route channel callbacks into the mailbox.
    fn register_handlers(&self) {
        let lifecycle: [(&str, fn() -> SessionMessage); 3] = [
            (EVENT_CONNECT, || SessionMessage::ChannelConnected),
            (EVENT_DISCONNECT, || SessionMessage::ChannelDisconnected),
            (EVENT_RECONNECT_FAILED, || SessionMessage::ReconnectFailed),
        ];
        for (event, message) in lifecycle {
            let mailbox = self.mailbox.clone();
            self.channel.on(event, move |_| {
                mailbox.send(message());
            });
        }

        for &event in name::ALL {
            let mailbox = self.mailbox.clone();
            self.channel.on(event, move |data| match ServerEvent::decode(event, data) {
                Ok(decoded) => {
                    mailbox.send(SessionMessage::Server(decoded));
                }
                Err(e) => {
                    warn!(
                        target: "room.session",
                        event = event,
                        error = %e,
                        "Dropping undecodable server event"
                    );
                }
            });
        }
    }

    fn begin_membership(&mut self) -> CancellationToken {
        let token = self.cancel_token.child_token();
        self.membership = token.clone();
        self.generation += 1;
        self.shared.replace_membership(token.clone());
        token
    }

    // ------------------------------------------------------------------
    // Channel lifecycle
    // ------------------------------------------------------------------

    async fn handle_channel_disconnected(&mut self) {
        self.latch.release();

        if self.state != SessionState::Joined {
            debug!(
                target: "room.session",
                state = %self.state,
                "Signaling link lost outside of a membership"
            );
            return;
        }

        warn!(
            target: "room.session",
            room_id = ?self.room_id,
            "Signaling link lost, will rejoin on reconnect"
        );
        self.teardown(Teardown::LinkLost).await;
        self.begin_membership();
        self.set_state(SessionState::Joining);
    }

    async fn handle_reconnect_failed(&mut self) {
        if self.state != SessionState::Joining {
            return;
        }
        warn!(
            target: "room.session",
            room_id = ?self.room_id,
            "Signaling reconnection failed, leaving room"
        );
        self.teardown(Teardown::Leave).await;
        self.room_id = None;
        self.set_state(SessionState::Idle);
    }

    // ------------------------------------------------------------------
    // Server events
    // ------------------------------------------------------------------

    async fn handle_server_event(&mut self, event: ServerEvent) {
        if self.state != SessionState::Joined {
            debug!(
                target: "room.session",
                event = event.name(),
                state = %self.state,
                "Ignoring event outside of a membership"
            );
            return;
        }

        match event {
            ServerEvent::PeerJoined(notice) => {
                if self.registry.upsert_peer(notice.peer_id.clone()) {
                    info!(target: "room.session", peer_id = %notice.peer_id, "Peer joined");
                }
            }

            ServerEvent::PeerLeft(notice) => {
                let Some((peer, streams)) = self.registry.remove_peer(&notice.peer_id) else {
                    debug!(target: "room.session", peer_id = %notice.peer_id, "Unknown peer left");
                    return;
                };
                for stream in streams {
                    if let Some(consumer_id) = &stream.consumer_id {
                        self.consumer_index.remove(consumer_id);
                    }
                    self.release_consumer(&stream.producer_id).await;
                }
                info!(target: "room.session", peer_id = %peer.id, "Peer left");
            }

            ServerEvent::NewProducer(announcement) => self.announce(announcement),

            ServerEvent::ConsumerClosed(notice) => {
                match self.consumer_index.remove(&notice.consumer_id) {
                    Some((_, producer_id)) => {
                        self.registry.remove_stream(&producer_id);
                        self.release_consumer(&producer_id).await;
                        debug!(
                            target: "room.session",
                            consumer_id = %notice.consumer_id,
                            producer_id = %producer_id,
                            "Consumer closed by server"
                        );
                    }
                    None => {
                        debug!(
                            target: "room.session",
                            consumer_id = %notice.consumer_id,
                            "Close for unknown consumer"
                        );
                    }
                }
            }

            ServerEvent::ProducerPaused(notice) => {
                self.registry
                    .set_paused(&notice.producer_id, true, stub_hint(&notice));
            }

            ServerEvent::ProducerResumed(notice) => {
                self.registry
                    .set_paused(&notice.producer_id, false, stub_hint(&notice));
            }

            ServerEvent::ProducerScore(notice) => {
                if let Some(score) = notice.primary_score() {
                    self.registry
                        .set_network_score(&notice.producer_id, clamp_score(score));
                }
            }

            ServerEvent::ActiveSpeaker(levels) => self.apply_audio_levels(&levels),
        }
    }

    fn announce(&mut self, announcement: ProducerAnnouncement) {
        let kind = StreamKind::classify(announcement.kind, announcement.source());
        let producer_id = announcement.producer_id.clone();
        let is_new = self.registry.announce_stream(StreamAnnouncement {
            producer_id: producer_id.clone(),
            owner: announcement.owner_id,
            kind,
            paused: announcement.paused,
        });
        if !is_new {
            return;
        }

        match &self.consume_context {
            Some(context) => {
                spawn_consume(Arc::clone(context), producer_id, self.membership.clone());
            }
            None => {
                warn!(
                    target: "room.session",
                    producer_id = %producer_id,
                    "No receive transport, stream not consumed"
                );
            }
        }
    }

    fn apply_audio_levels(&mut self, levels: &[AudioLevel]) {
        let local_mic = self
            .producers
            .get(&StreamSource::Microphone)
            .map(|producer| producer.id().clone());

        for level in levels {
            let volume = volume_level(level.level_db);
            if local_mic.as_ref() == Some(&level.producer_id) {
                self.local.local_volume = volume;
            } else {
                self.registry.set_volume(&level.producer_id, volume);
            }
        }
    }

    async fn handle_stream_ready(
        &mut self,
        membership: u64,
        producer_id: ProducerId,
        consumer: Arc<dyn MediaConsumer>,
    ) -> bool {
        let attached = membership == self.generation
            && self
                .registry
                .attach_track(&producer_id, consumer.id().clone(), consumer.track());

        if attached {
            debug!(
                target: "room.session",
                producer_id = %producer_id,
                consumer_id = %consumer.id(),
                "Remote stream ready"
            );
            if let Some(previous) = self.remote_consumers.insert(producer_id, consumer) {
                previous.close().await;
            }
            return true;
        }

        debug!(
            target: "room.session",
            producer_id = %producer_id,
            "Stream gone before consume finished, closing consumer"
        );
        if membership == self.generation {
            self.consumer_index.remove(consumer.id());
        }
        consumer.close().await;
        false
    }

    async fn release_consumer(&mut self, producer_id: &ProducerId) {
        if let Some(consumer) = self.remote_consumers.remove(producer_id) {
            consumer.close().await;
        }
    }

    // ------------------------------------------------------------------
    // Local media
    // ------------------------------------------------------------------

    async fn start_local_media(
        &mut self,
        camera: bool,
        mic: bool,
    ) -> Result<LocalMediaState, RoomError> {
        if self.send_transport.is_none() {
            return Err(RoomError::TransportUnavailable);
        }

        if camera && !self.producers.contains_key(&StreamSource::Camera) {
            match self.publish_local(StreamSource::Camera, None).await {
                Ok(()) => self.local.camera_open = true,
                Err(e) => {
                    warn!(target: "room.session", error = %e, "Camera unavailable");
                    self.local.camera_open = false;
                }
            }
        }

        if !self.producers.contains_key(&StreamSource::Microphone) {
            match self.publish_local(StreamSource::Microphone, None).await {
                Ok(()) if mic => self.local.mic_open = true,
                Ok(()) => {
                    if let Err(e) = self.pause_local(StreamSource::Microphone).await {
                        // Never leave an unwanted microphone live
                        warn!(target: "room.session", error = %e, "Failed to mute microphone");
                        self.close_local(StreamSource::Microphone).await;
                    }
                    self.local.mic_open = false;
                }
                Err(e) => {
                    warn!(target: "room.session", error = %e, "Microphone unavailable");
                    self.local.mic_open = false;
                }
            }
        }

        Ok(self.local)
    }

    async fn toggle_mic(&mut self) -> Result<bool, RoomError> {
        if self.send_transport.is_none() {
            return Err(RoomError::TransportUnavailable);
        }

        if !self.producers.contains_key(&StreamSource::Microphone) {
            self.publish_local(StreamSource::Microphone, None).await?;
            self.local.mic_open = true;
        } else if self.local.mic_open {
            self.pause_local(StreamSource::Microphone).await?;
            self.local.mic_open = false;
        } else {
            self.resume_local(StreamSource::Microphone).await?;
            self.local.mic_open = true;
        }
        Ok(self.local.mic_open)
    }

    async fn toggle_camera(&mut self) -> Result<bool, RoomError> {
        if self.send_transport.is_none() {
            return Err(RoomError::TransportUnavailable);
        }

        if !self.producers.contains_key(&StreamSource::Camera) {
            self.publish_local(StreamSource::Camera, None).await?;
            self.local.camera_open = true;
        } else if self.local.camera_open {
            self.pause_local(StreamSource::Camera).await?;
            if let Err(e) = self
                .engine
                .set_capture_active(StreamSource::Camera, false)
                .await
            {
                warn!(target: "room.session", error = %e, "Failed to stop camera capture");
            }
            self.local.camera_open = false;
        } else {
            self.engine
                .set_capture_active(StreamSource::Camera, true)
                .await?;
            self.resume_local(StreamSource::Camera).await?;
            self.local.camera_open = true;
        }
        Ok(self.local.camera_open)
    }

    async fn toggle_screen_share(&mut self, token: Option<String>) -> Result<bool, RoomError> {
        if self.local.screen_share_open {
            self.close_local(StreamSource::Screen).await;
            return Ok(false);
        }
        if self.send_transport.is_none() {
            return Err(RoomError::TransportUnavailable);
        }
        let Some(token) = token else {
            return Err(RoomError::CaptureUnavailable(StreamSource::Screen));
        };

        self.publish_local(StreamSource::Screen, Some(token)).await?;
        self.local.screen_share_open = true;
        self.platform.set_screen_share_indicator(true);
        Ok(true)
    }

    async fn flip_camera(&mut self) -> Result<bool, RoomError> {
        if self.captures.contains(&StreamSource::Camera) {
            self.local.front_camera = self.engine.switch_camera().await?;
        } else {
            // Applies to the next capture
            self.local.front_camera = !self.local.front_camera;
        }
        Ok(self.local.front_camera)
    }

    /// Capture `source` and publish it on the send transport.
    async fn publish_local(
        &mut self,
        source: StreamSource,
        screen_token: Option<String>,
    ) -> Result<(), RoomError> {
        let transport = self
            .send_transport
            .clone()
            .ok_or(RoomError::TransportUnavailable)?;

        let track = self
            .engine
            .open_capture(CaptureRequest {
                source,
                front_camera: self.local.front_camera,
                screen_token,
            })
            .await?;
        self.captures.insert(source);

        let listener = Arc::new(MailboxProducerListener::new(source, self.mailbox.clone()));
        match transport.produce(track, source, listener).await {
            Ok(producer) => {
                info!(
                    target: "room.session",
                    source = %source,
                    producer_id = %producer.id(),
                    "Publishing local stream"
                );
                self.producers.insert(source, producer);
                Ok(())
            }
            Err(e) => {
                self.engine.close_capture(source).await;
                self.captures.remove(&source);
                Err(e.into())
            }
        }
    }

    async fn pause_local(&mut self, source: StreamSource) -> Result<(), RoomError> {
        let Some(producer) = self.producers.get(&source).cloned() else {
            return Ok(());
        };
        producer.pause().await?;
        self.notify_producer(op::PAUSE_PRODUCER, producer.id());
        Ok(())
    }

    async fn resume_local(&mut self, source: StreamSource) -> Result<(), RoomError> {
        let Some(producer) = self.producers.get(&source).cloned() else {
            return Ok(());
        };
        producer.resume().await?;
        self.notify_producer(op::RESUME_PRODUCER, producer.id());
        Ok(())
    }

    /// Stop publishing `source` and release its capture.
    async fn close_local(&mut self, source: StreamSource) {
        if let Some(producer) = self.producers.remove(&source) {
            producer.close().await;
            self.notify_producer(op::CLOSE_PRODUCER, producer.id());
        }
        if self.captures.remove(&source) {
            self.engine.close_capture(source).await;
        }

        match source {
            StreamSource::Camera => self.local.camera_open = false,
            StreamSource::Microphone => self.local.mic_open = false,
            StreamSource::Screen => {
                if self.local.screen_share_open {
                    self.platform.set_screen_share_indicator(false);
                }
                self.local.screen_share_open = false;
            }
        }
    }

    async fn handle_local_producer_closed(
        &mut self,
        source: StreamSource,
        producer_id: &ProducerId,
        reason: ProducerCloseReason,
    ) {
        let current = self
            .producers
            .get(&source)
            .is_some_and(|producer| producer.id() == producer_id);
        if !current {
            debug!(
                target: "room.session",
                producer_id = %producer_id,
                "Close for a producer no longer published"
            );
            return;
        }

        warn!(
            target: "room.session",
            source = %source,
            producer_id = %producer_id,
            reason = ?reason,
            "Local producer closed unexpectedly"
        );
        self.close_local(source).await;
    }

    fn notify_producer(&self, operation: &str, producer_id: &ProducerId) {
        let request = ProducerRequest {
            producer_id: producer_id.clone(),
        };
        if let Err(e) = self.channel.notify(operation, &request) {
            warn!(
                target: "room.session",
                operation = operation,
                producer_id = %producer_id,
                error = %e,
                "Failed to notify server"
            );
        }
    }

    // ------------------------------------------------------------------
    // Leave
    // ------------------------------------------------------------------

    /// Leave the room. Idempotent; never fails.
    async fn leave(&mut self) {
        if let Some(respond_to) = self.pending_join.take() {
            let _ = respond_to.send(Err(RoomError::JoinAborted));
        }

        if self.state == SessionState::Idle && self.room_id.is_none() {
            // Nothing joined, but make sure no link lingers
            self.channel.disconnect();
            return;
        }

        info!(target: "room.session", room_id = ?self.room_id, "Leaving room");
        self.set_state(SessionState::Leaving);
        self.publish();

        self.teardown(Teardown::Leave).await;
        self.room_id = None;
        self.set_state(SessionState::Idle);
        info!(target: "room.session", "Left room");
    }

    /// Release the membership. Every step runs even if an earlier one failed.
    async fn teardown(&mut self, kind: Teardown) {
        if kind == Teardown::Leave {
            self.channel.disconnect();
        }

        for (_, producer) in self.producers.drain() {
            producer.close().await;
        }
        for source in std::mem::take(&mut self.captures) {
            self.engine.close_capture(source).await;
        }

        // A consume holding the lock may be waiting on this actor, so it
        // must be cancelled before the drain
        self.membership.cancel();
        if tokio::time::timeout(self.leave_drain_timeout, self.recv_lock.lock())
            .await
            .is_err()
        {
            warn!(
                target: "room.session",
                timeout_ms = self.leave_drain_timeout.as_millis(),
                "Consume still running after drain timeout"
            );
            metrics::record_cleanup_error("drain");
        }

        self.consume_context = None;
        if let Some(transport) = self.send_transport.take() {
            transport.close().await;
        }
        if let Some(transport) = self.recv_transport.take() {
            transport.close().await;
        }
        self.engine.dispose().await;

        for (_, consumer) in self.remote_consumers.drain() {
            consumer.close().await;
        }

        let dropped = self.registry.clear();
        self.consumer_index.clear();
        if self.local.screen_share_open {
            self.platform.set_screen_share_indicator(false);
        }
        self.local = LocalMediaState::with_front_camera(self.local.front_camera);
        self.latch.release();
        if kind == Teardown::Leave && self.call_indicator {
            self.platform.set_call_indicator(false);
            self.call_indicator = false;
        }

        debug!(
            target: "room.session",
            streams = dropped.len(),
            teardown = ?kind,
            "Membership released"
        );
    }

    // ------------------------------------------------------------------
    // State publication
    // ------------------------------------------------------------------

    fn set_state(&mut self, state: SessionState) {
        if self.state == state {
            return;
        }
        debug!(
            target: "room.session",
            from = %self.state,
            to = %state,
            "Session state changed"
        );
        self.state = state;
        metrics::record_session_transition(state.as_str());
    }

    fn publish(&self) {
        let streams = self.registry.streams();
        metrics::set_remote_streams(streams.len());

        let next = RoomSnapshot {
            session_state: self.state,
            room_id: self.room_id.clone(),
            signaling_connected: self.channel.is_connected(),
            local: self.local,
            peers: self.registry.peers(),
            streams,
        };
        self.snapshot_tx.send_if_modified(|current| {
            if current.same_as(&next) {
                false
            } else {
                *current = Arc::new(next);
                true
            }
        });
    }
}
