//! Mock media engine.
//!
//! Records every call, negotiates through the session's transport
//! listener the way a real engine does (connect on first use, ask the
//! server for a producer id on produce), and can be told to fail.

use async_trait::async_trait;
use common::types::{ConsumerId, MediaKind, ProducerId, StreamSource, TransportId};
use dashmap::DashMap;
use room_client::media::{
    CaptureRequest, ConsumeParams, MediaConsumer, MediaEngine, MediaError, MediaProducer,
    MediaTrack, MediaTransport, ProducerCloseReason, ProducerListener, TransportDirection,
    TransportListener,
};
use serde_json::{json, Value};
use signaling_protocol::messages::{AppData, TransportOptions};
use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

/// One call into the mock engine or one of its objects.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EngineCall {
    LoadCapabilities,
    CreateTransport(TransportDirection),
    CloseTransport(TransportDirection),
    OpenCapture {
        source: StreamSource,
        front_camera: bool,
    },
    SetCaptureActive {
        source: StreamSource,
        active: bool,
    },
    CloseCapture(StreamSource),
    SwitchCamera,
    Produce(StreamSource),
    PauseProducer(StreamSource),
    ResumeProducer(StreamSource),
    CloseProducer(StreamSource),
    Consume(ProducerId),
    CloseConsumer(ConsumerId),
    Dispose,
}

struct EngineState {
    calls: Mutex<Vec<EngineCall>>,
    failing_captures: Mutex<HashSet<StreamSource>>,
    failing_pauses: Mutex<HashSet<StreamSource>>,
    failing_transports: AtomicBool,
    consume_delay: Mutex<Duration>,
    front_camera: AtomicBool,
    open_captures: Mutex<HashSet<StreamSource>>,
    producers: Mutex<HashMap<StreamSource, Arc<MockProducer>>>,
    consumers: DashMap<ConsumerId, Arc<MockConsumer>>,
    consumes_in_flight: AtomicUsize,
    peak_consumes: AtomicUsize,
}

impl EngineState {
    fn record(&self, call: EngineCall) {
        self.calls.lock().unwrap().push(call);
    }
}

/// Mock media engine. Clones share state.
#[derive(Clone)]
pub struct MockMediaEngine {
    state: Arc<EngineState>,
}

impl Default for MockMediaEngine {
    fn default() -> Self {
        Self::new()
    }
}

impl MockMediaEngine {
    /// Engine where every device works.
    #[must_use]
    pub fn new() -> Self {
        Self {
            state: Arc::new(EngineState {
                calls: Mutex::new(Vec::new()),
                failing_captures: Mutex::new(HashSet::new()),
                failing_pauses: Mutex::new(HashSet::new()),
                failing_transports: AtomicBool::new(false),
                consume_delay: Mutex::new(Duration::ZERO),
                front_camera: AtomicBool::new(true),
                open_captures: Mutex::new(HashSet::new()),
                producers: Mutex::new(HashMap::new()),
                consumers: DashMap::new(),
                consumes_in_flight: AtomicUsize::new(0),
                peak_consumes: AtomicUsize::new(0),
            }),
        }
    }

    /// Opening `source` fails with `CaptureUnavailable`.
    #[must_use]
    pub fn with_failing_capture(self, source: StreamSource) -> Self {
        self.state.failing_captures.lock().unwrap().insert(source);
        self
    }

    /// Pausing the producer of `source` fails.
    #[must_use]
    pub fn with_failing_pause(self, source: StreamSource) -> Self {
        self.state.failing_pauses.lock().unwrap().insert(source);
        self
    }

    /// Transport creation fails.
    #[must_use]
    pub fn with_failing_transports(self) -> Self {
        self.state.failing_transports.store(true, Ordering::SeqCst);
        self
    }

    /// Every `consume` takes this long.
    #[must_use]
    pub fn with_consume_delay(self, delay: Duration) -> Self {
        *self.state.consume_delay.lock().unwrap() = delay;
        self
    }

    /// Every call so far, in order.
    #[must_use]
    pub fn calls(&self) -> Vec<EngineCall> {
        self.state.calls.lock().unwrap().clone()
    }

    /// How many recorded calls equal `call`.
    #[must_use]
    pub fn count(&self, call: &EngineCall) -> usize {
        self.state
            .calls
            .lock()
            .unwrap()
            .iter()
            .filter(|recorded| *recorded == call)
            .count()
    }

    /// Captures currently held.
    #[must_use]
    pub fn open_captures(&self) -> HashSet<StreamSource> {
        self.state.open_captures.lock().unwrap().clone()
    }

    /// Whether the live producer for `source` is paused.
    #[must_use]
    pub fn producer_paused(&self, source: StreamSource) -> Option<bool> {
        self.state
            .producers
            .lock()
            .unwrap()
            .get(&source)
            .map(|producer| producer.paused.load(Ordering::SeqCst))
    }

    /// Id of the live producer for `source`.
    #[must_use]
    pub fn producer_id(&self, source: StreamSource) -> Option<ProducerId> {
        self.state
            .producers
            .lock()
            .unwrap()
            .get(&source)
            .map(|producer| producer.id.clone())
    }

    /// Simulate the OS ending a capture (device unplugged, screen share
    /// stopped from the system UI). Returns false if nothing was published.
    pub fn end_capture(&self, source: StreamSource) -> bool {
        let producer = self.state.producers.lock().unwrap().get(&source).cloned();
        match producer {
            Some(producer) => {
                producer
                    .listener
                    .on_closed(&producer.id, ProducerCloseReason::TrackEnded);
                true
            }
            None => false,
        }
    }

    /// Consumers created and not yet closed.
    #[must_use]
    pub fn open_consumers(&self) -> usize {
        self.state
            .consumers
            .iter()
            .filter(|consumer| !consumer.closed.load(Ordering::SeqCst))
            .count()
    }

    /// Whether `consumer_id` was closed, `None` if it never existed.
    #[must_use]
    pub fn is_consumer_closed(&self, consumer_id: &ConsumerId) -> Option<bool> {
        self.state
            .consumers
            .get(consumer_id)
            .map(|consumer| consumer.closed.load(Ordering::SeqCst))
    }

    /// Highest number of `consume` calls running at once.
    #[must_use]
    pub fn peak_concurrent_consumes(&self) -> usize {
        self.state.peak_consumes.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl MediaEngine for MockMediaEngine {
    async fn load_capabilities(&self, _router_capabilities: &Value) -> Result<(), MediaError> {
        self.state.record(EngineCall::LoadCapabilities);
        Ok(())
    }

    fn local_capabilities(&self) -> Result<Value, MediaError> {
        Ok(json!({"codecs": [{"mimeType": "audio/opus"}, {"mimeType": "video/VP8"}]}))
    }

    async fn create_transport(
        &self,
        direction: TransportDirection,
        options: TransportOptions,
        listener: Arc<dyn TransportListener>,
    ) -> Result<Arc<dyn MediaTransport>, MediaError> {
        if self.state.failing_transports.load(Ordering::SeqCst) {
            return Err(MediaError::Failed("transport refused".to_string()));
        }
        self.state.record(EngineCall::CreateTransport(direction));
        Ok(Arc::new(MockTransport {
            id: options.transport_id,
            direction,
            listener,
            connected: AtomicBool::new(false),
            closed: AtomicBool::new(false),
            state: Arc::clone(&self.state),
        }))
    }

    async fn open_capture(&self, request: CaptureRequest) -> Result<MediaTrack, MediaError> {
        let source = request.source;
        if self.state.failing_captures.lock().unwrap().contains(&source) {
            return Err(MediaError::CaptureUnavailable(source));
        }
        if source == StreamSource::Screen && request.screen_token.is_none() {
            return Err(MediaError::CaptureUnavailable(source));
        }
        if source == StreamSource::Camera {
            self.state
                .front_camera
                .store(request.front_camera, Ordering::SeqCst);
        }

        self.state.record(EngineCall::OpenCapture {
            source,
            front_camera: request.front_camera,
        });
        self.state.open_captures.lock().unwrap().insert(source);
        Ok(MediaTrack {
            id: format!("{source}-track"),
            kind: source.media_kind(),
        })
    }

    async fn set_capture_active(&self, source: StreamSource, active: bool) -> Result<(), MediaError> {
        self.state
            .record(EngineCall::SetCaptureActive { source, active });
        Ok(())
    }

    async fn close_capture(&self, source: StreamSource) {
        if self.state.open_captures.lock().unwrap().remove(&source) {
            self.state.record(EngineCall::CloseCapture(source));
        }
    }

    async fn switch_camera(&self) -> Result<bool, MediaError> {
        self.state.record(EngineCall::SwitchCamera);
        let front = !self.state.front_camera.load(Ordering::SeqCst);
        self.state.front_camera.store(front, Ordering::SeqCst);
        Ok(front)
    }

    async fn dispose(&self) {
        self.state.record(EngineCall::Dispose);
    }
}

struct MockTransport {
    id: TransportId,
    direction: TransportDirection,
    listener: Arc<dyn TransportListener>,
    connected: AtomicBool,
    closed: AtomicBool,
    state: Arc<EngineState>,
}

impl MockTransport {
    async fn ensure_connected(&self) -> Result<(), MediaError> {
        if self.closed.load(Ordering::SeqCst) {
            return Err(MediaError::Closed);
        }
        if !self.connected.swap(true, Ordering::SeqCst) {
            self.listener
                .on_connect(&self.id, json!({"role": "client", "fingerprints": []}))
                .await?;
            self.listener.on_connection_state(&self.id, "connected");
        }
        Ok(())
    }
}

/// Decrements the in-flight consume count, also when the call is cancelled.
struct ConsumeGuard<'a>(&'a AtomicUsize);

impl Drop for ConsumeGuard<'_> {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::SeqCst);
    }
}

#[async_trait]
impl MediaTransport for MockTransport {
    fn id(&self) -> &TransportId {
        &self.id
    }

    fn direction(&self) -> TransportDirection {
        self.direction
    }

    async fn produce(
        &self,
        track: MediaTrack,
        source: StreamSource,
        listener: Arc<dyn ProducerListener>,
    ) -> Result<Arc<dyn MediaProducer>, MediaError> {
        if !self.direction.is_sender() {
            return Err(MediaError::Failed("produce on a receive transport".to_string()));
        }
        self.ensure_connected().await?;

        let id = self
            .listener
            .on_produce(
                &self.id,
                track.kind,
                json!({"encodings": [{"ssrc": 1111}]}),
                AppData::with_source(source),
            )
            .await?;

        self.state.record(EngineCall::Produce(source));
        let producer = Arc::new(MockProducer {
            id,
            source,
            listener,
            paused: AtomicBool::new(false),
            closed: AtomicBool::new(false),
            state: Arc::clone(&self.state),
        });
        self.state
            .producers
            .lock()
            .unwrap()
            .insert(source, Arc::clone(&producer));
        Ok(producer)
    }

    async fn consume(&self, params: ConsumeParams) -> Result<Arc<dyn MediaConsumer>, MediaError> {
        if self.direction.is_sender() {
            return Err(MediaError::Failed("consume on a send transport".to_string()));
        }
        self.ensure_connected().await?;

        let running = self.state.consumes_in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        let _guard = ConsumeGuard(&self.state.consumes_in_flight);
        self.state.peak_consumes.fetch_max(running, Ordering::SeqCst);

        let delay = *self.state.consume_delay.lock().unwrap();
        if !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }

        self.state
            .record(EngineCall::Consume(params.producer_id.clone()));
        let consumer = Arc::new(MockConsumer {
            track: MediaTrack {
                id: format!("track-{}", params.consumer_id),
                kind: params.kind,
            },
            id: params.consumer_id,
            producer_id: params.producer_id,
            kind: params.kind,
            closed: AtomicBool::new(false),
            state: Arc::clone(&self.state),
        });
        self.state
            .consumers
            .insert(consumer.id.clone(), Arc::clone(&consumer));
        Ok(consumer)
    }

    async fn close(&self) {
        if !self.closed.swap(true, Ordering::SeqCst) {
            self.state.record(EngineCall::CloseTransport(self.direction));
        }
    }
}

struct MockProducer {
    id: ProducerId,
    source: StreamSource,
    listener: Arc<dyn ProducerListener>,
    paused: AtomicBool,
    closed: AtomicBool,
    state: Arc<EngineState>,
}

#[async_trait]
impl MediaProducer for MockProducer {
    fn id(&self) -> &ProducerId {
        &self.id
    }

    fn source(&self) -> StreamSource {
        self.source
    }

    async fn pause(&self) -> Result<(), MediaError> {
        if self.closed.load(Ordering::SeqCst) {
            return Err(MediaError::Closed);
        }
        if self.state.failing_pauses.lock().unwrap().contains(&self.source) {
            return Err(MediaError::Failed("pause refused".to_string()));
        }
        self.paused.store(true, Ordering::SeqCst);
        self.state.record(EngineCall::PauseProducer(self.source));
        Ok(())
    }

    async fn resume(&self) -> Result<(), MediaError> {
        if self.closed.load(Ordering::SeqCst) {
            return Err(MediaError::Closed);
        }
        self.paused.store(false, Ordering::SeqCst);
        self.state.record(EngineCall::ResumeProducer(self.source));
        Ok(())
    }

    async fn close(&self) {
        if self.closed.swap(true, Ordering::SeqCst) {
            return;
        }
        self.state.record(EngineCall::CloseProducer(self.source));
        let mut producers = self.state.producers.lock().unwrap();
        if producers
            .get(&self.source)
            .is_some_and(|live| live.id == self.id)
        {
            producers.remove(&self.source);
        }
    }
}

struct MockConsumer {
    id: ConsumerId,
    producer_id: ProducerId,
    kind: MediaKind,
    track: MediaTrack,
    closed: AtomicBool,
    state: Arc<EngineState>,
}

#[async_trait]
impl MediaConsumer for MockConsumer {
    fn id(&self) -> &ConsumerId {
        &self.id
    }

    fn producer_id(&self) -> &ProducerId {
        &self.producer_id
    }

    fn kind(&self) -> MediaKind {
        self.kind
    }

    fn track(&self) -> MediaTrack {
        self.track.clone()
    }

    async fn close(&self) {
        if !self.closed.swap(true, Ordering::SeqCst) {
            self.state.record(EngineCall::CloseConsumer(self.id.clone()));
        }
    }
}
