//! In-memory signaling server.
//!
//! `MockSignalingServer` implements [`SignalingConnector`], so a room
//! session can be pointed straight at it. Every link it hands out is
//! served by a task that records client frames and answers requests.
//!
//! Built-in answers:
//!
//! | Operation | Answer |
//! |-----------|--------|
//! | `joinRoom` | router capabilities plus the configured peers and producers |
//! | `createWebRtcTransport` | fresh transport id |
//! | `produce` | fresh producer id |
//! | `consume` | fresh consumer id for the requested producer |
//! | anything else | empty acknowledgement |
//!
//! # Example
//!
//! ```rust,ignore
//! use room_test_utils::{MockSignalingServer, Reply};
//!
//! let server = MockSignalingServer::new()
//!     .with_room(vec![PeerId::new("alice")], vec![])
//!     .with_reply("joinRoom", Reply::Error("room full".to_string()));
//! ```

use async_trait::async_trait;
use common::types::{ConsumerId, MediaKind, PeerId, ProducerId};
use dashmap::DashMap;
use room_client::errors::RoomError;
use room_client::signaling::{SignalingConnector, SignalingLink};
use serde_json::{json, Value};
use signaling_protocol::codec::{decode_outbound, encode_inbound};
use signaling_protocol::messages::{op, ProducerAnnouncement};
use signaling_protocol::{AckOutcome, InboundFrame, OutboundFrame, ServerEvent};
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::{mpsc, watch};
use tracing::debug;
use uuid::Uuid;

/// How long helpers wait before failing the test.
const WAIT_TIMEOUT: Duration = Duration::from_secs(5);

/// How the server answers one operation.
#[derive(Debug, Clone, PartialEq)]
pub enum Reply {
    /// Built-in answer.
    Default,
    /// Acknowledge with this payload.
    Data(Value),
    /// Reject with this reason.
    Error(String),
    /// Never answer.
    Silent,
}

/// A client frame and the link it arrived on.
#[derive(Debug, Clone, PartialEq)]
pub struct Received {
    /// Link number, starting at 1.
    pub link: u64,
    pub frame: OutboundFrame,
}

#[derive(Default)]
struct Behavior {
    replies: HashMap<String, Reply>,
    delays: HashMap<String, Duration>,
    peers: Vec<PeerId>,
    producers: Vec<ProducerAnnouncement>,
}

struct Inner {
    behavior: Mutex<Behavior>,
    received: Mutex<Vec<Received>>,
    arrivals: watch::Sender<usize>,
    /// The live link's number and sender. Dropping the sender closes it.
    current: Mutex<Option<(u64, mpsc::UnboundedSender<String>)>>,
    next_link: AtomicU64,
    refuse: AtomicBool,
    connections: AtomicUsize,
    in_flight: DashMap<String, usize>,
    peak_in_flight: DashMap<String, usize>,
    producer_kinds: DashMap<ProducerId, MediaKind>,
    consumers: DashMap<ProducerId, ConsumerId>,
}

/// Mock signaling server. Clones share state.
#[derive(Clone)]
pub struct MockSignalingServer {
    inner: Arc<Inner>,
}

impl Default for MockSignalingServer {
    fn default() -> Self {
        Self::new()
    }
}

impl MockSignalingServer {
    /// Server for an empty room with built-in answers.
    #[must_use]
    pub fn new() -> Self {
        let (arrivals, _) = watch::channel(0);
        Self {
            inner: Arc::new(Inner {
                behavior: Mutex::new(Behavior::default()),
                received: Mutex::new(Vec::new()),
                arrivals,
                current: Mutex::new(None),
                next_link: AtomicU64::new(0),
                refuse: AtomicBool::new(false),
                connections: AtomicUsize::new(0),
                in_flight: DashMap::new(),
                peak_in_flight: DashMap::new(),
                producer_kinds: DashMap::new(),
                consumers: DashMap::new(),
            }),
        }
    }

    /// Peers and producers reported in the `joinRoom` answer.
    #[must_use]
    pub fn with_room(
        self,
        peers: impl IntoIterator<Item = PeerId>,
        producers: impl IntoIterator<Item = ProducerAnnouncement>,
    ) -> Self {
        let producers: Vec<_> = producers.into_iter().collect();
        for producer in &producers {
            self.inner
                .producer_kinds
                .insert(producer.producer_id.clone(), producer.kind);
        }
        {
            let mut behavior = self.inner.behavior.lock().unwrap();
            behavior.peers = peers.into_iter().collect();
            behavior.producers = producers;
        }
        self
    }

    /// Answer `operation` with `reply`.
    #[must_use]
    pub fn with_reply(self, operation: &str, reply: Reply) -> Self {
        self.set_reply(operation, reply);
        self
    }

    /// Delay every answer to `operation`.
    #[must_use]
    pub fn with_delay(self, operation: &str, delay: Duration) -> Self {
        self.inner
            .behavior
            .lock()
            .unwrap()
            .delays
            .insert(operation.to_string(), delay);
        self
    }

    /// Change the answer to `operation` from now on.
    pub fn set_reply(&self, operation: &str, reply: Reply) {
        self.inner
            .behavior
            .lock()
            .unwrap()
            .replies
            .insert(operation.to_string(), reply);
    }

    /// Refuse (or accept again) new connections.
    pub fn refuse_connections(&self, refuse: bool) {
        self.inner.refuse.store(refuse, Ordering::SeqCst);
    }

    /// Connections accepted so far.
    #[must_use]
    pub fn connections(&self) -> usize {
        self.inner.connections.load(Ordering::SeqCst)
    }

    /// Whether a client link is open.
    #[must_use]
    pub fn is_linked(&self) -> bool {
        self.inner.current.lock().unwrap().is_some()
    }

    /// Close the live link from the server side. Returns false if none was open.
    pub fn drop_link(&self) -> bool {
        self.inner.current.lock().unwrap().take().is_some()
    }

    /// Push an event on the live link. Returns false if none was open.
    pub fn push(&self, event: &ServerEvent) -> bool {
        if let ServerEvent::NewProducer(announcement) = event {
            self.inner
                .producer_kinds
                .insert(announcement.producer_id.clone(), announcement.kind);
        }
        let frame = event.to_frame().unwrap();
        self.inner.send(None, &frame)
    }

    /// Push an arbitrary event frame, for names or payloads the client
    /// does not understand.
    pub fn push_raw(&self, event: &str, data: Value) -> bool {
        self.inner.send(
            None,
            &InboundFrame::Event {
                event: event.to_string(),
                data,
            },
        )
    }

    /// Every frame received so far.
    #[must_use]
    pub fn received(&self) -> Vec<Received> {
        self.inner.received.lock().unwrap().clone()
    }

    /// Payloads of requests for `operation`, in arrival order.
    #[must_use]
    pub fn requests(&self, operation: &str) -> Vec<Value> {
        self.payloads(operation, true)
    }

    /// Payloads of notifications for `operation`, in arrival order.
    #[must_use]
    pub fn notifications(&self, operation: &str) -> Vec<Value> {
        self.payloads(operation, false)
    }

    /// Requests plus notifications for `operation`.
    #[must_use]
    pub fn count(&self, operation: &str) -> usize {
        self.inner
            .received
            .lock()
            .unwrap()
            .iter()
            .filter(|received| received.frame.event() == operation)
            .count()
    }

    /// Wait until at least `n` frames for `operation` have arrived.
    ///
    /// # Panics
    ///
    /// Panics if they do not arrive within five seconds.
    pub async fn wait_for_count(&self, operation: &str, n: usize) {
        let mut arrivals = self.inner.arrivals.subscribe();
        let waited = tokio::time::timeout(
            WAIT_TIMEOUT,
            arrivals.wait_for(|_| self.count(operation) >= n),
        )
        .await;
        assert!(
            matches!(waited, Ok(Ok(_))),
            "timed out waiting for {n} x {operation}, saw {}",
            self.count(operation)
        );
    }

    /// Highest number of `operation` requests answered concurrently.
    /// Only delayed answers overlap.
    #[must_use]
    pub fn peak_in_flight(&self, operation: &str) -> usize {
        self.inner
            .peak_in_flight
            .get(operation)
            .map_or(0, |peak| *peak)
    }

    /// Consumer id handed out for `producer_id`.
    #[must_use]
    pub fn consumer_for(&self, producer_id: &ProducerId) -> Option<ConsumerId> {
        self.inner
            .consumers
            .get(producer_id)
            .map(|entry| entry.value().clone())
    }

    fn payloads(&self, operation: &str, requests: bool) -> Vec<Value> {
        self.inner
            .received
            .lock()
            .unwrap()
            .iter()
            .filter(|received| received.frame.event() == operation)
            .filter(|received| {
                matches!(received.frame, OutboundFrame::Request { .. }) == requests
            })
            .map(|received| received.frame.data().clone())
            .collect()
    }
}

#[async_trait]
impl SignalingConnector for MockSignalingServer {
    async fn connect(&self, _url: &str) -> Result<SignalingLink, RoomError> {
        if self.inner.refuse.load(Ordering::SeqCst) {
            return Err(RoomError::NotConnected);
        }

        let (outbound, from_client) = mpsc::unbounded_channel();
        let (to_client, inbound) = mpsc::unbounded_channel();
        let link = self.inner.next_link.fetch_add(1, Ordering::SeqCst) + 1;
        *self.inner.current.lock().unwrap() = Some((link, to_client));
        self.inner.connections.fetch_add(1, Ordering::SeqCst);

        tokio::spawn(Arc::clone(&self.inner).serve(link, from_client));
        Ok(SignalingLink { outbound, inbound })
    }
}

impl Inner {
    async fn serve(self: Arc<Self>, link: u64, mut from_client: mpsc::UnboundedReceiver<String>) {
        while let Some(text) = from_client.recv().await {
            let frame = match decode_outbound(&text) {
                Ok(frame) => frame,
                Err(e) => {
                    debug!(target: "room.test.server", error = %e, "Bad client frame");
                    continue;
                }
            };

            self.received.lock().unwrap().push(Received {
                link,
                frame: frame.clone(),
            });
            self.arrivals.send_modify(|count| *count += 1);

            if let OutboundFrame::Request { id, event, data } = frame {
                self.answer(link, id, event, &data);
            }
        }

        // Client closed its side
        let mut current = self.current.lock().unwrap();
        if current.as_ref().is_some_and(|(live, _)| *live == link) {
            *current = None;
        }
    }

    fn answer(self: &Arc<Self>, link: u64, id: u64, operation: String, data: &Value) {
        let (reply, delay) = {
            let behavior = self.behavior.lock().unwrap();
            (
                behavior
                    .replies
                    .get(&operation)
                    .cloned()
                    .unwrap_or(Reply::Default),
                behavior.delays.get(&operation).copied(),
            )
        };

        let outcome = match reply {
            Reply::Default => AckOutcome::Data(self.default_reply(&operation, data)),
            Reply::Data(value) => AckOutcome::Data(value),
            Reply::Error(reason) => AckOutcome::Error(reason),
            Reply::Silent => return,
        };
        let ack = InboundFrame::Ack { id, outcome };

        let Some(delay) = delay else {
            self.send(Some(link), &ack);
            return;
        };

        self.enter(&operation);
        let inner = Arc::clone(self);
        tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            inner.exit(&operation);
            inner.send(Some(link), &ack);
        });
    }

    fn default_reply(&self, operation: &str, data: &Value) -> Value {
        match operation {
            op::JOIN_ROOM => {
                let behavior = self.behavior.lock().unwrap();
                json!({
                    "rtpCapabilities": {"codecs": [{"mimeType": "audio/opus"}]},
                    "existingPeers": behavior.peers,
                    "existingProducers": behavior.producers,
                })
            }
            op::CREATE_TRANSPORT => json!({
                "id": format!("transport-{}", Uuid::new_v4()),
                "iceParameters": {"usernameFragment": "frag"},
                "iceCandidates": [],
                "dtlsParameters": {"role": "auto"},
            }),
            op::PRODUCE => json!({"id": format!("producer-{}", Uuid::new_v4())}),
            op::CONSUME => {
                let producer_id = ProducerId::new(
                    data.get("producerId")
                        .and_then(Value::as_str)
                        .unwrap_or_default(),
                );
                let kind = self
                    .producer_kinds
                    .get(&producer_id)
                    .map_or(MediaKind::Video, |kind| *kind);
                let consumer_id = ConsumerId::new(format!("consumer-{}", Uuid::new_v4()));
                self.consumers
                    .insert(producer_id.clone(), consumer_id.clone());
                json!({
                    "id": consumer_id,
                    "producerId": producer_id,
                    "kind": kind,
                    "rtpParameters": {},
                })
            }
            _ => Value::Null,
        }
    }

    /// Send on `link`, or on whatever link is live when `None`.
    fn send(&self, link: Option<u64>, frame: &InboundFrame) -> bool {
        let text = encode_inbound(frame).unwrap();
        let current = self.current.lock().unwrap();
        match current.as_ref() {
            Some((live, sender)) if link.map_or(true, |link| link == *live) => {
                sender.send(text).is_ok()
            }
            _ => false,
        }
    }

    fn enter(&self, operation: &str) {
        let mut active = self.in_flight.entry(operation.to_string()).or_insert(0);
        *active += 1;
        let now = *active;
        drop(active);

        let mut peak = self.peak_in_flight.entry(operation.to_string()).or_insert(0);
        *peak = (*peak).max(now);
    }

    fn exit(&self, operation: &str) {
        if let Some(mut active) = self.in_flight.get_mut(operation) {
            *active = active.saturating_sub(1);
        }
    }
}
