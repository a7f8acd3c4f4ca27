//! `SignalingChannel` - request/acknowledgement correlation and push dispatch.
//!
//! A channel owns at most one live [`SignalingLink`]. A supervisor task
//! reads the link, resolves pending requests by correlation id and hands
//! push events to the handlers registered with [`SignalingChannel::on`].
//!
//! # Lifecycle events
//!
//! Handlers registered for [`EVENT_CONNECT`] and [`EVENT_DISCONNECT`] see
//! link transitions. After an unexpected link loss the supervisor retries
//! with exponential backoff; each successful attempt emits `connect`
//! again, and giving up emits [`EVENT_RECONNECT_FAILED`].
//! [`SignalingChannel::disconnect`] deregisters every handler first, so a
//! requested disconnect is silent.

use super::{SignalingConnector, SignalingLink};
use crate::config::Config;
use crate::errors::RoomError;
use crate::observability::metrics;

use dashmap::DashMap;
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;
use signaling_protocol::codec::{self, from_payload, to_payload};
use signaling_protocol::{AckOutcome, InboundFrame, OutboundFrame};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;
use tokio::sync::{mpsc, oneshot};
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// Emitted after a link is established (first connect or reconnect).
pub const EVENT_CONNECT: &str = "connect";

/// Emitted after the link is lost unexpectedly.
pub const EVENT_DISCONNECT: &str = "disconnect";

/// Emitted when every reconnect attempt failed.
pub const EVENT_RECONNECT_FAILED: &str = "reconnect_failed";

/// Handler for a named event. Receives the event payload.
pub type EventHandler = Arc<dyn Fn(Value) + Send + Sync>;

/// Reconnect schedule after an unexpected link loss.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReconnectPolicy {
    /// Attempts before giving up; 0 disables reconnection.
    pub max_attempts: u32,
    /// Delay before the first attempt.
    pub base_delay: Duration,
    /// Upper bound on any delay.
    pub max_delay: Duration,
}

impl ReconnectPolicy {
    /// Never reconnect.
    #[must_use]
    pub const fn disabled() -> Self {
        Self {
            max_attempts: 0,
            base_delay: Duration::ZERO,
            max_delay: Duration::ZERO,
        }
    }

    /// Delay before the given 1-based attempt.
    #[must_use]
    pub fn delay_for(&self, attempt: u32) -> Duration {
        let exponent = attempt.saturating_sub(1).min(16);
        self.base_delay
            .saturating_mul(1_u32 << exponent)
            .min(self.max_delay)
    }
}

impl Default for ReconnectPolicy {
    fn default() -> Self {
        Self {
            max_attempts: crate::config::DEFAULT_RECONNECT_ATTEMPTS,
            base_delay: Duration::from_millis(crate::config::DEFAULT_RECONNECT_BACKOFF_MS),
            max_delay: Duration::from_millis(crate::config::DEFAULT_RECONNECT_BACKOFF_MAX_MS),
        }
    }
}

/// Channel tuning.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChannelOptions {
    /// Deadline for each request.
    pub request_timeout: Duration,
    /// Behaviour after an unexpected link loss.
    pub reconnect: ReconnectPolicy,
}

impl Default for ChannelOptions {
    fn default() -> Self {
        Self {
            request_timeout: Duration::from_millis(crate::config::DEFAULT_REQUEST_TIMEOUT_MS),
            reconnect: ReconnectPolicy::default(),
        }
    }
}

impl From<&Config> for ChannelOptions {
    fn from(config: &Config) -> Self {
        Self {
            request_timeout: config.request_timeout,
            reconnect: ReconnectPolicy {
                max_attempts: config.reconnect_attempts,
                base_delay: config.reconnect_backoff,
                max_delay: config.reconnect_backoff_max,
            },
        }
    }
}

/// Handle to the signaling channel. Cheap to clone.
#[derive(Clone)]
pub struct SignalingChannel {
    inner: Arc<Inner>,
}

#[derive(Default)]
struct LinkSlot {
    /// Sender for the live link, absent while disconnected or reconnecting.
    outbound: Option<mpsc::UnboundedSender<String>>,
    /// Supervisor scope, present from `connect` until `disconnect`.
    supervisor: Option<CancellationToken>,
}

struct Inner {
    connector: Arc<dyn SignalingConnector>,
    url: String,
    options: ChannelOptions,
    next_id: AtomicU64,
    pending: DashMap<u64, oneshot::Sender<AckOutcome>>,
    handlers: DashMap<String, Vec<EventHandler>>,
    link: Mutex<LinkSlot>,
}

/// Removes a pending entry when the request future completes or is dropped.
struct PendingGuard<'a> {
    pending: &'a DashMap<u64, oneshot::Sender<AckOutcome>>,
    id: u64,
}

impl Drop for PendingGuard<'_> {
    fn drop(&mut self) {
        self.pending.remove(&self.id);
    }
}

impl SignalingChannel {
    /// Create a disconnected channel.
    pub fn new(
        connector: Arc<dyn SignalingConnector>,
        url: impl Into<String>,
        options: ChannelOptions,
    ) -> Self {
        Self {
            inner: Arc::new(Inner {
                connector,
                url: url.into(),
                options,
                next_id: AtomicU64::new(1),
                pending: DashMap::new(),
                handlers: DashMap::new(),
                link: Mutex::new(LinkSlot::default()),
            }),
        }
    }

    /// Whether a link is currently up.
    #[must_use]
    pub fn is_connected(&self) -> bool {
        self.inner.slot().outbound.is_some()
    }

    /// Establish the link and start dispatching.
    ///
    /// A no-op when already connected. Emits [`EVENT_CONNECT`] before any
    /// push event from the new link is dispatched.
    ///
    /// # Errors
    ///
    /// Returns the connector's error if the server cannot be reached.
    pub async fn connect(&self) -> Result<(), RoomError> {
        if self.is_connected() {
            debug!(target: "room.signaling", "Already connected");
            return Ok(());
        }

        // A supervisor still retrying a lost link is superseded
        if let Some(stale) = self.inner.slot().supervisor.take() {
            stale.cancel();
        }

        let link = self.inner.connector.connect(&self.inner.url).await?;
        let supervisor = CancellationToken::new();
        let inbound = self.inner.install(link, Some(supervisor.clone()));

        info!(
            target: "room.signaling",
            url = %self.inner.url,
            "Signaling channel connected"
        );
        self.inner.dispatch(EVENT_CONNECT, Value::Null);

        tokio::spawn(Arc::clone(&self.inner).supervise(inbound, supervisor));
        Ok(())
    }

    /// Close the link and deregister all handlers.
    ///
    /// Pending requests fail with `NotConnected`. Safe to call repeatedly.
    pub fn disconnect(&self) {
        self.inner.handlers.clear();

        let LinkSlot {
            outbound,
            supervisor,
        } = std::mem::take(&mut *self.inner.slot());
        if let Some(supervisor) = supervisor {
            supervisor.cancel();
        }
        // Dropping the last sender closes the link
        let was_connected = outbound.is_some();
        drop(outbound);

        self.inner.pending.clear();

        if was_connected {
            info!(target: "room.signaling", "Signaling channel disconnected");
        }
    }

    /// Register a handler for a push or lifecycle event.
    ///
    /// Handlers run on the supervisor task in delivery order and must not
    /// block.
    pub fn on<F>(&self, event: impl Into<String>, handler: F)
    where
        F: Fn(Value) + Send + Sync + 'static,
    {
        self.inner
            .handlers
            .entry(event.into())
            .or_default()
            .push(Arc::new(handler));
    }

    /// Send a request and wait for its typed acknowledgement.
    ///
    /// # Errors
    ///
    /// - `NotConnected` if no link is up or the link drops while waiting
    /// - `Timeout` if no acknowledgement arrives within the deadline
    /// - `Rejected` if the server answers with an error
    /// - `Decode` if the answer does not match `Resp`
    pub async fn request<Req, Resp>(&self, operation: &str, payload: &Req) -> Result<Resp, RoomError>
    where
        Req: Serialize + ?Sized,
        Resp: DeserializeOwned,
    {
        let data = to_payload(operation, payload)?;
        let response = self.request_raw(operation, data).await?;
        Ok(from_payload(operation, response)?)
    }

    /// Send a request and wait for the raw acknowledgement payload.
    ///
    /// # Errors
    ///
    /// See [`SignalingChannel::request`].
    pub async fn request_raw(&self, operation: &str, data: Value) -> Result<Value, RoomError> {
        let started = Instant::now();
        let result = self.inner.round_trip(operation, data).await;

        let outcome = match &result {
            Ok(_) => "success",
            Err(e) => e.kind(),
        };
        metrics::record_signaling_request(operation, outcome, started.elapsed());

        if let Err(e) = &result {
            debug!(
                target: "room.signaling",
                operation = operation,
                error = %e,
                "Signaling request failed"
            );
        }
        result
    }

    /// Fire-and-forget. At most one delivery attempt.
    ///
    /// # Errors
    ///
    /// Returns `NotConnected` if no link is up, `Decode` if the payload
    /// cannot be serialized.
    pub fn notify<Req>(&self, operation: &str, payload: &Req) -> Result<(), RoomError>
    where
        Req: Serialize + ?Sized,
    {
        let data = to_payload(operation, payload)?;
        let text = codec::encode_outbound(&OutboundFrame::Notify {
            event: operation.to_string(),
            data,
        })?;

        let outbound = self.inner.outbound()?;
        outbound.send(text).map_err(|_| RoomError::NotConnected)?;
        metrics::record_signaling_notify(operation);
        Ok(())
    }
}

impl Inner {
    fn slot(&self) -> MutexGuard<'_, LinkSlot> {
        self.link.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn outbound(&self) -> Result<mpsc::UnboundedSender<String>, RoomError> {
        self.slot().outbound.clone().ok_or(RoomError::NotConnected)
    }

    /// Make `link` the live link. Returns its inbound half.
    fn install(
        &self,
        link: SignalingLink,
        supervisor: Option<CancellationToken>,
    ) -> mpsc::UnboundedReceiver<String> {
        let mut slot = self.slot();
        slot.outbound = Some(link.outbound);
        if supervisor.is_some() {
            slot.supervisor = supervisor;
        }
        link.inbound
    }

    async fn round_trip(&self, operation: &str, data: Value) -> Result<Value, RoomError> {
        let outbound = self.outbound()?;

        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let text = codec::encode_outbound(&OutboundFrame::Request {
            id,
            event: operation.to_string(),
            data,
        })?;

        let (tx, rx) = oneshot::channel();
        self.pending.insert(id, tx);
        let _guard = PendingGuard {
            pending: &self.pending,
            id,
        };

        outbound.send(text).map_err(|_| RoomError::NotConnected)?;
        drop(outbound);

        match tokio::time::timeout(self.options.request_timeout, rx).await {
            Ok(Ok(AckOutcome::Data(value))) => Ok(value),
            Ok(Ok(AckOutcome::Error(reason))) => Err(RoomError::Rejected {
                operation: operation.to_string(),
                reason,
            }),
            // Sender dropped: link lost or channel disconnected
            Ok(Err(_)) => Err(RoomError::NotConnected),
            Err(_) => Err(RoomError::Timeout {
                operation: operation.to_string(),
            }),
        }
    }

    fn dispatch(&self, event: &str, data: Value) {
        // Clone out of the map so handlers may register further handlers
        let handlers = match self.handlers.get(event) {
            Some(handlers) => handlers.clone(),
            None => {
                debug!(target: "room.signaling", event = event, "No handler for event");
                return;
            }
        };
        for handler in handlers {
            handler(data.clone());
        }
    }

    fn handle_frame(&self, text: &str) {
        match codec::decode_inbound(text) {
            Ok(InboundFrame::Ack { id, outcome }) => match self.pending.remove(&id) {
                Some((_, respond_to)) => {
                    let _ = respond_to.send(outcome);
                }
                None => {
                    debug!(
                        target: "room.signaling",
                        id = id,
                        "Acknowledgement for unknown or expired request"
                    );
                }
            },
            Ok(InboundFrame::Event { event, data }) => {
                metrics::record_event_received(&event);
                self.dispatch(&event, data);
            }
            Err(e) => {
                warn!(
                    target: "room.signaling",
                    error = %e,
                    "Dropping malformed signaling frame"
                );
            }
        }
    }

    /// Read the live link until it closes, then reconnect per policy.
    async fn supervise(
        self: Arc<Self>,
        mut inbound: mpsc::UnboundedReceiver<String>,
        cancel: CancellationToken,
    ) {
        loop {
            loop {
                tokio::select! {
                    biased;

                    () = cancel.cancelled() => return,

                    frame = inbound.recv() => match frame {
                        Some(text) => self.handle_frame(&text),
                        None => break,
                    },
                }
            }

            if cancel.is_cancelled() {
                return;
            }

            self.slot().outbound = None;
            self.pending.clear();
            warn!(
                target: "room.signaling",
                url = %self.url,
                "Signaling link lost"
            );
            self.dispatch(EVENT_DISCONNECT, Value::Null);

            match self.reconnect(&cancel).await {
                Some(link) => {
                    inbound = self.install(link, None);
                    info!(
                        target: "room.signaling",
                        url = %self.url,
                        "Signaling channel reconnected"
                    );
                    self.dispatch(EVENT_CONNECT, Value::Null);
                }
                None => {
                    if !cancel.is_cancelled() {
                        warn!(
                            target: "room.signaling",
                            attempts = self.options.reconnect.max_attempts,
                            "Giving up on signaling reconnection"
                        );
                        self.dispatch(EVENT_RECONNECT_FAILED, Value::Null);
                    }
                    return;
                }
            }
        }
    }

    async fn reconnect(&self, cancel: &CancellationToken) -> Option<SignalingLink> {
        let policy = self.options.reconnect;

        for attempt in 1..=policy.max_attempts {
            let delay = policy.delay_for(attempt);
            debug!(
                target: "room.signaling",
                attempt = attempt,
                delay_ms = delay.as_millis(),
                "Scheduling reconnect"
            );

            tokio::select! {
                () = cancel.cancelled() => return None,
                () = tokio::time::sleep(delay) => {}
            }

            match self.connector.connect(&self.url).await {
                Ok(link) if !cancel.is_cancelled() => {
                    metrics::record_reconnect_attempt("success");
                    return Some(link);
                }
                Ok(_) => return None,
                Err(e) => {
                    metrics::record_reconnect_attempt("error");
                    warn!(
                        target: "room.signaling",
                        attempt = attempt,
                        error = %e,
                        "Reconnect attempt failed"
                    );
                }
            }
        }
        None
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use serde_json::json;
    use signaling_protocol::codec::{decode_outbound, encode_inbound};

    /// Server end of one in-memory link.
    struct ServerEnd {
        from_client: mpsc::UnboundedReceiver<String>,
        to_client: mpsc::UnboundedSender<String>,
    }

    /// Connector handing each new link's server end to the test.
    struct LoopbackConnector {
        links: mpsc::UnboundedSender<ServerEnd>,
    }

    #[async_trait]
    impl SignalingConnector for LoopbackConnector {
        async fn connect(&self, _url: &str) -> Result<SignalingLink, RoomError> {
            let (client_tx, from_client) = mpsc::unbounded_channel();
            let (to_client, client_rx) = mpsc::unbounded_channel();
            self.links
                .send(ServerEnd {
                    from_client,
                    to_client,
                })
                .map_err(|_| RoomError::NotConnected)?;
            Ok(SignalingLink {
                outbound: client_tx,
                inbound: client_rx,
            })
        }
    }

    fn channel_with(
        options: ChannelOptions,
    ) -> (SignalingChannel, mpsc::UnboundedReceiver<ServerEnd>) {
        let (links, server_ends) = mpsc::unbounded_channel();
        let connector = Arc::new(LoopbackConnector { links });
        (
            SignalingChannel::new(connector, "ws://test", options),
            server_ends,
        )
    }

    fn ack(id: u64, outcome: AckOutcome) -> String {
        encode_inbound(&InboundFrame::Ack { id, outcome }).unwrap()
    }

    fn request_id(text: &str) -> u64 {
        match decode_outbound(text).unwrap() {
            OutboundFrame::Request { id, .. } => id,
            OutboundFrame::Notify { .. } => panic!("expected request"),
        }
    }

    #[tokio::test]
    async fn test_request_before_connect_is_not_connected() {
        let (channel, _ends) = channel_with(ChannelOptions::default());

        let result = channel.request_raw("joinRoom", json!({})).await;
        assert_eq!(result, Err(RoomError::NotConnected));
        assert_eq!(
            channel.notify("resume", &json!({})),
            Err(RoomError::NotConnected)
        );
    }

    #[tokio::test]
    async fn test_concurrent_requests_resolve_by_correlation_id() {
        let (channel, mut ends) = channel_with(ChannelOptions::default());
        channel.connect().await.unwrap();
        let mut server = ends.recv().await.unwrap();

        let first = tokio::spawn({
            let channel = channel.clone();
            async move { channel.request_raw("createWebRtcTransport", json!({"sender": true})).await }
        });
        let second = tokio::spawn({
            let channel = channel.clone();
            async move { channel.request_raw("createWebRtcTransport", json!({"sender": false})).await }
        });

        let a = server.from_client.recv().await.unwrap();
        let b = server.from_client.recv().await.unwrap();
        let (id_a, id_b) = (request_id(&a), request_id(&b));
        assert_ne!(id_a, id_b);

        // Answer in reverse order, echoing the sender flag
        for text in [&b, &a] {
            let OutboundFrame::Request { id, data, .. } = decode_outbound(text).unwrap() else {
                panic!("expected request");
            };
            server
                .to_client
                .send(ack(id, AckOutcome::Data(json!({"sender": data["sender"]}))))
                .unwrap();
        }

        assert_eq!(first.await.unwrap().unwrap(), json!({"sender": true}));
        assert_eq!(second.await.unwrap().unwrap(), json!({"sender": false}));
    }

    #[tokio::test]
    async fn test_error_ack_is_rejected() {
        let (channel, mut ends) = channel_with(ChannelOptions::default());
        channel.connect().await.unwrap();
        let mut server = ends.recv().await.unwrap();

        let pending = tokio::spawn({
            let channel = channel.clone();
            async move { channel.request_raw("joinRoom", json!({"roomId": "1"})).await }
        });
        let id = request_id(&server.from_client.recv().await.unwrap());
        server
            .to_client
            .send(ack(id, AckOutcome::Error("room closed".to_string())))
            .unwrap();

        assert_eq!(
            pending.await.unwrap(),
            Err(RoomError::Rejected {
                operation: "joinRoom".to_string(),
                reason: "room closed".to_string(),
            })
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_request_times_out() {
        let options = ChannelOptions {
            request_timeout: Duration::from_secs(5),
            reconnect: ReconnectPolicy::disabled(),
        };
        let (channel, mut ends) = channel_with(options);
        channel.connect().await.unwrap();
        let _server = ends.recv().await.unwrap();

        let result = channel.request_raw("consume", json!({})).await;
        assert_eq!(
            result,
            Err(RoomError::Timeout {
                operation: "consume".to_string()
            })
        );
        assert!(channel.inner.pending.is_empty());
    }

    #[tokio::test]
    async fn test_typed_request_decode_error() {
        let (channel, mut ends) = channel_with(ChannelOptions::default());
        channel.connect().await.unwrap();
        let mut server = ends.recv().await.unwrap();

        let pending = tokio::spawn({
            let channel = channel.clone();
            async move {
                channel
                    .request::<_, signaling_protocol::messages::ProduceResponse>(
                        "produce",
                        &json!({}),
                    )
                    .await
            }
        });
        let id = request_id(&server.from_client.recv().await.unwrap());
        server
            .to_client
            .send(ack(id, AckOutcome::Data(Value::Null)))
            .unwrap();

        assert!(matches!(pending.await.unwrap(), Err(RoomError::Decode(_))));
    }

    #[tokio::test]
    async fn test_events_dispatch_in_order() {
        let (channel, mut ends) = channel_with(ChannelOptions::default());
        let (seen_tx, mut seen) = mpsc::unbounded_channel();
        channel.on("peerJoined", move |data| {
            let _ = seen_tx.send(data["socketId"].as_str().unwrap_or_default().to_string());
        });

        channel.connect().await.unwrap();
        let server = ends.recv().await.unwrap();

        for peer in ["u1", "u2", "u3"] {
            let frame = encode_inbound(&InboundFrame::Event {
                event: "peerJoined".to_string(),
                data: json!({"socketId": peer}),
            })
            .unwrap();
            server.to_client.send(frame).unwrap();
        }
        // Malformed frames are dropped without stopping dispatch
        server.to_client.send("garbage".to_string()).unwrap();

        assert_eq!(seen.recv().await.unwrap(), "u1");
        assert_eq!(seen.recv().await.unwrap(), "u2");
        assert_eq!(seen.recv().await.unwrap(), "u3");
    }

    #[tokio::test]
    async fn test_disconnect_deregisters_handlers_and_fails_requests() {
        let (channel, mut ends) = channel_with(ChannelOptions::default());
        let (seen_tx, mut seen) = mpsc::unbounded_channel();
        channel.on(EVENT_DISCONNECT, move |_| {
            let _ = seen_tx.send(());
        });
        channel.connect().await.unwrap();
        let mut server = ends.recv().await.unwrap();

        let pending = tokio::spawn({
            let channel = channel.clone();
            async move { channel.request_raw("joinRoom", json!({})).await }
        });
        let _ = server.from_client.recv().await.unwrap();

        channel.disconnect();
        channel.disconnect();

        assert_eq!(pending.await.unwrap(), Err(RoomError::NotConnected));
        assert!(!channel.is_connected());
        assert!(channel.inner.handlers.is_empty());
        // Requested disconnect is silent
        assert!(seen.try_recv().is_err());
        // Client side of the link is closed
        assert!(server.from_client.recv().await.is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn test_link_loss_reconnects_with_lifecycle_events() {
        let options = ChannelOptions {
            request_timeout: Duration::from_secs(5),
            reconnect: ReconnectPolicy {
                max_attempts: 3,
                base_delay: Duration::from_secs(1),
                max_delay: Duration::from_secs(4),
            },
        };
        let (channel, mut ends) = channel_with(options);
        let (events_tx, mut events) = mpsc::unbounded_channel();
        for name in [EVENT_CONNECT, EVENT_DISCONNECT] {
            let events_tx = events_tx.clone();
            channel.on(name, move |_| {
                let _ = events_tx.send(name);
            });
        }

        channel.connect().await.unwrap();
        assert_eq!(events.recv().await.unwrap(), EVENT_CONNECT);

        let mut server = ends.recv().await.unwrap();
        let pending = tokio::spawn({
            let channel = channel.clone();
            async move { channel.request_raw("consume", json!({})).await }
        });
        let _ = server.from_client.recv().await.unwrap();

        // Server drops the link
        drop(server);

        assert_eq!(pending.await.unwrap(), Err(RoomError::NotConnected));
        assert_eq!(events.recv().await.unwrap(), EVENT_DISCONNECT);
        assert_eq!(events.recv().await.unwrap(), EVENT_CONNECT);
        assert!(channel.is_connected());
        assert!(ends.recv().await.is_some());
    }

    #[tokio::test(start_paused = true)]
    async fn test_reconnect_gives_up_after_max_attempts() {
        let options = ChannelOptions {
            request_timeout: Duration::from_secs(5),
            reconnect: ReconnectPolicy {
                max_attempts: 2,
                base_delay: Duration::from_millis(100),
                max_delay: Duration::from_millis(100),
            },
        };
        let (channel, mut ends) = channel_with(options);
        let (failed_tx, mut failed) = mpsc::unbounded_channel();
        channel.on(EVENT_RECONNECT_FAILED, move |_| {
            let _ = failed_tx.send(());
        });

        channel.connect().await.unwrap();
        let server = ends.recv().await.unwrap();

        // With the test side gone every reconnect attempt is refused
        drop(ends);
        drop(server);

        failed.recv().await.unwrap();
        assert!(!channel.is_connected());
    }

    #[test]
    fn test_backoff_doubles_and_caps() {
        let policy = ReconnectPolicy::default();
        assert_eq!(policy.delay_for(1), Duration::from_secs(1));
        assert_eq!(policy.delay_for(2), Duration::from_secs(2));
        assert_eq!(policy.delay_for(3), Duration::from_secs(4));
        assert_eq!(policy.delay_for(5), Duration::from_secs(16));
        assert_eq!(policy.delay_for(6), Duration::from_secs(30));
        assert_eq!(policy.delay_for(40), Duration::from_secs(30));
    }

    #[test]
    fn test_options_from_config() {
        let mut config = Config::new("ws://localhost:3000");
        config.reconnect_attempts = 2;
        config.request_timeout = Duration::from_millis(250);

        let options = ChannelOptions::from(&config);
        assert_eq!(options.request_timeout, Duration::from_millis(250));
        assert_eq!(options.reconnect.max_attempts, 2);
        assert_eq!(options.reconnect.base_delay, Duration::from_secs(1));
    }
}
