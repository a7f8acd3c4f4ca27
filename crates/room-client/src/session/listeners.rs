//! Media engine callbacks wired to signaling and the session mailbox.

use super::mailbox::WeakMailbox;
use super::messages::SessionMessage;
use crate::media::{
    MediaError, ProducerCloseReason, ProducerListener, TransportDirection, TransportListener,
};
use crate::signaling::SignalingChannel;

use async_trait::async_trait;
use common::types::{MediaKind, ProducerId, StreamSource, TransportId};
use serde_json::Value;
use signaling_protocol::messages::{
    op, AppData, ConnectTransportRequest, ProduceRequest, ProduceResponse,
};
use tracing::{debug, warn};

/// Forwards transport negotiation to the signaling server.
pub(crate) struct SignalingTransportListener {
    channel: SignalingChannel,
    direction: TransportDirection,
}

impl SignalingTransportListener {
    pub(crate) fn new(channel: SignalingChannel, direction: TransportDirection) -> Self {
        Self { channel, direction }
    }
}

#[async_trait]
impl TransportListener for SignalingTransportListener {
    async fn on_connect(
        &self,
        transport_id: &TransportId,
        dtls_parameters: Value,
    ) -> Result<(), MediaError> {
        debug!(
            target: "room.session.transport",
            transport_id = %transport_id,
            direction = self.direction.as_str(),
            "Connecting transport"
        );
        self.channel
            .notify(
                op::CONNECT_TRANSPORT,
                &ConnectTransportRequest {
                    transport_id: transport_id.clone(),
                    dtls_parameters,
                },
            )
            .map_err(|e| MediaError::Failed(e.to_string()))
    }

    async fn on_produce(
        &self,
        transport_id: &TransportId,
        kind: MediaKind,
        rtp_parameters: Value,
        app_data: AppData,
    ) -> Result<ProducerId, MediaError> {
        let response: ProduceResponse = self
            .channel
            .request(
                op::PRODUCE,
                &ProduceRequest {
                    transport_id: transport_id.clone(),
                    kind,
                    rtp_parameters,
                    app_data,
                },
            )
            .await
            .map_err(|e| MediaError::Failed(e.to_string()))?;
        Ok(response.id)
    }

    fn on_connection_state(&self, transport_id: &TransportId, state: &str) {
        if state == "failed" || state == "disconnected" {
            warn!(
                target: "room.session.transport",
                transport_id = %transport_id,
                direction = self.direction.as_str(),
                state = state,
                "Transport connection degraded"
            );
        } else {
            debug!(
                target: "room.session.transport",
                transport_id = %transport_id,
                direction = self.direction.as_str(),
                state = state,
                "Transport connection state"
            );
        }
    }
}

/// Reports unsolicited producer closes back to the session.
pub(crate) struct MailboxProducerListener {
    source: StreamSource,
    mailbox: WeakMailbox,
}

impl MailboxProducerListener {
    pub(crate) fn new(source: StreamSource, mailbox: WeakMailbox) -> Self {
        Self { source, mailbox }
    }
}

impl ProducerListener for MailboxProducerListener {
    fn on_closed(&self, producer_id: &ProducerId, reason: ProducerCloseReason) {
        let queued = self.mailbox.send(SessionMessage::LocalProducerClosed {
            source: self.source,
            producer_id: producer_id.clone(),
            reason,
        });
        if !queued {
            debug!(
                target: "room.session.producer",
                producer_id = %producer_id,
                "Producer closed after session ended"
            );
        }
    }
}
