//! Remote stream consumption.
//!
//! Each announced stream gets its own task. Tasks share the receive
//! transport, which does not tolerate concurrent `consume` calls, so the
//! whole exchange (server request, engine call, resume notification) runs
//! under one lock per membership.

use super::mailbox::WeakMailbox;
use super::messages::SessionMessage;
use crate::errors::RoomError;
use crate::media::{ConsumeParams, MediaTransport};
use crate::observability::metrics;
use crate::signaling::SignalingChannel;

use common::types::{ConsumerId, ProducerId};
use dashmap::DashMap;
use serde_json::Value;
use signaling_protocol::messages::{op, ConsumeRequest, ConsumeResponse, ResumeConsumerRequest};
use std::sync::Arc;
use tokio::sync::{oneshot, Mutex};
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

/// Everything a consume task needs, shared across one membership.
pub(crate) struct ConsumeContext {
    pub(crate) channel: SignalingChannel,
    pub(crate) transport: Arc<dyn MediaTransport>,
    pub(crate) rtp_capabilities: Value,
    pub(crate) recv_lock: Arc<Mutex<()>>,
    /// Consumer id to producer id, for `consumerClosed` lookups.
    pub(crate) consumers: Arc<DashMap<ConsumerId, ProducerId>>,
    pub(crate) mailbox: WeakMailbox,
    pub(crate) membership: u64,
}

/// How a consume ended without error.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum ConsumeOutcome {
    /// Stream is rendering and the server was told to resume it.
    Resumed,
    /// Stream went away while consuming; the consumer was closed.
    Discarded,
}

impl ConsumeOutcome {
    fn as_str(self) -> &'static str {
        match self {
            ConsumeOutcome::Resumed => "success",
            ConsumeOutcome::Discarded => "discarded",
        }
    }
}

/// Spawn a consume task scoped to `membership`.
pub(crate) fn spawn_consume(
    context: Arc<ConsumeContext>,
    producer_id: ProducerId,
    membership: CancellationToken,
) {
    tokio::spawn(async move {
        tokio::select! {
            biased;

            () = membership.cancelled() => {
                debug!(
                    target: "room.session.consume",
                    producer_id = %producer_id,
                    "Consume cancelled"
                );
                metrics::record_consume("cancelled");
            }

            result = consume_stream(&context, &producer_id) => match result {
                Ok(outcome) => {
                    debug!(
                        target: "room.session.consume",
                        producer_id = %producer_id,
                        outcome = outcome.as_str(),
                        "Consume finished"
                    );
                    metrics::record_consume(outcome.as_str());
                }
                Err(e) => {
                    warn!(
                        target: "room.session.consume",
                        producer_id = %producer_id,
                        error = %e,
                        "Failed to consume stream"
                    );
                    metrics::record_consume(e.kind());
                }
            },
        }
    });
}

/// Consume one remote producer.
pub(crate) async fn consume_stream(
    context: &ConsumeContext,
    producer_id: &ProducerId,
) -> Result<ConsumeOutcome, RoomError> {
    let _guard = context.recv_lock.lock().await;

    let response: ConsumeResponse = context
        .channel
        .request(
            op::CONSUME,
            &ConsumeRequest {
                producer_id: producer_id.clone(),
                transport_id: context.transport.id().clone(),
                rtp_capabilities: context.rtp_capabilities.clone(),
            },
        )
        .await?;

    let consumer_id = response.consumer_id.clone();
    let consumer = context
        .transport
        .consume(ConsumeParams {
            consumer_id: response.consumer_id,
            producer_id: response.producer_id,
            kind: response.kind,
            rtp_parameters: response.rtp_parameters,
        })
        .await?;
    context
        .consumers
        .insert(consumer_id.clone(), producer_id.clone());

    let (tx, rx) = oneshot::channel();
    let queued = context.mailbox.send(SessionMessage::StreamReady {
        membership: context.membership,
        producer_id: producer_id.clone(),
        consumer: Arc::clone(&consumer),
        respond_to: tx,
    });
    if !queued {
        context.consumers.remove(&consumer_id);
        consumer.close().await;
        return Err(RoomError::Internal("session gone".to_string()));
    }

    let wanted = rx
        .await
        .map_err(|e| RoomError::Internal(format!("Response receive failed: {e}")))?;
    if !wanted {
        return Ok(ConsumeOutcome::Discarded);
    }

    context.channel.notify(
        op::RESUME_CONSUMER,
        &ResumeConsumerRequest { consumer_id },
    )?;
    Ok(ConsumeOutcome::Resumed)
}
