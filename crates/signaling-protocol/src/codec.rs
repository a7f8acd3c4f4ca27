//! Codec for encoding and decoding signaling frames.
//!
//! Both directions are implemented: the client encodes [`OutboundFrame`]s
//! and decodes [`InboundFrame`]s, while test servers do the reverse.

use crate::frame::{AckOutcome, InboundFrame, OutboundFrame, RawFrame};
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;

/// Error type for codec operations
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum CodecError {
    /// Frame is not valid JSON or does not match the frame shape
    #[error("Invalid JSON: {0}")]
    InvalidJson(String),

    /// Frame has neither an `ack` nor an `event` field
    #[error("Unrecognized frame")]
    UnknownFrame,

    /// Required field missing from a frame
    #[error("Missing field: {0}")]
    MissingField(&'static str),

    /// Push event with a name this client does not understand
    #[error("Unknown event: {0}")]
    UnknownEvent(String),

    /// Payload does not match the expected shape
    #[error("Invalid payload for {event}: {reason}")]
    InvalidPayload {
        /// Event or operation name.
        event: String,
        /// Deserializer message.
        reason: String,
    },
}

fn to_text(raw: &RawFrame) -> Result<String, CodecError> {
    serde_json::to_string(raw).map_err(|e| CodecError::InvalidJson(e.to_string()))
}

fn from_text(text: &str) -> Result<RawFrame, CodecError> {
    serde_json::from_str(text).map_err(|e| CodecError::InvalidJson(e.to_string()))
}

/// Encode a client frame to its JSON text form
///
/// # Errors
///
/// Returns an error if the payload cannot be serialized
pub fn encode_outbound(frame: &OutboundFrame) -> Result<String, CodecError> {
    let raw = match frame {
        OutboundFrame::Request { id, event, data } => RawFrame {
            id: Some(*id),
            event: Some(event.clone()),
            data: data.clone(),
            ..RawFrame::default()
        },
        OutboundFrame::Notify { event, data } => RawFrame {
            event: Some(event.clone()),
            data: data.clone(),
            ..RawFrame::default()
        },
    };
    to_text(&raw)
}

/// Decode a client frame (server side)
///
/// # Errors
///
/// Returns an error if the text is not a request or notification frame
pub fn decode_outbound(text: &str) -> Result<OutboundFrame, CodecError> {
    let raw = from_text(text)?;
    let event = raw.event.ok_or(CodecError::MissingField("event"))?;
    Ok(match raw.id {
        Some(id) => OutboundFrame::Request {
            id,
            event,
            data: raw.data,
        },
        None => OutboundFrame::Notify {
            event,
            data: raw.data,
        },
    })
}

/// Encode a server frame (server side)
///
/// # Errors
///
/// Returns an error if the payload cannot be serialized
pub fn encode_inbound(frame: &InboundFrame) -> Result<String, CodecError> {
    let raw = match frame {
        InboundFrame::Ack {
            id,
            outcome: AckOutcome::Data(data),
        } => RawFrame {
            ack: Some(*id),
            data: data.clone(),
            ..RawFrame::default()
        },
        InboundFrame::Ack {
            id,
            outcome: AckOutcome::Error(reason),
        } => RawFrame {
            ack: Some(*id),
            error: Some(reason.clone()),
            ..RawFrame::default()
        },
        InboundFrame::Event { event, data } => RawFrame {
            event: Some(event.clone()),
            data: data.clone(),
            ..RawFrame::default()
        },
    };
    to_text(&raw)
}

/// Decode a server frame
///
/// An `ack` field wins over `event`: a frame carrying both is a reply.
///
/// # Errors
///
/// Returns an error if the text is not an acknowledgement or push event
pub fn decode_inbound(text: &str) -> Result<InboundFrame, CodecError> {
    let raw = from_text(text)?;

    if let Some(id) = raw.ack {
        let outcome = match raw.error {
            Some(reason) => AckOutcome::Error(reason),
            None => AckOutcome::Data(raw.data),
        };
        return Ok(InboundFrame::Ack { id, outcome });
    }

    match raw.event {
        Some(event) => Ok(InboundFrame::Event {
            event,
            data: raw.data,
        }),
        None => Err(CodecError::UnknownFrame),
    }
}

/// Serialize a typed payload into a frame body
///
/// # Errors
///
/// Returns an error if the payload cannot be represented as JSON
pub fn to_payload<T: Serialize + ?Sized>(event: &str, payload: &T) -> Result<Value, CodecError> {
    serde_json::to_value(payload).map_err(|e| CodecError::InvalidPayload {
        event: event.to_string(),
        reason: e.to_string(),
    })
}

/// Deserialize a frame body into a typed payload
///
/// # Errors
///
/// Returns an error if the body does not match `T`
pub fn from_payload<T: DeserializeOwned>(event: &str, data: Value) -> Result<T, CodecError> {
    serde_json::from_value(data).map_err(|e| CodecError::InvalidPayload {
        event: event.to_string(),
        reason: e.to_string(),
    })
}
