//! Signaling frame types.
//!
//! Every frame is one JSON text message. The shape decides its role:
//!
//! | Direction | Shape | Meaning |
//! |-----------|-------|---------|
//! | client → server | `{"id", "event", "data"}` | request, expects an ack with the same id |
//! | client → server | `{"event", "data"}` | notification, no reply |
//! | server → client | `{"ack", "data"}` / `{"ack", "error"}` | reply to request `ack` |
//! | server → client | `{"event", "data"}` | push event |

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// A frame sent by the client.
#[derive(Debug, Clone, PartialEq)]
pub enum OutboundFrame {
    /// Operation expecting a correlated acknowledgement.
    Request {
        /// Correlation id, unique per connection.
        id: u64,
        /// Operation name.
        event: String,
        /// Operation payload.
        data: Value,
    },
    /// Fire-and-forget operation.
    Notify {
        /// Operation name.
        event: String,
        /// Operation payload.
        data: Value,
    },
}

impl OutboundFrame {
    /// Operation name carried by this frame.
    #[must_use]
    pub fn event(&self) -> &str {
        match self {
            OutboundFrame::Request { event, .. } | OutboundFrame::Notify { event, .. } => event,
        }
    }

    /// Payload carried by this frame.
    #[must_use]
    pub fn data(&self) -> &Value {
        match self {
            OutboundFrame::Request { data, .. } | OutboundFrame::Notify { data, .. } => data,
        }
    }
}

/// Result carried by an acknowledgement.
#[derive(Debug, Clone, PartialEq)]
pub enum AckOutcome {
    /// Server handled the request; `Value::Null` when it replied with nothing.
    Data(Value),
    /// Server refused the request.
    Error(String),
}

/// A frame received by the client.
#[derive(Debug, Clone, PartialEq)]
pub enum InboundFrame {
    /// Reply to an earlier request.
    Ack {
        /// Correlation id of the request being answered.
        id: u64,
        /// Reply payload or rejection.
        outcome: AckOutcome,
    },
    /// Unsolicited server push.
    Event {
        /// Event name.
        event: String,
        /// Event payload.
        data: Value,
    },
}

/// Raw JSON shape shared by all frames.
#[derive(Debug, Default, Serialize, Deserialize)]
pub(crate) struct RawFrame {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ack: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub event: Option<String>,
    #[serde(default, skip_serializing_if = "Value::is_null")]
    pub data: Value,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}
