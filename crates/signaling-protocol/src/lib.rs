//! Signaling protocol for Roomcast.
//!
//! This crate implements the JSON wire format spoken between the room
//! client and the signaling server: request/acknowledgement frames,
//! fire-and-forget notifications, and unsolicited push events.
//!
//! No I/O happens here. The client crate owns the connection.

#![warn(clippy::pedantic)]

pub mod codec;
pub mod events;
pub mod frame;
pub mod messages;

pub use codec::CodecError;
pub use events::ServerEvent;
pub use frame::{AckOutcome, InboundFrame, OutboundFrame};
