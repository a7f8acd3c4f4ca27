//! Signaling channel to the room server.
//!
//! The channel speaks the [`signaling_protocol`] frame format over any
//! text pipe produced by a [`SignalingConnector`]. Production code uses
//! [`WebSocketConnector`]; tests plug in an in-memory server.

pub mod channel;
pub mod websocket;

pub use channel::{
    ChannelOptions, EventHandler, ReconnectPolicy, SignalingChannel, EVENT_CONNECT,
    EVENT_DISCONNECT, EVENT_RECONNECT_FAILED,
};
pub use websocket::WebSocketConnector;

use crate::errors::RoomError;
use async_trait::async_trait;
use tokio::sync::mpsc;

/// One established text connection to the signaling server.
///
/// Dropping `outbound` closes the connection. `inbound` yields `None`
/// once the server side is gone.
#[derive(Debug)]
pub struct SignalingLink {
    /// Frames to the server.
    pub outbound: mpsc::UnboundedSender<String>,
    /// Frames from the server.
    pub inbound: mpsc::UnboundedReceiver<String>,
}

/// Opens links to a signaling server.
#[async_trait]
pub trait SignalingConnector: Send + Sync + 'static {
    /// Establish a new link.
    ///
    /// # Errors
    ///
    /// Returns `RoomError::NotConnected` when the server cannot be reached.
    async fn connect(&self, url: &str) -> Result<SignalingLink, RoomError>;
}
