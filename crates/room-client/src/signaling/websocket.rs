//! WebSocket connector.
//!
//! Bridges a `tokio-tungstenite` stream to a [`SignalingLink`] with one
//! writer and one reader task.

use super::{SignalingConnector, SignalingLink};
use crate::errors::RoomError;

use async_trait::async_trait;
use futures_util::{SinkExt, StreamExt};
use tokio::sync::mpsc;
use tokio_tungstenite::connect_async;
use tokio_tungstenite::tungstenite::Message;
use tracing::{debug, warn};

/// Connects to the signaling server over WebSocket.
#[derive(Debug, Clone, Copy, Default)]
pub struct WebSocketConnector;

#[async_trait]
impl SignalingConnector for WebSocketConnector {
    async fn connect(&self, url: &str) -> Result<SignalingLink, RoomError> {
        let (stream, _) = connect_async(url).await.map_err(|e| {
            warn!(target: "room.signaling", url = %url, error = %e, "WebSocket connect failed");
            RoomError::NotConnected
        })?;
        debug!(target: "room.signaling", url = %url, "WebSocket connected");

        let (mut write, mut read) = stream.split();
        let (outbound_tx, mut outbound_rx) = mpsc::unbounded_channel::<String>();
        let (inbound_tx, inbound_rx) = mpsc::unbounded_channel::<String>();

        tokio::spawn(async move {
            while let Some(text) = outbound_rx.recv().await {
                if write.send(Message::Text(text)).await.is_err() {
                    break;
                }
            }
            // All senders dropped: the channel asked for a close
            let _ = write.close().await;
        });

        tokio::spawn(async move {
            while let Some(message) = read.next().await {
                let text = match message {
                    Ok(Message::Text(text)) => text,
                    Ok(Message::Binary(data)) => match String::from_utf8(data) {
                        Ok(text) => text,
                        Err(_) => continue,
                    },
                    Ok(Message::Close(_)) => break,
                    Ok(_) => continue,
                    Err(e) => {
                        debug!(target: "room.signaling", error = %e, "WebSocket read ended");
                        break;
                    }
                };
                if inbound_tx.send(text).is_err() {
                    break;
                }
            }
        });

        Ok(SignalingLink {
            outbound: outbound_tx,
            inbound: inbound_rx,
        })
    }
}
