//! Roomcast room client library.
//!
//! Client side of a selective-forwarding video room:
//!
//! - Signaling channel with request/acknowledgement correlation, push
//!   dispatch and reconnection
//! - Media engine boundary the host application implements
//! - Peer and stream registry with copy-on-write snapshots
//! - Room session actor driving join, local publishing, remote
//!   consumption and leave
//!
//! # Architecture
//!
//! ```text
//! UI ──intents──► RoomSessionHandle ──► RoomSession (actor)
//!  ▲                                      ├── SignalingChannel ── WebSocket
//!  └──── watch<Arc<RoomSnapshot>> ◄───────├── Registry
//!                                         └── MediaEngine + CallPlatform
//! ```
//!
//! # Example
//!
//! ```no_run
//! # async fn demo(engine: std::sync::Arc<dyn room_client::media::MediaEngine>) -> Result<(), Box<dyn std::error::Error>> {
//! use room_client::config::Config;
//! use room_client::media::NoopPlatform;
//! use room_client::session::RoomSession;
//! use room_client::signaling::WebSocketConnector;
//! use std::sync::Arc;
//! use tokio_util::sync::CancellationToken;
//!
//! let config = Config::from_env()?;
//! let (session, _task) = RoomSession::spawn(
//!     &config,
//!     Arc::new(WebSocketConnector),
//!     engine,
//!     Arc::new(NoopPlatform),
//!     CancellationToken::new(),
//! );
//!
//! session.join("1234").await?;
//! session.start_local_media(true, true).await?;
//! session.leave().await;
//! # Ok(())
//! # }
//! ```
//!
//! # Modules
//!
//! - [`config`] - Configuration from environment
//! - [`errors`] - Error taxonomy
//! - [`media`] - Media engine and platform traits
//! - [`observability`] - Tracing setup and metrics
//! - [`registry`] - Peer and stream state
//! - [`session`] - Room session actor
//! - [`signaling`] - Signaling channel and connectors

pub mod config;
pub mod errors;
pub mod media;
pub mod observability;
pub mod registry;
pub mod session;
pub mod signaling;

pub use config::Config;
pub use errors::RoomError;
pub use session::{LocalMediaState, RoomSession, RoomSessionHandle, RoomSnapshot, SessionState};
