//! # Room Test Utilities
//!
//! Shared test utilities for the Roomcast room client.
//!
//! ## Modules
//!
//! - `mock_signaling` - In-memory signaling server with scripted answers
//! - `mock_media` - Media engine that records calls and can fail on demand
//! - `mock_platform` - Call platform that records indicators and routes
//! - `fixtures` - Producer announcements, test configuration and a session harness
//!
//! ## Usage
//!
//! ```rust,ignore
//! use room_test_utils::*;
//!
//! #[tokio::test]
//! async fn test_example() {
//!     let server = MockSignalingServer::new()
//!         .with_room(vec![PeerId::new("alice")], vec![camera("p1", "alice")]);
//!
//!     let session = TestSession::joined(server).await;
//!     session
//!         .wait_until(|snapshot| snapshot.streams.len() == 1)
//!         .await;
//!     session.shutdown().await;
//! }
//! ```

pub mod fixtures;
pub mod mock_media;
pub mod mock_platform;
pub mod mock_signaling;

pub use fixtures::*;
pub use mock_media::*;
pub use mock_platform::*;
pub use mock_signaling::*;
