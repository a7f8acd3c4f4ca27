//! Pre-configured test data and a session harness.

use crate::mock_media::MockMediaEngine;
use crate::mock_platform::RecordingPlatform;
use crate::mock_signaling::MockSignalingServer;

use common::types::{MediaKind, PeerId, ProducerId, StreamSource};
use room_client::config::Config;
use room_client::session::{RoomSession, RoomSessionHandle, RoomSnapshot};
use signaling_protocol::messages::{AppData, ProducerAnnouncement};
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

/// Room every harness joins unless told otherwise.
pub const TEST_ROOM: &str = "1234";

const WAIT_TIMEOUT: Duration = Duration::from_secs(5);

/// Configuration with short timings for tests.
#[must_use]
pub fn test_config() -> Config {
    let mut config = Config::new("ws://127.0.0.1:3000");
    config.request_timeout = Duration::from_millis(500);
    config.reconnect_attempts = 3;
    config.reconnect_backoff = Duration::from_millis(10);
    config.reconnect_backoff_max = Duration::from_millis(40);
    config.leave_drain_timeout = Duration::from_millis(500);
    config
}

/// A producer announcement.
#[must_use]
pub fn announcement(
    producer_id: &str,
    owner: &str,
    kind: MediaKind,
    source: Option<StreamSource>,
    paused: bool,
) -> ProducerAnnouncement {
    ProducerAnnouncement {
        producer_id: ProducerId::new(producer_id),
        owner_id: PeerId::new(owner),
        kind,
        paused,
        app_data: AppData { source },
    }
}

/// A peer's camera.
#[must_use]
pub fn camera(producer_id: &str, owner: &str) -> ProducerAnnouncement {
    announcement(
        producer_id,
        owner,
        MediaKind::Video,
        Some(StreamSource::Camera),
        false,
    )
}

/// A peer's microphone.
#[must_use]
pub fn microphone(producer_id: &str, owner: &str) -> ProducerAnnouncement {
    announcement(
        producer_id,
        owner,
        MediaKind::Audio,
        Some(StreamSource::Microphone),
        false,
    )
}

/// A peer's screen share.
#[must_use]
pub fn screen(producer_id: &str, owner: &str) -> ProducerAnnouncement {
    announcement(
        producer_id,
        owner,
        MediaKind::Video,
        Some(StreamSource::Screen),
        false,
    )
}

/// A spawned session wired to mocks.
pub struct TestSession {
    pub handle: RoomSessionHandle,
    pub task: JoinHandle<()>,
    pub server: MockSignalingServer,
    pub engine: MockMediaEngine,
    pub platform: Arc<RecordingPlatform>,
}

impl TestSession {
    /// Spawn against `server` with a working engine.
    #[must_use]
    pub fn spawn(server: MockSignalingServer) -> Self {
        Self::spawn_with(server, MockMediaEngine::new(), &test_config())
    }

    /// Spawn with an explicit engine and configuration.
    #[must_use]
    pub fn spawn_with(server: MockSignalingServer, engine: MockMediaEngine, config: &Config) -> Self {
        let platform = Arc::new(RecordingPlatform::new());
        let (handle, task) = RoomSession::spawn(
            config,
            Arc::new(server.clone()),
            Arc::new(engine.clone()),
            platform.clone(),
            CancellationToken::new(),
        );
        Self {
            handle,
            task,
            server,
            engine,
            platform,
        }
    }

    /// Spawn and join [`TEST_ROOM`].
    ///
    /// # Panics
    ///
    /// Panics if the join fails.
    pub async fn joined(server: MockSignalingServer) -> Self {
        let session = Self::spawn(server);
        session.handle.join(TEST_ROOM).await.unwrap();
        session
    }

    /// Wait for a snapshot matching `predicate` and return it.
    ///
    /// # Panics
    ///
    /// Panics if none arrives within five seconds.
    pub async fn wait_until(
        &self,
        mut predicate: impl FnMut(&RoomSnapshot) -> bool,
    ) -> Arc<RoomSnapshot> {
        let mut updates = self.handle.subscribe();
        let snapshot = tokio::time::timeout(
            WAIT_TIMEOUT,
            updates.wait_for(|snapshot| predicate(snapshot)),
        )
        .await
        .expect("timed out waiting for snapshot")
        .expect("session stopped");
        Arc::clone(&snapshot)
    }

    /// Cancel the actor and wait for it to stop.
    ///
    /// # Panics
    ///
    /// Panics if the actor task panicked.
    pub async fn shutdown(self) {
        self.handle.cancel();
        self.task.await.unwrap();
    }
}
