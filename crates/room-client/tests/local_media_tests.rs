//! Integration tests for local capture and publishing.

#![allow(clippy::unwrap_used, clippy::expect_used)]

use common::types::StreamSource;
use room_client::errors::RoomError;
use room_client::media::AudioOutput;
use room_test_utils::{
    test_config, EngineCall, MockMediaEngine, MockSignalingServer, Reply, TestSession, TEST_ROOM,
};
use serde_json::json;
use signaling_protocol::messages::op;

async fn joined_with(engine: MockMediaEngine) -> TestSession {
    let session = TestSession::spawn_with(MockSignalingServer::new(), engine, &test_config());
    session.handle.join(TEST_ROOM).await.unwrap();
    session
}

// ============================================================================
// Camera
// ============================================================================

#[tokio::test]
async fn test_toggle_camera_twice_pauses_instead_of_republishing() {
    let session = TestSession::joined(MockSignalingServer::new()).await;

    assert!(session.handle.toggle_camera().await.unwrap());
    assert!(session.handle.snapshot().local.camera_open);
    let producer_id = session.engine.producer_id(StreamSource::Camera).unwrap();

    assert!(!session.handle.toggle_camera().await.unwrap());
    assert!(!session.handle.snapshot().local.camera_open);

    assert_eq!(session.engine.count(&EngineCall::Produce(StreamSource::Camera)), 1);
    assert_eq!(session.engine.producer_paused(StreamSource::Camera), Some(true));
    assert_eq!(
        session.engine.count(&EngineCall::SetCaptureActive {
            source: StreamSource::Camera,
            active: false,
        }),
        1
    );
    let produce = session.server.requests(op::PRODUCE);
    assert_eq!(produce.len(), 1);
    let request = produce.first().unwrap();
    assert_eq!(request["kind"], "video");
    assert_eq!(request["appData"], json!({"source": "webcam"}));
    assert!(request["transportId"].is_string());
    session.server.wait_for_count(op::PAUSE_PRODUCER, 1).await;
    assert_eq!(
        session.server.notifications(op::PAUSE_PRODUCER),
        vec![json!({"producerId": producer_id})]
    );

    // Third toggle resumes the same producer
    assert!(session.handle.toggle_camera().await.unwrap());
    assert_eq!(session.engine.count(&EngineCall::Produce(StreamSource::Camera)), 1);
    assert_eq!(session.engine.producer_paused(StreamSource::Camera), Some(false));
    session.server.wait_for_count(op::RESUME_PRODUCER, 1).await;

    session.shutdown().await;
}

#[tokio::test]
async fn test_first_produce_connects_send_transport_once() {
    let session = TestSession::joined(MockSignalingServer::new()).await;

    session.handle.start_local_media(true, true).await.unwrap();
    session.server.wait_for_count(op::CONNECT_TRANSPORT, 1).await;

    let connects = session.server.notifications(op::CONNECT_TRANSPORT);
    assert_eq!(connects.len(), 1);
    assert!(connects.first().unwrap()["transportId"].is_string());
    assert_eq!(connects.first().unwrap()["dtlsParameters"]["role"], "client");
    assert_eq!(session.server.requests(op::PRODUCE).len(), 2);

    session.shutdown().await;
}

#[tokio::test]
async fn test_produce_failure_releases_capture() {
    let server =
        MockSignalingServer::new().with_reply(op::PRODUCE, Reply::Error("no router".to_string()));
    let session = TestSession::joined(server).await;

    let result = session.handle.toggle_camera().await;
    assert!(matches!(result, Err(RoomError::AdapterFailure(_))));
    assert!(!session.handle.snapshot().local.camera_open);
    assert!(session.engine.open_captures().is_empty());
    assert_eq!(
        session.engine.count(&EngineCall::CloseCapture(StreamSource::Camera)),
        1
    );

    session.shutdown().await;
}

#[tokio::test]
async fn test_flip_camera_switches_open_capture() {
    let session = TestSession::joined(MockSignalingServer::new()).await;
    session.handle.toggle_camera().await.unwrap();

    assert!(!session.handle.flip_camera().await.unwrap());
    assert!(!session.handle.snapshot().local.front_camera);
    assert_eq!(session.engine.count(&EngineCall::SwitchCamera), 1);

    session.shutdown().await;
}

#[tokio::test]
async fn test_flip_camera_before_capture_applies_to_next_capture() {
    let session = TestSession::joined(MockSignalingServer::new()).await;

    assert!(!session.handle.flip_camera().await.unwrap());
    session.handle.toggle_camera().await.unwrap();

    assert_eq!(session.engine.count(&EngineCall::SwitchCamera), 0);
    assert_eq!(
        session.engine.count(&EngineCall::OpenCapture {
            source: StreamSource::Camera,
            front_camera: false,
        }),
        1
    );

    session.shutdown().await;
}

// ============================================================================
// Start local media
// ============================================================================

#[tokio::test]
async fn test_camera_denial_only_rolls_back_camera() {
    let session =
        joined_with(MockMediaEngine::new().with_failing_capture(StreamSource::Camera)).await;

    let local = session.handle.start_local_media(true, true).await.unwrap();
    assert!(!local.camera_open);
    assert!(local.mic_open);
    assert_eq!(session.handle.snapshot().local, local);
    assert_eq!(
        session.engine.producer_paused(StreamSource::Microphone),
        Some(false)
    );
    assert!(session.engine.producer_id(StreamSource::Camera).is_none());

    // Still denied on retry; the error reaches the caller this time
    assert_eq!(
        session.handle.toggle_camera().await,
        Err(RoomError::CaptureUnavailable(StreamSource::Camera))
    );

    session.shutdown().await;
}

#[tokio::test]
async fn test_unwanted_mic_is_published_paused() {
    let session = TestSession::joined(MockSignalingServer::new()).await;

    let local = session.handle.start_local_media(true, false).await.unwrap();
    assert!(local.camera_open);
    assert!(!local.mic_open);
    assert_eq!(
        session.engine.producer_paused(StreamSource::Microphone),
        Some(true)
    );
    session.server.wait_for_count(op::PAUSE_PRODUCER, 1).await;

    // Unmuting resumes the existing producer
    assert!(session.handle.toggle_mic().await.unwrap());
    assert_eq!(
        session.engine.count(&EngineCall::Produce(StreamSource::Microphone)),
        1
    );
    assert_eq!(
        session.engine.producer_paused(StreamSource::Microphone),
        Some(false)
    );

    session.shutdown().await;
}

#[tokio::test]
async fn test_mic_that_cannot_be_muted_is_closed() {
    let session =
        joined_with(MockMediaEngine::new().with_failing_pause(StreamSource::Microphone)).await;

    let local = session.handle.start_local_media(false, false).await.unwrap();
    assert!(!local.mic_open);
    assert!(session.engine.producer_id(StreamSource::Microphone).is_none());
    assert!(!session
        .engine
        .open_captures()
        .contains(&StreamSource::Microphone));
    session.server.wait_for_count(op::CLOSE_PRODUCER, 1).await;

    session.shutdown().await;
}

#[tokio::test]
async fn test_toggle_mic_reports_denied_capture() {
    let session =
        joined_with(MockMediaEngine::new().with_failing_capture(StreamSource::Microphone)).await;

    assert_eq!(
        session.handle.toggle_mic().await,
        Err(RoomError::CaptureUnavailable(StreamSource::Microphone))
    );
    assert!(!session.handle.snapshot().local.mic_open);

    session.shutdown().await;
}

// ============================================================================
// Screen share
// ============================================================================

#[tokio::test]
async fn test_screen_share_requires_permission_token() {
    let session = TestSession::joined(MockSignalingServer::new()).await;

    assert_eq!(
        session.handle.toggle_screen_share(None).await,
        Err(RoomError::CaptureUnavailable(StreamSource::Screen))
    );
    assert!(!session.handle.snapshot().local.screen_share_open);
    assert!(!session.platform.screen_share_indicator());

    session.shutdown().await;
}

#[tokio::test]
async fn test_screen_share_start_and_stop() {
    let session = TestSession::joined(MockSignalingServer::new()).await;

    assert!(session
        .handle
        .toggle_screen_share(Some("projection-grant".to_string()))
        .await
        .unwrap());
    assert!(session.handle.snapshot().local.screen_share_open);
    assert!(session.platform.screen_share_indicator());
    let produce = session.server.requests(op::PRODUCE);
    assert_eq!(produce.first().unwrap()["appData"], json!({"source": "screen"}));
    let producer_id = session.engine.producer_id(StreamSource::Screen).unwrap();

    // Stopping needs no token
    assert!(!session.handle.toggle_screen_share(None).await.unwrap());
    assert!(!session.handle.snapshot().local.screen_share_open);
    assert!(!session.platform.screen_share_indicator());
    assert!(!session.engine.open_captures().contains(&StreamSource::Screen));
    session.server.wait_for_count(op::CLOSE_PRODUCER, 1).await;
    assert_eq!(
        session.server.notifications(op::CLOSE_PRODUCER),
        vec![json!({"producerId": producer_id})]
    );

    session.shutdown().await;
}

#[tokio::test]
async fn test_os_stopped_screen_share_is_cleaned_up() {
    let session = TestSession::joined(MockSignalingServer::new()).await;
    session
        .handle
        .toggle_screen_share(Some("projection-grant".to_string()))
        .await
        .unwrap();

    assert!(session.engine.end_capture(StreamSource::Screen));
    session.wait_until(|s| !s.local.screen_share_open).await;

    session.server.wait_for_count(op::CLOSE_PRODUCER, 1).await;
    assert!(!session.platform.screen_share_indicator());
    assert!(!session.engine.open_captures().contains(&StreamSource::Screen));
    assert!(session.engine.producer_id(StreamSource::Screen).is_none());

    // Sharing can start again
    assert!(session
        .handle
        .toggle_screen_share(Some("second-grant".to_string()))
        .await
        .unwrap());

    session.shutdown().await;
}

#[tokio::test]
async fn test_unplugged_camera_clears_flag() {
    let session = TestSession::joined(MockSignalingServer::new()).await;
    session.handle.toggle_camera().await.unwrap();

    assert!(session.engine.end_capture(StreamSource::Camera));
    session.wait_until(|s| !s.local.camera_open).await;
    assert!(session.engine.open_captures().is_empty());

    session.shutdown().await;
}

// ============================================================================
// Audio routing
// ============================================================================

#[tokio::test]
async fn test_switch_audio_output_routes_through_platform() {
    let session = TestSession::spawn(MockSignalingServer::new());

    session
        .handle
        .switch_audio_output(AudioOutput::Speaker)
        .await
        .unwrap();
    session
        .handle
        .switch_audio_output(AudioOutput::Bluetooth)
        .await
        .unwrap();
    assert_eq!(
        session.platform.routes(),
        vec![AudioOutput::Speaker, AudioOutput::Bluetooth]
    );

    session.shutdown().await;
}
