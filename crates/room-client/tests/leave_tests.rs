//! Integration tests for leaving a room and for signaling link loss.

#![allow(clippy::unwrap_used, clippy::expect_used)]

use common::types::{PeerId, ProducerId, StreamSource};
use room_client::errors::RoomError;
use room_client::media::TransportDirection;
use room_client::session::{RoomSnapshot, SessionState};
use room_test_utils::{
    camera, test_config, EngineCall, MockMediaEngine, MockSignalingServer, Reply, TestSession,
    TEST_ROOM,
};
use signaling_protocol::messages::op;
use signaling_protocol::ServerEvent;
use std::time::Duration;

fn rendering(snapshot: &RoomSnapshot, producer_id: &str) -> bool {
    snapshot
        .streams
        .get(&ProducerId::new(producer_id))
        .is_some_and(|stream| stream.is_rendering())
}

fn assert_reset(snapshot: &RoomSnapshot) {
    assert_eq!(snapshot.session_state, SessionState::Idle);
    assert!(snapshot.room_id.is_none());
    assert!(!snapshot.signaling_connected);
    assert!(snapshot.peers.is_empty());
    assert!(snapshot.streams.is_empty());
    assert!(!snapshot.local.camera_open);
    assert!(!snapshot.local.mic_open);
    assert!(!snapshot.local.screen_share_open);
    assert_eq!(snapshot.local.local_volume, 0);
}

fn position(calls: &[EngineCall], matches: impl Fn(&EngineCall) -> bool) -> usize {
    calls
        .iter()
        .position(matches)
        .expect("expected engine call missing")
}

fn last_position(calls: &[EngineCall], matches: impl Fn(&EngineCall) -> bool) -> usize {
    calls
        .iter()
        .rposition(matches)
        .expect("expected engine call missing")
}

// ============================================================================
// Leave
// ============================================================================

#[tokio::test]
async fn test_leave_twice_reaches_same_empty_state() {
    let server = MockSignalingServer::new()
        .with_room(vec![PeerId::new("u1")], vec![camera("p1", "u1")]);
    let session = TestSession::joined(server).await;
    session.wait_until(|s| rendering(s, "p1")).await;
    session.handle.start_local_media(true, true).await.unwrap();

    session.handle.leave().await;
    let first = session.handle.snapshot();
    assert_reset(&first);

    session.handle.leave().await;
    let second = session.handle.snapshot();
    assert_reset(&second);
    assert_eq!(first.local, second.local);
    assert_eq!(session.engine.count(&EngineCall::Dispose), 1);
    assert!(!session.platform.call_indicator());

    session.shutdown().await;
}

#[tokio::test]
async fn test_leave_without_join_is_a_no_op() {
    let session = TestSession::spawn(MockSignalingServer::new());

    session.handle.leave().await;
    session.handle.leave().await;

    assert_reset(&session.handle.snapshot());
    assert!(session.engine.calls().is_empty());
    assert_eq!(session.platform.call_indicator_changes(), 0);

    session.shutdown().await;
}

#[tokio::test]
async fn test_leave_releases_resources_in_order() {
    let server = MockSignalingServer::new()
        .with_room(vec![PeerId::new("u1")], vec![camera("p1", "u1")]);
    let session = TestSession::joined(server).await;
    session.wait_until(|s| rendering(s, "p1")).await;
    session.handle.start_local_media(true, true).await.unwrap();
    let consumer_id = session.server.consumer_for(&ProducerId::new("p1")).unwrap();

    let before = session.engine.calls().len();
    session.handle.leave().await;
    let calls: Vec<_> = session.engine.calls().into_iter().skip(before).collect();

    let last_producer = last_position(&calls, |c| matches!(c, EngineCall::CloseProducer(_)));
    let first_capture = position(&calls, |c| matches!(c, EngineCall::CloseCapture(_)));
    let last_capture = last_position(&calls, |c| matches!(c, EngineCall::CloseCapture(_)));
    let send = position(&calls, |c| {
        *c == EngineCall::CloseTransport(TransportDirection::Send)
    });
    let recv = position(&calls, |c| {
        *c == EngineCall::CloseTransport(TransportDirection::Recv)
    });
    let dispose = position(&calls, |c| *c == EngineCall::Dispose);
    let consumer = position(&calls, |c| *c == EngineCall::CloseConsumer(consumer_id.clone()));

    assert!(last_producer < first_capture);
    assert!(last_capture < send);
    assert!(send < recv);
    assert!(recv < dispose);
    assert!(dispose < consumer);
    assert_eq!(
        calls
            .iter()
            .filter(|c| matches!(c, EngineCall::CloseProducer(_)))
            .count(),
        2
    );
    assert!(session.engine.open_captures().is_empty());
    assert_eq!(session.engine.open_consumers(), 0);

    session.shutdown().await;
}

#[tokio::test]
async fn test_leave_cancels_in_flight_consume() {
    let engine = MockMediaEngine::new().with_consume_delay(Duration::from_millis(300));
    let session = TestSession::spawn_with(MockSignalingServer::new(), engine, &test_config());
    session.handle.join(TEST_ROOM).await.unwrap();

    session.server.push(&ServerEvent::NewProducer(camera("p1", "u1")));
    session.server.wait_for_count(op::CONSUME, 1).await;

    session.handle.leave().await;
    assert_reset(&session.handle.snapshot());

    // The consume never completes against the disposed transport
    tokio::time::sleep(Duration::from_millis(400)).await;
    assert_eq!(
        session
            .engine
            .count(&EngineCall::Consume(ProducerId::new("p1"))),
        0
    );
    assert_eq!(session.engine.open_consumers(), 0);
    assert!(session.server.notifications(op::RESUME_CONSUMER).is_empty());

    session.shutdown().await;
}

#[tokio::test]
async fn test_leave_aborts_unanswered_join() {
    let server = MockSignalingServer::new().with_reply(op::JOIN_ROOM, Reply::Silent);
    let mut config = test_config();
    config.request_timeout = Duration::from_secs(30);
    let session = TestSession::spawn_with(server, MockMediaEngine::new(), &config);

    let join = tokio::spawn({
        let handle = session.handle.clone();
        async move { handle.join(TEST_ROOM).await }
    });
    session.server.wait_for_count(op::JOIN_ROOM, 1).await;

    session.handle.leave().await;
    assert_eq!(join.await.unwrap(), Err(RoomError::JoinAborted));
    assert_reset(&session.handle.snapshot());

    session.shutdown().await;
}

#[tokio::test]
async fn test_cancel_leaves_the_room() {
    let session = TestSession::joined(MockSignalingServer::new()).await;
    session.handle.start_local_media(false, true).await.unwrap();

    let engine = session.engine.clone();
    let platform = std::sync::Arc::clone(&session.platform);
    session.shutdown().await;

    assert_eq!(engine.count(&EngineCall::Dispose), 1);
    assert!(engine.open_captures().is_empty());
    assert!(!platform.call_indicator());
}

// ============================================================================
// Link loss
// ============================================================================

#[tokio::test]
async fn test_link_loss_rejoins_on_reconnect() {
    let server = MockSignalingServer::new()
        .with_room(vec![PeerId::new("u1")], vec![camera("p1", "u1")]);
    let session = TestSession::joined(server).await;
    session.wait_until(|s| rendering(s, "p1")).await;
    session.handle.start_local_media(false, true).await.unwrap();

    assert!(session.server.drop_link());

    let server = session.server.clone();
    let snapshot = session
        .wait_until(|s| s.is_joined() && rendering(s, "p1") && server.connections() == 2)
        .await;

    assert_eq!(snapshot.room_id.as_ref().map(|id| id.as_str()), Some(TEST_ROOM));
    assert!(snapshot.signaling_connected);
    assert!(!snapshot.local.mic_open);
    assert_eq!(session.server.requests(op::JOIN_ROOM).len(), 2);
    assert_eq!(session.server.requests(op::CONSUME).len(), 2);
    assert_eq!(session.engine.count(&EngineCall::LoadCapabilities), 2);
    assert_eq!(session.engine.count(&EngineCall::Dispose), 1);
    assert!(!session
        .engine
        .open_captures()
        .contains(&StreamSource::Microphone));

    // The call indicator stays on through the rejoin
    assert!(session.platform.call_indicator());
    assert_eq!(session.platform.call_indicator_changes(), 1);

    session.shutdown().await;
}

#[tokio::test]
async fn test_failed_reconnection_returns_to_idle() {
    let session = TestSession::joined(MockSignalingServer::new()).await;

    session.server.refuse_connections(true);
    assert!(session.server.drop_link());

    let snapshot = session
        .wait_until(|s| s.session_state == SessionState::Idle)
        .await;
    assert_reset(&snapshot);
    assert!(!session.platform.call_indicator());
    assert_eq!(session.server.connections(), 1);

    session.shutdown().await;
}

#[tokio::test]
async fn test_leave_while_reconnecting_stops_reconnection() {
    let mut config = test_config();
    config.reconnect_attempts = 10;
    config.reconnect_backoff = Duration::from_millis(50);
    config.reconnect_backoff_max = Duration::from_millis(50);
    let session = TestSession::spawn_with(MockSignalingServer::new(), MockMediaEngine::new(), &config);
    session.handle.join(TEST_ROOM).await.unwrap();

    session.server.refuse_connections(true);
    assert!(session.server.drop_link());
    session
        .wait_until(|s| s.session_state == SessionState::Joining)
        .await;

    session.handle.leave().await;
    assert_reset(&session.handle.snapshot());

    session.server.refuse_connections(false);
    tokio::time::sleep(Duration::from_millis(200)).await;
    assert_eq!(session.server.connections(), 1);
    assert_eq!(session.handle.snapshot().session_state, SessionState::Idle);

    session.shutdown().await;
}
