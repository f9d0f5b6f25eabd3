//! Connection lifecycle tests for the room session actor.
//!
//! Each test drives a session through a scripted transport and checks the
//! state machine, the surfaces left bound and the connection left open.

#![allow(clippy::unwrap_used, clippy::expect_used)]

use room_session::errors::{ConnectFailureReason, CredentialError, EndReason, SessionError};
use room_session::session::{ConnectionState, SessionEvent, SessionSettings, SurfaceLayout};
use room_session::transport::TrackKind;
use room_test_utils::*;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Notify;

use common::types::{ParticipantIdentity, SurfaceId};

fn classroom() -> ScriptedRoom {
    ScriptedRoom::new("alice")
        .with_local_track(video_track("TR_alice_v"))
        .with_local_track(audio_track("TR_alice_a"))
        .with_participant(remote_participant(
            "bob",
            vec![video_track("TR_bob_v"), audio_track("TR_bob_a")],
        ))
}

#[tokio::test]
async fn test_join_algebra_101_binds_bob() {
    let session = TestSession::spawn(MockTransport::accepting(classroom()));

    session.connect_as("alice").await.unwrap();

    let snapshot = session.handle.snapshot().await.unwrap();
    assert_eq!(snapshot.state, ConnectionState::Connected);
    assert_eq!(snapshot.room.unwrap().as_str(), "algebra-101");
    assert_eq!(snapshot.local.unwrap().identity.as_str(), "alice");

    // Local video on the local surface, local audio never bound
    let local = session.sink.bound_track("local-video").unwrap();
    assert_eq!(local.participant.as_str(), "alice");
    assert_eq!(local.kind, TrackKind::Video);

    // Bob's video on the remote surface; his audio registered but unbound
    let remote = session.sink.bound_track("remote-video").unwrap();
    assert_eq!(remote.participant.as_str(), "bob");
    assert_eq!(remote.sid.as_str(), "TR_bob_v");

    let bob_video = snapshot
        .participants
        .track("bob", TrackKind::Video)
        .unwrap();
    assert_eq!(bob_video.bound_surface, Some(SurfaceId::from("remote-video")));
    let bob_audio = snapshot
        .participants
        .track("bob", TrackKind::Audio)
        .unwrap();
    assert!(bob_audio.bound_surface.is_none());

    assert_eq!(snapshot.bound_surfaces, 2);
    assert_eq!(session.sink.active_bindings(), 2);
}

#[tokio::test]
async fn test_state_events_on_successful_connect() {
    let mut session = TestSession::spawn(MockTransport::accepting(classroom()));

    session.connect_as("alice").await.unwrap();

    let states: Vec<ConnectionState> = session
        .drain_events()
        .into_iter()
        .filter_map(|e| match e {
            SessionEvent::StateChanged(s) => Some(s),
            _ => None,
        })
        .collect();
    assert_eq!(
        states,
        vec![ConnectionState::Connecting, ConnectionState::Connected]
    );
}

#[tokio::test]
async fn test_connect_while_connecting_is_rejected() {
    let gate = Arc::new(Notify::new());
    let transport = MockTransport::builder()
        .accept_after(gate.clone(), classroom())
        .build();
    let mut session = TestSession::spawn(transport);

    let handle = session.handle.clone();
    let first = tokio::spawn(async move {
        handle
            .connect(credential_for(TEST_ROOM, "alice"), test_endpoint())
            .await
    });
    session.wait_for_state(ConnectionState::Connecting).await;

    let second = session.connect_as("alice").await;
    assert!(matches!(
        second,
        Err(SessionError::AlreadyConnected {
            state: ConnectionState::Connecting
        })
    ));

    // The in-flight attempt is untouched and still completes
    gate.notify_one();
    first.await.unwrap().unwrap();
    assert_eq!(session.state().await, ConnectionState::Connected);
    assert_eq!(session.transport.connect_calls(), 1);
}

#[tokio::test]
async fn test_connect_while_connected_is_rejected() {
    let session = TestSession::spawn(MockTransport::accepting(classroom()));
    session.connect_as("alice").await.unwrap();

    let result = session.connect_as("alice").await;

    assert!(matches!(
        result,
        Err(SessionError::AlreadyConnected {
            state: ConnectionState::Connected
        })
    ));
    assert_eq!(session.state().await, ConnectionState::Connected);
}

#[tokio::test]
async fn test_disconnect_twice_equals_once() {
    let session = TestSession::spawn(MockTransport::accepting(classroom()));
    session.connect_as("alice").await.unwrap();
    let room = session.transport.last_room();

    let first = session.handle.disconnect().await;
    let second = session.handle.disconnect().await;

    assert!(first.is_clean());
    assert_eq!(first.released_surfaces, 2);
    assert_eq!(first.cleared_tracks, 2);

    assert!(second.is_clean());
    assert_eq!(second.released_surfaces, 0);
    assert_eq!(second.cleared_tracks, 0);

    assert_eq!(room.close_calls(), 1);
    assert!(room.is_closed());
    assert_eq!(session.sink.active_bindings(), 0);

    let snapshot = session.handle.snapshot().await.unwrap();
    assert_eq!(snapshot.state, ConnectionState::Disconnected);
    assert_eq!(snapshot.participants.track_count(), 0);
    assert!(snapshot.room.is_none());
}

#[tokio::test]
async fn test_disconnect_when_idle_is_noop() {
    let session = TestSession::spawn(MockTransport::builder().build());

    let report = session.handle.disconnect().await;

    assert!(report.is_clean());
    assert_eq!(report.released_surfaces, 0);
    assert_eq!(session.state().await, ConnectionState::Idle);
}

#[tokio::test]
async fn test_disconnect_during_connect_abandons_attempt() {
    let gate = Arc::new(Notify::new());
    let transport = MockTransport::builder()
        .accept_after(gate.clone(), classroom())
        .build();
    let mut session = TestSession::spawn(transport);

    let handle = session.handle.clone();
    let pending = tokio::spawn(async move {
        handle
            .connect(credential_for(TEST_ROOM, "alice"), test_endpoint())
            .await
    });
    session.wait_for_state(ConnectionState::Connecting).await;

    let report = session.handle.disconnect().await;
    assert!(report.is_clean());
    assert_eq!(session.state().await, ConnectionState::Disconnecting);

    // Handshake completes after the disconnect
    gate.notify_one();
    let result = pending.await.unwrap();
    assert!(matches!(
        result,
        Err(SessionError::Connection {
            reason: ConnectFailureReason::Abandoned,
            ..
        })
    ));

    let snapshot = session.handle.snapshot().await.unwrap();
    assert_eq!(snapshot.state, ConnectionState::Disconnected);
    assert_eq!(snapshot.bound_surfaces, 0);
    assert_eq!(session.sink.active_bindings(), 0);
    assert_eq!(session.sink.attach_count(), 0);
    assert!(session.transport.last_room().is_closed());
}

#[tokio::test(start_paused = true)]
async fn test_connect_timeout() {
    let transport = MockTransport::builder().hang().build();
    let session = TestSession::spawn(transport);

    let result = session.connect_as("alice").await;

    assert!(matches!(
        result,
        Err(SessionError::Connection {
            reason: ConnectFailureReason::Timeout,
            ..
        })
    ));
    assert!(result.unwrap_err().is_retriable());
    assert_eq!(session.state().await, ConnectionState::Failed);
}

#[tokio::test(start_paused = true)]
async fn test_connect_timeout_respects_settings() {
    let transport = MockTransport::builder().hang().build();
    let settings = SessionSettings {
        connect_timeout: Duration::from_millis(250),
        ..test_settings()
    };
    let session = TestSession::spawn_with(transport, settings);

    let started = tokio::time::Instant::now();
    let result = session.connect_as("alice").await;

    assert!(result.is_err());
    assert!(started.elapsed() >= Duration::from_millis(250));
    assert!(started.elapsed() < Duration::from_secs(10));
}

#[tokio::test]
async fn test_expired_credential_leaves_state_unchanged() {
    let session = TestSession::spawn(MockTransport::accepting(classroom()));

    let result = session
        .handle
        .connect(expired_credential(TEST_ROOM, "alice"), test_endpoint())
        .await;

    assert!(matches!(
        result,
        Err(SessionError::Credential(CredentialError::Expired { .. }))
    ));
    assert_eq!(session.state().await, ConnectionState::Idle);
    assert_eq!(session.transport.connect_calls(), 0);
}

#[tokio::test]
async fn test_empty_credential_is_missing() {
    let session = TestSession::spawn(MockTransport::accepting(classroom()));

    let result = session
        .handle
        .connect(empty_credential(TEST_ROOM, "alice"), test_endpoint())
        .await;

    assert!(matches!(
        result,
        Err(SessionError::Credential(CredentialError::Missing))
    ));
    assert!(!result.unwrap_err().is_retriable());
    assert_eq!(session.state().await, ConnectionState::Idle);
}

#[tokio::test]
async fn test_rejected_token_fails_without_retry() {
    let transport = MockTransport::builder().reject("signature invalid").build();
    let mut session = TestSession::spawn(transport);

    let result = session.connect_as("alice").await;

    let err = result.unwrap_err();
    assert!(matches!(
        err,
        SessionError::Connection {
            reason: ConnectFailureReason::CredentialRejected,
            ..
        }
    ));
    assert!(!err.is_retriable());
    assert_eq!(session.state().await, ConnectionState::Failed);
    assert_eq!(session.transport.connect_calls(), 1);

    let errors = session
        .drain_events()
        .into_iter()
        .filter(|e| matches!(e, SessionEvent::Error(_)))
        .count();
    assert_eq!(errors, 1);
}

#[tokio::test]
async fn test_retry_after_failure() {
    let transport = MockTransport::builder()
        .network_error("connection refused")
        .accept(classroom())
        .build();
    let session = TestSession::spawn(transport);

    let first = session.connect_as("alice").await;
    assert!(first.unwrap_err().is_retriable());
    assert_eq!(session.state().await, ConnectionState::Failed);

    session.connect_as("alice").await.unwrap();
    assert_eq!(session.state().await, ConnectionState::Connected);
    assert_eq!(session.transport.connect_calls(), 2);
}

#[tokio::test]
async fn test_disconnect_from_failed() {
    let transport = MockTransport::builder().network_error("unreachable").build();
    let session = TestSession::spawn(transport);
    let _ = session.connect_as("alice").await;

    let report = session.handle.disconnect().await;

    assert!(report.is_clean());
    assert_eq!(session.state().await, ConnectionState::Disconnected);
}

#[tokio::test]
async fn test_server_disconnect_ends_session() {
    let mut session = TestSession::spawn(MockTransport::accepting(classroom()));
    session.connect_as("alice").await.unwrap();
    session.drain_events();
    let room = session.transport.last_room();

    room.server_disconnect(EndReason::Kicked).await;
    session.wait_for_state(ConnectionState::Disconnected).await;

    let ended = session
        .drain_events()
        .into_iter()
        .find_map(|e| match e {
            SessionEvent::Error(SessionError::SessionEnded(reason)) => Some(reason),
            _ => None,
        });
    assert_eq!(ended, Some(EndReason::Kicked));
    assert!(room.is_closed());
    assert_eq!(session.sink.active_bindings(), 0);

    let snapshot = session.handle.snapshot().await.unwrap();
    assert_eq!(snapshot.participants.track_count(), 0);
}

#[tokio::test]
async fn test_server_disconnect_passes_through_disconnecting() {
    let mut session = TestSession::spawn(MockTransport::accepting(classroom()));
    session.connect_as("alice").await.unwrap();
    session.drain_events();

    session
        .transport
        .last_room()
        .server_disconnect(EndReason::Expired)
        .await;
    // Room events are handled ahead of commands, so the reply follows teardown
    let snapshot = session.handle.snapshot().await.unwrap();
    assert_eq!(snapshot.state, ConnectionState::Disconnected);

    let transitions: Vec<ConnectionState> = session
        .drain_events()
        .into_iter()
        .filter_map(|e| match e {
            SessionEvent::StateChanged(state) => Some(state),
            _ => None,
        })
        .collect();
    assert_eq!(
        transitions,
        vec![ConnectionState::Disconnecting, ConnectionState::Disconnected]
    );
}

#[tokio::test]
async fn test_event_stream_end_is_network_lost() {
    let mut session = TestSession::spawn(MockTransport::accepting(classroom()));
    session.connect_as("alice").await.unwrap();
    session.drain_events();

    session.transport.last_room().end_stream();
    session.wait_for_state(ConnectionState::Disconnected).await;

    let ended = session.drain_events().into_iter().find_map(|e| match e {
        SessionEvent::Error(err @ SessionError::SessionEnded(_)) => Some(err),
        _ => None,
    });
    let err = ended.unwrap();
    assert!(matches!(err, SessionError::SessionEnded(EndReason::NetworkLost)));
    assert!(err.is_retriable());
}

#[tokio::test]
async fn test_reconnect_after_server_disconnect() {
    let transport = MockTransport::builder()
        .accept(classroom())
        .accept(ScriptedRoom::new("alice"))
        .build();
    let mut session = TestSession::spawn(transport);
    session.connect_as("alice").await.unwrap();

    session
        .transport
        .last_room()
        .server_disconnect(EndReason::Expired)
        .await;
    session.wait_for_state(ConnectionState::Disconnected).await;

    session.connect_as("alice").await.unwrap();
    let snapshot = session.handle.snapshot().await.unwrap();
    assert_eq!(snapshot.state, ConnectionState::Connected);
    assert_eq!(snapshot.participants.participants.len(), 0);
}

#[tokio::test]
async fn test_cancel_releases_everything() {
    let session = TestSession::spawn(MockTransport::accepting(classroom()));
    session.connect_as("alice").await.unwrap();
    let room = session.transport.last_room();

    session.handle.cancel();
    session.task.await.unwrap();

    assert!(room.is_closed());
    assert_eq!(session.sink.active_bindings(), 0);
}

#[tokio::test]
async fn test_unmount_guard_releases_everything() {
    let session = TestSession::spawn(MockTransport::accepting(classroom()));
    session.connect_as("alice").await.unwrap();
    let room = session.transport.last_room();

    let guard = session.handle.unmount_guard();
    drop(guard);
    session.task.await.unwrap();

    assert!(session.handle.is_cancelled());
    assert!(room.is_closed());
    assert_eq!(session.sink.active_bindings(), 0);
}

#[tokio::test]
async fn test_unmount_during_connect_closes_late_connection() {
    let gate = Arc::new(Notify::new());
    let transport = MockTransport::builder()
        .accept_after(gate.clone(), classroom())
        .build();
    let mut session = TestSession::spawn(transport);

    let handle = session.handle.clone();
    let pending = tokio::spawn(async move {
        handle
            .connect(credential_for(TEST_ROOM, "alice"), test_endpoint())
            .await
    });
    session.wait_for_state(ConnectionState::Connecting).await;

    session.handle.cancel();
    gate.notify_one();
    session.task.await.unwrap();

    assert!(matches!(
        pending.await.unwrap(),
        Err(SessionError::Connection {
            reason: ConnectFailureReason::Abandoned,
            ..
        })
    ));
    assert!(session.transport.last_room().is_closed());
    assert_eq!(session.sink.active_bindings(), 0);
}

#[tokio::test]
async fn test_custom_layout_without_default_remote() {
    let settings = SessionSettings {
        layout: SurfaceLayout::new(SurfaceId::from("camera"), None),
        ..test_settings()
    };
    let session = TestSession::spawn_with(MockTransport::accepting(classroom()), settings);

    session.connect_as("alice").await.unwrap();

    assert!(session.sink.bound_track("camera").is_some());
    assert!(session.sink.bound_track("remote-video").is_none());
    let snapshot = session.handle.snapshot().await.unwrap();
    assert!(snapshot
        .participants
        .track("bob", TrackKind::Video)
        .unwrap()
        .bound_surface
        .is_none());

    let surface = session
        .handle
        .bind_pending_track(ParticipantIdentity::from("bob"), TrackKind::Video)
        .await;
    assert!(matches!(surface, Err(SessionError::Binding(_))));
}
