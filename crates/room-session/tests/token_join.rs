//! Joining a room with a credential fetched from the token service.

#![allow(clippy::unwrap_used, clippy::expect_used)]

use chrono::{Duration as ChronoDuration, Utc};
use common::types::{ParticipantIdentity, RoomName};
use room_session::credential::{HttpTokenProvider, DEFAULT_TOKEN_HTTP_TIMEOUT, TOKEN_PATH};
use room_session::errors::{CredentialError, SessionError};
use room_session::session::ConnectionState;
use room_test_utils::*;
use serde_json::json;
use wiremock::matchers::{body_json, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

#[tokio::test]
async fn test_join_with_issued_credential() {
    let server = MockServer::start().await;
    let expires_at = Utc::now() + ChronoDuration::minutes(10);
    Mock::given(method("POST"))
        .and(path(TOKEN_PATH))
        .and(body_json(json!({
            "roomName": "algebra-101",
            "participantIdentity": "alice"
        })))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "token": "issued-join-token",
            "expiresAt": expires_at.to_rfc3339()
        })))
        .expect(1)
        .mount(&server)
        .await;

    let provider = HttpTokenProvider::new(server.uri(), None, DEFAULT_TOKEN_HTTP_TIMEOUT).unwrap();
    let session = TestSession::spawn(MockTransport::accepting(
        ScriptedRoom::new("alice").with_local_track(video_track("TR_alice_v")),
    ));

    session
        .handle
        .join(
            &provider,
            &RoomName::from("algebra-101"),
            &ParticipantIdentity::from("alice"),
            test_endpoint(),
        )
        .await
        .unwrap();

    assert_eq!(session.state().await, ConnectionState::Connected);
    assert_eq!(session.transport.connect_calls(), 1);
}

#[tokio::test]
async fn test_join_rejected_by_token_service_never_dials() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path(TOKEN_PATH))
        .respond_with(ResponseTemplate::new(403))
        .mount(&server)
        .await;

    let provider = HttpTokenProvider::new(server.uri(), None, DEFAULT_TOKEN_HTTP_TIMEOUT).unwrap();
    let session = TestSession::spawn(MockTransport::accepting(ScriptedRoom::new("alice")));

    let result = session
        .handle
        .join(
            &provider,
            &RoomName::from("algebra-101"),
            &ParticipantIdentity::from("alice"),
            test_endpoint(),
        )
        .await;

    assert!(matches!(
        result,
        Err(SessionError::Credential(CredentialError::Rejected(_)))
    ));
    assert_eq!(session.state().await, ConnectionState::Idle);
    assert_eq!(session.transport.connect_calls(), 0);
}
