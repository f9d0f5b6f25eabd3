//! Pre-configured test data: credentials, tracks, participants and sessions.

use crate::mock_transport::MockTransport;
use crate::recording_sink::RecordingSurfaceSink;

use chrono::{Duration as ChronoDuration, Utc};
use common::secret::SecretString;
use common::types::{ParticipantIdentity, RoomName};
use room_session::credential::JoinCredential;
use room_session::endpoint::RoomEndpoint;
use room_session::session::{
    ConnectionState, RoomSessionActor, RoomSessionHandle, SessionEvent, SessionSettings,
};
use room_session::transport::{RemoteParticipantInfo, TrackInfo, TrackKind};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

/// Room used across the session tests.
pub const TEST_ROOM: &str = "algebra-101";

/// Credential valid for another minute.
#[must_use]
pub fn credential_for(room: &str, participant: &str) -> JoinCredential {
    JoinCredential::new(
        RoomName::from(room),
        ParticipantIdentity::from(participant),
        SecretString::from(format!("test-token-{participant}")),
        Utc::now() + ChronoDuration::seconds(60),
    )
}

/// Credential that expired a minute ago.
#[must_use]
pub fn expired_credential(room: &str, participant: &str) -> JoinCredential {
    JoinCredential::new(
        RoomName::from(room),
        ParticipantIdentity::from(participant),
        SecretString::from(format!("test-token-{participant}")),
        Utc::now() - ChronoDuration::seconds(60),
    )
}

/// Credential with an empty token.
#[must_use]
pub fn empty_credential(room: &str, participant: &str) -> JoinCredential {
    JoinCredential::new(
        RoomName::from(room),
        ParticipantIdentity::from(participant),
        SecretString::from(""),
        Utc::now() + ChronoDuration::seconds(60),
    )
}

#[must_use]
pub fn video_track(sid: &str) -> TrackInfo {
    TrackInfo::new(sid, TrackKind::Video)
}

#[must_use]
pub fn audio_track(sid: &str) -> TrackInfo {
    TrackInfo::new(sid, TrackKind::Audio)
}

#[must_use]
pub fn remote_participant(identity: &str, tracks: Vec<TrackInfo>) -> RemoteParticipantInfo {
    RemoteParticipantInfo {
        identity: ParticipantIdentity::from(identity),
        tracks,
    }
}

/// Media service endpoint used by the mocks (never dialled).
#[must_use]
pub fn test_endpoint() -> RoomEndpoint {
    RoomEndpoint::parse("ws://127.0.0.1:7880").unwrap()
}

/// Default settings: `local-video` and `remote-video` surfaces, 10s timeout.
#[must_use]
pub fn test_settings() -> SessionSettings {
    SessionSettings::default()
}

/// Spawned session wired to a mock transport and a recording sink.
pub struct TestSession {
    pub handle: RoomSessionHandle,
    pub task: JoinHandle<()>,
    pub transport: Arc<MockTransport>,
    pub sink: Arc<RecordingSurfaceSink>,
    pub events: broadcast::Receiver<SessionEvent>,
}

impl TestSession {
    /// Spawn with default settings.
    #[must_use]
    pub fn spawn(transport: Arc<MockTransport>) -> Self {
        Self::spawn_with(transport, test_settings())
    }

    /// Spawn with custom settings.
    #[must_use]
    pub fn spawn_with(transport: Arc<MockTransport>, settings: SessionSettings) -> Self {
        let sink = RecordingSurfaceSink::new();
        let (handle, task) = RoomSessionActor::spawn(
            transport.clone(),
            sink.clone(),
            settings,
            CancellationToken::new(),
        );
        let events = handle.subscribe();
        Self {
            handle,
            task,
            transport,
            sink,
            events,
        }
    }

    /// Connect as `participant` to [`TEST_ROOM`].
    pub async fn connect_as(&self, participant: &str) -> Result<(), room_session::SessionError> {
        self.handle
            .connect(credential_for(TEST_ROOM, participant), test_endpoint())
            .await
    }

    /// Current state.
    pub async fn state(&self) -> ConnectionState {
        self.handle.snapshot().await.unwrap().state
    }

    /// Wait until the session reports `state`.
    ///
    /// # Panics
    ///
    /// Panics if the state is not reached within five seconds.
    pub async fn wait_for_state(&mut self, state: ConnectionState) {
        tokio::time::timeout(Duration::from_secs(5), async {
            loop {
                match self.events.recv().await {
                    Ok(SessionEvent::StateChanged(s)) if s == state => return,
                    Ok(_) | Err(broadcast::error::RecvError::Lagged(_)) => {}
                    Err(broadcast::error::RecvError::Closed) => {
                        panic!("session closed before reaching {state}")
                    }
                }
            }
        })
        .await
        .unwrap_or_else(|_| panic!("timed out waiting for {state}"));
    }

    /// Drain every event published so far.
    pub fn drain_events(&mut self) -> Vec<SessionEvent> {
        let mut events = Vec::new();
        while let Ok(event) = self.events.try_recv() {
            events.push(event);
        }
        events
    }
}
