//! Scripted room transport for session testing.
//!
//! Each `connect` call consumes the next [`ConnectScript`]. Accepted
//! connections hand back a [`RoomController`] through which the test plays
//! the media service: pushing room events, closing the stream and checking
//! whether the session closed the connection.
//!
//! # Example
//!
//! ```rust,ignore
//! use room_test_utils::*;
//!
//! let transport = MockTransport::builder()
//!     .accept(ScriptedRoom::new("alice").with_participant(remote_participant(
//!         "bob",
//!         vec![video_track("TR_bob_v")],
//!     )))
//!     .build();
//!
//! // connect through a session, then:
//! let room = transport.last_room();
//! room.participant_left("bob").await;
//! ```

use common::types::ParticipantIdentity;
use room_session::credential::JoinCredential;
use room_session::endpoint::RoomEndpoint;
use room_session::errors::{EndReason, TransportError};
use room_session::transport::{
    EstablishedRoom, LocalParticipant, RemoteParticipantInfo, RoomConnection, RoomEvent,
    RoomTransport, TrackInfo,
};
use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use tokio::sync::{mpsc, Notify};

/// Capacity of each scripted room event stream.
const ROOM_EVENT_BUFFER: usize = 64;

/// What the media service looks like right after the handshake.
#[derive(Debug, Clone)]
pub struct ScriptedRoom {
    local: LocalParticipant,
    participants: Vec<RemoteParticipantInfo>,
    fail_close: bool,
}

impl ScriptedRoom {
    /// Room with only the local participant, publishing nothing.
    #[must_use]
    pub fn new(local_identity: &str) -> Self {
        Self {
            local: LocalParticipant {
                identity: ParticipantIdentity::from(local_identity),
                tracks: Vec::new(),
            },
            participants: Vec::new(),
            fail_close: false,
        }
    }

    /// Add a track published by the local participant.
    #[must_use]
    pub fn with_local_track(mut self, track: TrackInfo) -> Self {
        self.local.tracks.push(track);
        self
    }

    /// Add a remote participant already in the room.
    #[must_use]
    pub fn with_participant(mut self, participant: RemoteParticipantInfo) -> Self {
        self.participants.push(participant);
        self
    }

    /// Make `close()` on the resulting connection fail.
    #[must_use]
    pub fn failing_close(mut self) -> Self {
        self.fail_close = true;
        self
    }
}

/// Response to one `connect` call.
#[derive(Debug)]
pub enum ConnectScript {
    /// Handshake succeeds immediately.
    Accept(ScriptedRoom),
    /// Handshake succeeds once the gate is notified.
    AcceptAfter(Arc<Notify>, ScriptedRoom),
    /// Media service refuses the token.
    Reject(String),
    /// Network failure.
    NetworkError(String),
    /// Handshake never completes.
    Hang,
}

/// Mock `RoomTransport`.
#[derive(Debug, Default)]
pub struct MockTransport {
    scripts: Mutex<VecDeque<ConnectScript>>,
    connect_calls: AtomicUsize,
    rooms: Mutex<Vec<RoomController>>,
}

impl MockTransport {
    /// Create a new MockTransport builder.
    #[must_use]
    pub fn builder() -> MockTransportBuilder {
        MockTransportBuilder::default()
    }

    /// Transport whose first connect succeeds with `room`.
    #[must_use]
    pub fn accepting(room: ScriptedRoom) -> Arc<Self> {
        Self::builder().accept(room).build()
    }

    /// Queue another response.
    pub fn push(&self, script: ConnectScript) {
        self.scripts.lock().unwrap().push_back(script);
    }

    /// Number of `connect` calls made so far.
    #[must_use]
    pub fn connect_calls(&self) -> usize {
        self.connect_calls.load(Ordering::SeqCst)
    }

    /// Number of connections handed out.
    #[must_use]
    pub fn room_count(&self) -> usize {
        self.rooms.lock().unwrap().len()
    }

    /// Controller of the most recent accepted connection.
    ///
    /// # Panics
    ///
    /// Panics if no connection has been accepted yet.
    #[must_use]
    pub fn last_room(&self) -> RoomController {
        self.rooms
            .lock()
            .unwrap()
            .last()
            .cloned()
            .expect("no connection accepted yet")
    }

    fn open_room(&self, room: ScriptedRoom) -> EstablishedRoom {
        let (sender, events) = mpsc::channel(ROOM_EVENT_BUFFER);
        let controller = RoomController {
            events: Arc::new(Mutex::new(Some(sender))),
            closed: Arc::new(AtomicBool::new(false)),
            close_calls: Arc::new(AtomicUsize::new(0)),
        };
        let connection = MockConnection {
            closed: controller.closed.clone(),
            close_calls: controller.close_calls.clone(),
            fail_close: room.fail_close,
        };
        self.rooms.lock().unwrap().push(controller);

        EstablishedRoom {
            connection: Box::new(connection),
            local: room.local,
            participants: room.participants,
            events,
        }
    }
}

#[async_trait::async_trait]
impl RoomTransport for MockTransport {
    async fn connect(
        &self,
        _endpoint: &RoomEndpoint,
        _credential: &JoinCredential,
    ) -> Result<EstablishedRoom, TransportError> {
        self.connect_calls.fetch_add(1, Ordering::SeqCst);
        let script = self.scripts.lock().unwrap().pop_front();

        match script {
            Some(ConnectScript::Accept(room)) => Ok(self.open_room(room)),
            Some(ConnectScript::AcceptAfter(gate, room)) => {
                gate.notified().await;
                Ok(self.open_room(room))
            }
            Some(ConnectScript::Reject(reason)) => Err(TransportError::Rejected(reason)),
            Some(ConnectScript::NetworkError(reason)) => Err(TransportError::Network(reason)),
            Some(ConnectScript::Hang) => std::future::pending().await,
            None => Err(TransportError::Network("no scripted response".to_string())),
        }
    }
}

/// Builder for MockTransport configuration.
#[derive(Debug, Default)]
pub struct MockTransportBuilder {
    scripts: VecDeque<ConnectScript>,
}

impl MockTransportBuilder {
    /// Next connect succeeds with `room`.
    #[must_use]
    pub fn accept(mut self, room: ScriptedRoom) -> Self {
        self.scripts.push_back(ConnectScript::Accept(room));
        self
    }

    /// Next connect succeeds with `room` once `gate` is notified.
    #[must_use]
    pub fn accept_after(mut self, gate: Arc<Notify>, room: ScriptedRoom) -> Self {
        self.scripts.push_back(ConnectScript::AcceptAfter(gate, room));
        self
    }

    /// Next connect is refused.
    #[must_use]
    pub fn reject(mut self, reason: &str) -> Self {
        self.scripts
            .push_back(ConnectScript::Reject(reason.to_string()));
        self
    }

    /// Next connect fails with a network error.
    #[must_use]
    pub fn network_error(mut self, reason: &str) -> Self {
        self.scripts
            .push_back(ConnectScript::NetworkError(reason.to_string()));
        self
    }

    /// Next connect never completes.
    #[must_use]
    pub fn hang(mut self) -> Self {
        self.scripts.push_back(ConnectScript::Hang);
        self
    }

    /// Build the MockTransport.
    #[must_use]
    pub fn build(self) -> Arc<MockTransport> {
        Arc::new(MockTransport {
            scripts: Mutex::new(self.scripts),
            connect_calls: AtomicUsize::new(0),
            rooms: Mutex::new(Vec::new()),
        })
    }
}

/// The media service side of one accepted connection.
#[derive(Debug, Clone)]
pub struct RoomController {
    events: Arc<Mutex<Option<mpsc::Sender<RoomEvent>>>>,
    closed: Arc<AtomicBool>,
    close_calls: Arc<AtomicUsize>,
}

impl RoomController {
    /// Push a raw room event.
    ///
    /// # Panics
    ///
    /// Panics if the stream was ended or the session dropped it.
    pub async fn send(&self, event: RoomEvent) {
        let sender = self
            .events
            .lock()
            .unwrap()
            .clone()
            .expect("room event stream already ended");
        sender
            .send(event)
            .await
            .expect("session is no longer consuming room events");
    }

    /// Push a raw room event, ignoring a session that stopped listening.
    pub async fn try_send(&self, event: RoomEvent) -> bool {
        let sender = self.events.lock().unwrap().clone();
        match sender {
            Some(sender) => sender.send(event).await.is_ok(),
            None => false,
        }
    }

    pub async fn participant_joined(&self, participant: &str) {
        self.send(RoomEvent::ParticipantJoined {
            participant: ParticipantIdentity::from(participant),
        })
        .await;
    }

    pub async fn participant_left(&self, participant: &str) {
        self.send(RoomEvent::ParticipantLeft {
            participant: ParticipantIdentity::from(participant),
        })
        .await;
    }

    pub async fn track_published(&self, participant: &str, track: TrackInfo) {
        self.send(RoomEvent::TrackPublished {
            participant: ParticipantIdentity::from(participant),
            track,
        })
        .await;
    }

    pub async fn track_subscribed(&self, participant: &str, track: TrackInfo) {
        self.send(RoomEvent::TrackSubscribed {
            participant: ParticipantIdentity::from(participant),
            track,
        })
        .await;
    }

    pub async fn track_unsubscribed(&self, participant: &str, track: TrackInfo) {
        self.send(RoomEvent::TrackUnsubscribed {
            participant: ParticipantIdentity::from(participant),
            track,
        })
        .await;
    }

    /// Close the session from the server side.
    pub async fn server_disconnect(&self, reason: EndReason) {
        self.send(RoomEvent::Disconnected { reason }).await;
    }

    /// Drop the event stream without a `Disconnected` event.
    pub fn end_stream(&self) {
        self.events.lock().unwrap().take();
    }

    /// Whether the session closed this connection.
    #[must_use]
    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }

    /// How many times `close()` was called.
    #[must_use]
    pub fn close_calls(&self) -> usize {
        self.close_calls.load(Ordering::SeqCst)
    }
}

/// Mock `RoomConnection`.
#[derive(Debug)]
pub struct MockConnection {
    closed: Arc<AtomicBool>,
    close_calls: Arc<AtomicUsize>,
    fail_close: bool,
}

#[async_trait::async_trait]
impl RoomConnection for MockConnection {
    async fn close(&self) -> Result<(), TransportError> {
        self.close_calls.fetch_add(1, Ordering::SeqCst);
        if self.fail_close {
            return Err(TransportError::Network("scripted close failure".to_string()));
        }
        self.closed.store(true, Ordering::SeqCst);
        Ok(())
    }
}
