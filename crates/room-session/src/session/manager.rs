//! `RoomSessionActor` - one live-class room connection.
//!
//! The actor owns the connection, the participant registry and the surface
//! binder. Host commands, room events and the result of an in-flight connect
//! attempt are all consumed by a single `tokio::select!` loop, so handlers
//! never run concurrently and no state needs locking.
//!
//! # Lifecycle
//!
//! 1. Spawned idle; `connect` starts a handshake in a separate task bounded by
//!    the connect timeout
//! 2. On success the room event stream is attached to the loop
//! 3. `disconnect`, a server-side close, cancellation or dropping every handle
//!    tears the session down; teardown always runs to completion

use crate::config::{Config, MAX_DEPARTED_PARTICIPANTS};
use crate::credential::{JoinCredential, TokenProvider};
use crate::endpoint::RoomEndpoint;
use crate::errors::{BindingError, ConnectFailureReason, EndReason, SessionError, TeardownFailure};
use crate::observability::metrics;
use crate::transport::{
    EstablishedRoom, LocalParticipant, RoomConnection, RoomEvent, RoomTransport, TrackInfo,
    TrackKind,
};

use super::binder::{MediaSurfaceBinder, SurfaceLayout, SurfaceSink};
use super::messages::{
    ConnectionState, SessionEvent, SessionMessage, SessionSnapshot, TeardownReport,
};
use super::registry::{
    DepartedParticipants, ParticipantRegistry, ParticipantTrack, SubscriptionState, TrackKey,
    TrackRef,
};

use chrono::Utc;
use common::types::{ParticipantIdentity, RoomName, SurfaceId};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::{broadcast, mpsc, oneshot};
use tokio::task::{JoinError, JoinHandle};
use tokio_util::sync::{CancellationToken, DropGuard};
use tracing::{debug, info, instrument, warn};
use uuid::Uuid;

/// Default channel buffer size for the session mailbox.
const SESSION_CHANNEL_BUFFER: usize = 32;

/// Tunables for one session.
#[derive(Debug, Clone)]
pub struct SessionSettings {
    pub connect_timeout: Duration,
    pub credential_clock_skew: Duration,
    pub layout: SurfaceLayout,
    pub event_capacity: usize,
}

impl Default for SessionSettings {
    fn default() -> Self {
        Self {
            connect_timeout: Duration::from_millis(crate::config::DEFAULT_CONNECT_TIMEOUT_MS),
            credential_clock_skew: Duration::from_secs(
                crate::config::DEFAULT_CREDENTIAL_CLOCK_SKEW_SECONDS,
            ),
            layout: SurfaceLayout::default(),
            event_capacity: crate::config::DEFAULT_EVENT_CHANNEL_CAPACITY,
        }
    }
}

impl From<&Config> for SessionSettings {
    fn from(config: &Config) -> Self {
        Self {
            connect_timeout: config.connect_timeout,
            credential_clock_skew: config.credential_clock_skew,
            layout: SurfaceLayout::new(config.local_surface.clone(), config.remote_surface.clone()),
            event_capacity: config.event_channel_capacity,
        }
    }
}

/// Handle to a `RoomSessionActor`.
///
/// Cheap to clone. When the last handle is dropped the actor tears the
/// session down and exits.
#[derive(Clone, Debug)]
pub struct RoomSessionHandle {
    sender: mpsc::Sender<SessionMessage>,
    cancel_token: CancellationToken,
    events: broadcast::Sender<SessionEvent>,
    session_id: Uuid,
}

impl RoomSessionHandle {
    /// Get the session ID.
    #[must_use]
    pub fn session_id(&self) -> Uuid {
        self.session_id
    }

    /// Join a room with an already issued credential.
    ///
    /// Resolves once the attempt settles: connected, failed, timed out or
    /// abandoned by a concurrent `disconnect`.
    pub async fn connect(
        &self,
        credential: JoinCredential,
        endpoint: RoomEndpoint,
    ) -> Result<(), SessionError> {
        let (tx, rx) = oneshot::channel();
        self.sender
            .send(SessionMessage::Connect {
                credential,
                endpoint,
                respond_to: tx,
            })
            .await
            .map_err(|e| SessionError::Internal(format!("channel send failed: {e}")))?;

        rx.await
            .map_err(|e| SessionError::Internal(format!("response receive failed: {e}")))?
    }

    /// Fetch a credential from `provider`, then connect with it.
    pub async fn join(
        &self,
        provider: &dyn TokenProvider,
        room: &RoomName,
        participant: &ParticipantIdentity,
        endpoint: RoomEndpoint,
    ) -> Result<(), SessionError> {
        let credential = provider.fetch_credential(room, participant).await?;
        self.connect(credential, endpoint).await
    }

    /// Leave the room and release every resource. Idempotent.
    ///
    /// Returns an empty report if the actor has already stopped.
    pub async fn disconnect(&self) -> TeardownReport {
        let (tx, rx) = oneshot::channel();
        if self
            .sender
            .send(SessionMessage::Disconnect { respond_to: tx })
            .await
            .is_err()
        {
            return TeardownReport::default();
        }
        rx.await.unwrap_or_default()
    }

    /// Bind a participant's subscribed, unbound video track to its designated
    /// surface. Returns the surface. Audio is never bound.
    pub async fn bind_pending_track(
        &self,
        participant: ParticipantIdentity,
        kind: TrackKind,
    ) -> Result<SurfaceId, SessionError> {
        let (tx, rx) = oneshot::channel();
        self.sender
            .send(SessionMessage::BindPendingTrack {
                participant,
                kind,
                respond_to: tx,
            })
            .await
            .map_err(|e| SessionError::Internal(format!("channel send failed: {e}")))?;

        rx.await
            .map_err(|e| SessionError::Internal(format!("response receive failed: {e}")))?
    }

    /// Give a participant its own surface and move its video there.
    /// The local surface cannot be assigned.
    pub async fn assign_remote_surface(
        &self,
        participant: ParticipantIdentity,
        surface: SurfaceId,
    ) -> Result<(), SessionError> {
        let (tx, rx) = oneshot::channel();
        self.sender
            .send(SessionMessage::AssignRemoteSurface {
                participant,
                surface,
                respond_to: tx,
            })
            .await
            .map_err(|e| SessionError::Internal(format!("channel send failed: {e}")))?;

        rx.await
            .map_err(|e| SessionError::Internal(format!("response receive failed: {e}")))?
    }

    /// Take a participant's surface away. Its video stays registered, unbound.
    pub async fn release_remote_surface(
        &self,
        participant: ParticipantIdentity,
    ) -> Result<(), SessionError> {
        let (tx, rx) = oneshot::channel();
        self.sender
            .send(SessionMessage::ReleaseRemoteSurface {
                participant,
                respond_to: tx,
            })
            .await
            .map_err(|e| SessionError::Internal(format!("channel send failed: {e}")))?;

        rx.await
            .map_err(|e| SessionError::Internal(format!("response receive failed: {e}")))?
    }

    /// Get the current session snapshot.
    pub async fn snapshot(&self) -> Result<SessionSnapshot, SessionError> {
        let (tx, rx) = oneshot::channel();
        self.sender
            .send(SessionMessage::GetSnapshot { respond_to: tx })
            .await
            .map_err(|e| SessionError::Internal(format!("channel send failed: {e}")))?;

        rx.await
            .map_err(|e| SessionError::Internal(format!("response receive failed: {e}")))
    }

    /// Subscribe to session events.
    #[must_use]
    pub fn subscribe(&self) -> broadcast::Receiver<SessionEvent> {
        self.events.subscribe()
    }

    /// Cancel the session actor. Teardown runs before the task exits.
    pub fn cancel(&self) {
        self.cancel_token.cancel();
    }

    /// Check if the actor is cancelled.
    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        self.cancel_token.is_cancelled()
    }

    /// Guard that cancels the session when dropped, for hosts that tie the
    /// session to a view's lifetime.
    #[must_use]
    pub fn unmount_guard(&self) -> DropGuard {
        self.cancel_token.clone().drop_guard()
    }
}

/// A handshake running in its own task.
struct PendingConnect {
    room: RoomName,
    task: JoinHandle<Result<EstablishedRoom, SessionError>>,
    respond_to: oneshot::Sender<Result<(), SessionError>>,
    /// Set by `disconnect` while the handshake is running.
    abandoned: bool,
    started: Instant,
}

/// The `RoomSessionActor` implementation.
pub struct RoomSessionActor {
    session_id: Uuid,
    receiver: mpsc::Receiver<SessionMessage>,
    cancel_token: CancellationToken,
    events: broadcast::Sender<SessionEvent>,
    transport: Arc<dyn RoomTransport>,
    settings: SessionSettings,
    state: ConnectionState,
    registry: ParticipantRegistry,
    binder: MediaSurfaceBinder,
    /// Participants that left; late track events for them are dropped.
    tombstones: DepartedParticipants,
    connection: Option<Box<dyn RoomConnection>>,
    room_events: Option<mpsc::Receiver<RoomEvent>>,
    room: Option<RoomName>,
    local: Option<LocalParticipant>,
    pending: Option<PendingConnect>,
}

impl RoomSessionActor {
    /// Spawn a new session actor.
    ///
    /// Returns a handle and the task join handle.
    pub fn spawn(
        transport: Arc<dyn RoomTransport>,
        sink: Arc<dyn SurfaceSink>,
        settings: SessionSettings,
        cancel_token: CancellationToken,
    ) -> (RoomSessionHandle, JoinHandle<()>) {
        let (sender, receiver) = mpsc::channel(SESSION_CHANNEL_BUFFER);
        let (events, _) = broadcast::channel(settings.event_capacity.max(1));
        let session_id = Uuid::new_v4();

        let actor = Self {
            session_id,
            receiver,
            cancel_token: cancel_token.clone(),
            events: events.clone(),
            transport,
            settings,
            state: ConnectionState::Idle,
            registry: ParticipantRegistry::new(),
            binder: MediaSurfaceBinder::new(sink),
            tombstones: DepartedParticipants::with_capacity(MAX_DEPARTED_PARTICIPANTS),
            connection: None,
            room_events: None,
            room: None,
            local: None,
            pending: None,
        };

        let task_handle = tokio::spawn(actor.run());

        let handle = RoomSessionHandle {
            sender,
            cancel_token,
            events,
            session_id,
        };

        (handle, task_handle)
    }

    /// Run the actor loop.
    #[instrument(
        skip_all,
        name = "room.session",
        fields(session_id = %self.session_id)
    )]
    async fn run(mut self) {
        debug!(
            target: "room.session.actor",
            session_id = %self.session_id,
            "RoomSessionActor started"
        );

        loop {
            tokio::select! {
                biased;

                () = self.cancel_token.cancelled() => {
                    debug!(
                        target: "room.session.actor",
                        session_id = %self.session_id,
                        "RoomSessionActor received cancellation signal"
                    );
                    break;
                }

                outcome = wait_pending(&mut self.pending) => {
                    self.handle_connect_resolved(outcome).await;
                }

                event = next_room_event(&mut self.room_events) => {
                    match event {
                        Some(event) => self.handle_room_event(event).await,
                        None => {
                            warn!(
                                target: "room.session.actor",
                                session_id = %self.session_id,
                                "Room event stream ended"
                            );
                            self.end_session(EndReason::NetworkLost).await;
                        }
                    }
                }

                msg = self.receiver.recv() => {
                    match msg {
                        Some(message) => self.handle_message(message).await,
                        None => {
                            debug!(
                                target: "room.session.actor",
                                session_id = %self.session_id,
                                "All session handles dropped, exiting"
                            );
                            break;
                        }
                    }
                }
            }
        }

        self.shutdown().await;

        info!(
            target: "room.session.actor",
            session_id = %self.session_id,
            "RoomSessionActor stopped"
        );
    }

    async fn handle_message(&mut self, message: SessionMessage) {
        match message {
            SessionMessage::Connect {
                credential,
                endpoint,
                respond_to,
            } => {
                self.handle_connect(credential, endpoint, respond_to);
            }

            SessionMessage::Disconnect { respond_to } => {
                let report = self.handle_disconnect().await;
                let _ = respond_to.send(report);
            }

            SessionMessage::BindPendingTrack {
                participant,
                kind,
                respond_to,
            } => {
                let result = self.handle_bind_pending(&participant, kind);
                let _ = respond_to.send(result);
            }

            SessionMessage::AssignRemoteSurface {
                participant,
                surface,
                respond_to,
            } => {
                let result = self.handle_assign_surface(participant, surface);
                let _ = respond_to.send(result);
            }

            SessionMessage::ReleaseRemoteSurface {
                participant,
                respond_to,
            } => {
                let result = self.handle_release_surface(participant);
                let _ = respond_to.send(result);
            }

            SessionMessage::GetSnapshot { respond_to } => {
                let _ = respond_to.send(self.snapshot());
            }
        }
    }

    // ------------------------------------------------------------------
    // Connect
    // ------------------------------------------------------------------

    fn handle_connect(
        &mut self,
        credential: JoinCredential,
        endpoint: RoomEndpoint,
        respond_to: oneshot::Sender<Result<(), SessionError>>,
    ) {
        if self.state.is_active() {
            debug!(
                target: "room.session.actor",
                session_id = %self.session_id,
                state = %self.state,
                "Connect refused, session already active"
            );
            let _ = respond_to.send(Err(SessionError::AlreadyConnected { state: self.state }));
            return;
        }

        if let Err(e) = credential.validate(Utc::now(), self.settings.credential_clock_skew) {
            warn!(
                target: "room.session.actor",
                session_id = %self.session_id,
                error = %e,
                "Join credential failed local validation"
            );
            metrics::record_connect_attempt("invalid_credential", Duration::ZERO);
            let err = SessionError::from(e);
            self.emit(SessionEvent::Error(err.clone()));
            let _ = respond_to.send(Err(err));
            return;
        }

        let room = credential.room_name().clone();
        info!(
            target: "room.session.actor",
            session_id = %self.session_id,
            room = %room,
            participant = %credential.participant_identity(),
            endpoint = %endpoint,
            "Connecting to room"
        );

        self.set_state(ConnectionState::Connecting);

        let transport = Arc::clone(&self.transport);
        let timeout = self.settings.connect_timeout;
        let task = tokio::spawn(async move {
            match tokio::time::timeout(timeout, transport.connect(&endpoint, &credential)).await {
                Ok(Ok(room)) => Ok(room),
                Ok(Err(e)) => Err(SessionError::from(e)),
                Err(_) => Err(SessionError::Connection {
                    reason: ConnectFailureReason::Timeout,
                    detail: format!("no handshake response within {}ms", timeout.as_millis()),
                }),
            }
        });

        self.pending = Some(PendingConnect {
            room,
            task,
            respond_to,
            abandoned: false,
            started: Instant::now(),
        });
    }

    async fn handle_connect_resolved(
        &mut self,
        outcome: Result<Result<EstablishedRoom, SessionError>, JoinError>,
    ) {
        let Some(pending) = self.pending.take() else {
            return;
        };
        let elapsed = pending.started.elapsed();
        let outcome = outcome.unwrap_or_else(|e| {
            Err(SessionError::Internal(format!("connect task failed: {e}")))
        });

        if pending.abandoned {
            info!(
                target: "room.session.actor",
                session_id = %self.session_id,
                room = %pending.room,
                "Connect attempt resolved after disconnect, discarding"
            );
            if let Ok(established) = outcome {
                self.close_connection(established.connection).await;
            }
            metrics::record_connect_attempt(ConnectFailureReason::Abandoned.as_str(), elapsed);
            self.set_state(ConnectionState::Disconnected);
            let _ = pending.respond_to.send(Err(abandoned_error()));
            return;
        }

        match outcome {
            Ok(established) => {
                metrics::record_connect_attempt("success", elapsed);
                self.attach_room(pending.room, established);
                let _ = pending.respond_to.send(Ok(()));
            }
            Err(e) => {
                let outcome = match &e {
                    SessionError::Connection { reason, .. } => reason.as_str(),
                    other => other.code(),
                };
                metrics::record_connect_attempt(outcome, elapsed);
                warn!(
                    target: "room.session.actor",
                    session_id = %self.session_id,
                    room = %pending.room,
                    error = %e,
                    "Connect attempt failed"
                );
                self.set_state(ConnectionState::Failed);
                self.emit(SessionEvent::Error(e.clone()));
                let _ = pending.respond_to.send(Err(e));
            }
        }
    }

    /// Take ownership of an established room: bind local video, register the
    /// participants already present and start consuming room events.
    fn attach_room(&mut self, room: RoomName, established: EstablishedRoom) {
        let EstablishedRoom {
            connection,
            local,
            participants,
            events,
        } = established;

        self.connection = Some(connection);
        self.room_events = Some(events);

        let local_surface = self.settings.layout.local().clone();
        for track in local.tracks.iter().filter(|t| t.kind == TrackKind::Video) {
            let track_ref = TrackRef {
                participant: local.identity.clone(),
                kind: track.kind,
                sid: track.sid.clone(),
            };
            if let Err(e) = self.binder.bind(&track_ref, &local_surface) {
                self.emit_error(e.into());
            }
        }

        info!(
            target: "room.session.actor",
            session_id = %self.session_id,
            room = %room,
            participant = %local.identity,
            remote_participants = participants.len(),
            "Connected to room"
        );

        self.room = Some(room);
        self.local = Some(local);
        self.set_state(ConnectionState::Connected);

        for participant in participants {
            self.registry.join(participant.identity.clone());
            for track in participant.tracks {
                self.subscribe_track(participant.identity.clone(), track);
            }
        }

        self.publish_participants();
    }

    // ------------------------------------------------------------------
    // Room events
    // ------------------------------------------------------------------

    async fn handle_room_event(&mut self, event: RoomEvent) {
        metrics::record_room_event(event.kind());
        debug!(
            target: "room.session.actor",
            session_id = %self.session_id,
            event = event.kind(),
            "Room event"
        );

        match event {
            RoomEvent::ParticipantJoined { participant } => {
                self.tombstones.remove(&participant);
                if self.registry.join(participant) {
                    self.publish_participants();
                }
            }

            RoomEvent::ParticipantLeft { participant } => {
                self.on_participant_left(participant);
            }

            RoomEvent::TrackPublished { participant, track } => {
                if self.is_tombstoned(&participant, "track_published") {
                    return;
                }
                if self.registry.get(&participant, track.kind).is_none() {
                    self.registry.add(ParticipantTrack::new(
                        participant,
                        track,
                        SubscriptionState::Pending,
                    ));
                    self.publish_participants();
                }
            }

            RoomEvent::TrackSubscribed { participant, track } => {
                if self.is_tombstoned(&participant, "track_subscribed") {
                    return;
                }
                self.subscribe_track(participant, track);
                self.publish_participants();
            }

            RoomEvent::TrackUnsubscribed { participant, track } => {
                self.on_track_unsubscribed(&participant, &track);
            }

            RoomEvent::Disconnected { reason } => {
                self.end_session(reason).await;
            }
        }
    }

    fn is_tombstoned(&self, participant: &ParticipantIdentity, event: &'static str) -> bool {
        if !self.tombstones.contains(participant) {
            return false;
        }
        debug!(
            target: "room.session.actor",
            session_id = %self.session_id,
            participant = %participant,
            event = event,
            "Dropping event for departed participant"
        );
        metrics::record_event_dropped(event);
        true
    }

    /// Register a subscribed track and bind it when it is video and the
    /// participant has a designated surface.
    fn subscribe_track(&mut self, participant: ParticipantIdentity, track: TrackInfo) {
        let kind = track.kind;
        let sid = track.sid.clone();
        let previous = self.registry.add(ParticipantTrack::new(
            participant.clone(),
            track,
            SubscriptionState::Subscribed,
        ));

        // A republished track replaces the old one; its surface must not keep
        // showing the stale sid.
        if previous.is_some_and(|p| p.sid != sid) {
            let key = TrackKey::new(participant.clone(), kind);
            if let Err(e) = self.binder.unbind(&key) {
                self.emit_error(e.into());
            }
        }

        let has_surface = self
            .settings
            .layout
            .remote_surface_for(&participant)
            .is_some();
        if kind == TrackKind::Video && has_surface {
            if let Err(e) = self.bind_remote(&participant, kind) {
                self.emit_error(e);
            }
        } else {
            self.reconcile_bindings();
        }
    }

    fn on_track_unsubscribed(&mut self, participant: &ParticipantIdentity, track: &TrackInfo) {
        let matches = self
            .registry
            .get(participant, track.kind)
            .is_some_and(|t| t.sid == track.sid);
        if !matches {
            debug!(
                target: "room.session.actor",
                session_id = %self.session_id,
                participant = %participant,
                track_sid = %track.sid,
                "Unsubscribe for unknown track, ignoring"
            );
            metrics::record_event_dropped("track_unsubscribed");
            return;
        }

        let key = TrackKey::new(participant.clone(), track.kind);
        if let Err(e) = self.binder.unbind(&key) {
            self.emit_error(e.into());
        }
        self.registry.remove(participant, track.kind);
        self.publish_participants();
    }

    fn on_participant_left(&mut self, participant: ParticipantIdentity) {
        for key in self.registry.keys_for(&participant) {
            if let Err(e) = self.binder.unbind(&key) {
                self.emit_error(e.into());
            }
        }
        let removed = self.registry.remove_all(&participant);
        debug!(
            target: "room.session.actor",
            session_id = %self.session_id,
            participant = %participant,
            removed_tracks = removed.as_ref().map_or(0, Vec::len),
            "Participant left"
        );
        if let Some(forgotten) = self.tombstones.insert(participant) {
            debug!(
                target: "room.session.actor",
                session_id = %self.session_id,
                participant = %forgotten,
                "Forgetting oldest departed participant"
            );
        }
        if removed.is_some() {
            self.publish_participants();
        }
    }

    // ------------------------------------------------------------------
    // Surfaces
    // ------------------------------------------------------------------

    /// Bind a participant's subscribed track to its designated surface.
    fn bind_remote(
        &mut self,
        participant: &ParticipantIdentity,
        kind: TrackKind,
    ) -> Result<SurfaceId, SessionError> {
        let track = self
            .registry
            .get(participant, kind)
            .filter(|t| t.subscription_state == SubscriptionState::Subscribed)
            .map(ParticipantTrack::track_ref)
            .ok_or_else(|| {
                SessionError::NotFound(format!(
                    "no subscribed {kind} track for participant {participant}"
                ))
            })?;

        let surface = self
            .settings
            .layout
            .remote_surface_for(participant)
            .cloned()
            .ok_or_else(|| BindingError::NoSurface(participant.clone()))?;

        let result = self.binder.bind(&track, &surface);
        self.reconcile_bindings();

        if let Some(displaced) = result? {
            debug!(
                target: "room.session.actor",
                session_id = %self.session_id,
                surface = %surface,
                displaced = %displaced.participant,
                "Displaced track left unbound"
            );
        }
        Ok(surface)
    }

    fn handle_bind_pending(
        &mut self,
        participant: &ParticipantIdentity,
        kind: TrackKind,
    ) -> Result<SurfaceId, SessionError> {
        if kind != TrackKind::Video {
            return Err(BindingError::UnsupportedKind(kind).into());
        }
        if let Some(surface) = self
            .registry
            .get(participant, kind)
            .and_then(|t| t.bound_surface.clone())
        {
            return Ok(surface);
        }
        let result = self.bind_remote(participant, kind);
        if result.is_ok() {
            self.publish_participants();
        }
        result
    }

    fn handle_assign_surface(
        &mut self,
        participant: ParticipantIdentity,
        surface: SurfaceId,
    ) -> Result<(), SessionError> {
        debug!(
            target: "room.session.actor",
            session_id = %self.session_id,
            participant = %participant,
            surface = %surface,
            "Assigning remote surface"
        );
        if let Err(e) = self.settings.layout.assign(participant.clone(), surface) {
            warn!(
                target: "room.session.actor",
                session_id = %self.session_id,
                participant = %participant,
                error = %e,
                "Refusing surface assignment"
            );
            return Err(e.into());
        }

        let subscribed = self
            .registry
            .get(&participant, TrackKind::Video)
            .is_some_and(|t| t.subscription_state == SubscriptionState::Subscribed);
        if !subscribed {
            return Ok(());
        }

        let result = self.bind_remote(&participant, TrackKind::Video).map(|_| ());
        self.publish_participants();
        result
    }

    fn handle_release_surface(&mut self, participant: ParticipantIdentity) -> Result<(), SessionError> {
        debug!(
            target: "room.session.actor",
            session_id = %self.session_id,
            participant = %participant,
            "Releasing remote surface"
        );
        self.settings.layout.release(participant.clone());

        let key = TrackKey::new(participant, TrackKind::Video);
        let result = self.binder.unbind(&key);
        self.reconcile_bindings();

        match result {
            Ok(Some(_)) => {
                self.publish_participants();
                Ok(())
            }
            Ok(None) => Ok(()),
            Err(e) => {
                self.publish_participants();
                Err(e.into())
            }
        }
    }

    /// Copy the binder's view of which surface each track is on into the
    /// registry. The binder is authoritative.
    fn reconcile_bindings(&mut self) {
        for key in self.registry.keys() {
            let surface = self.binder.surface_of(&key).cloned();
            self.registry.set_bound_surface(&key, surface);
        }
    }

    // ------------------------------------------------------------------
    // Disconnect & teardown
    // ------------------------------------------------------------------

    async fn handle_disconnect(&mut self) -> TeardownReport {
        match self.state {
            ConnectionState::Idle
            | ConnectionState::Disconnecting
            | ConnectionState::Disconnected => TeardownReport::default(),

            ConnectionState::Connecting => {
                info!(
                    target: "room.session.actor",
                    session_id = %self.session_id,
                    "Disconnect requested while connecting, abandoning attempt"
                );
                if let Some(pending) = self.pending.as_mut() {
                    pending.abandoned = true;
                }
                self.set_state(ConnectionState::Disconnecting);
                TeardownReport::default()
            }

            ConnectionState::Connected | ConnectionState::Failed => {
                info!(
                    target: "room.session.actor",
                    session_id = %self.session_id,
                    state = %self.state,
                    "Disconnecting"
                );
                self.set_state(ConnectionState::Disconnecting);
                let report = self.teardown("disconnect").await;
                self.set_state(ConnectionState::Disconnected);
                report
            }
        }
    }

    /// Server closed the session (or the event stream ended).
    async fn end_session(&mut self, reason: EndReason) {
        info!(
            target: "room.session.actor",
            session_id = %self.session_id,
            reason = %reason,
            "Session ended by server"
        );
        self.set_state(ConnectionState::Disconnecting);
        self.teardown("server").await;
        self.set_state(ConnectionState::Disconnected);
        self.emit(SessionEvent::Error(SessionError::SessionEnded(reason)));
    }

    /// Release every resource. Never stops early; failures are collected.
    async fn teardown(&mut self, trigger: &'static str) -> TeardownReport {
        let (released_surfaces, unbind_failures) = self.binder.unbind_all();
        let mut failures: Vec<TeardownFailure> = unbind_failures
            .into_iter()
            .map(TeardownFailure::Unbind)
            .collect();

        let roster_changed = !self.registry.is_empty();
        let cleared_tracks = self.registry.clear().len();
        self.tombstones.clear();
        self.room_events = None;

        if let Some(connection) = self.connection.take() {
            if let Err(e) = connection.close().await {
                warn!(
                    target: "room.session.actor",
                    session_id = %self.session_id,
                    error = %e,
                    "Failed to close room connection"
                );
                failures.push(TeardownFailure::Close(e));
            }
        }

        self.room = None;
        self.local = None;

        metrics::record_teardown(trigger, failures.len());
        for failure in &failures {
            self.emit(SessionEvent::Error(SessionError::Teardown(failure.clone())));
        }
        if roster_changed {
            self.publish_participants();
        }

        debug!(
            target: "room.session.actor",
            session_id = %self.session_id,
            trigger = trigger,
            released_surfaces = released_surfaces,
            cleared_tracks = cleared_tracks,
            failures = failures.len(),
            "Teardown complete"
        );

        TeardownReport {
            released_surfaces,
            cleared_tracks,
            failures,
        }
    }

    /// Close a connection produced by an attempt nobody wants any more.
    async fn close_connection(&mut self, connection: Box<dyn RoomConnection>) {
        if let Err(e) = connection.close().await {
            warn!(
                target: "room.session.actor",
                session_id = %self.session_id,
                error = %e,
                "Failed to close abandoned connection"
            );
            self.emit(SessionEvent::Error(SessionError::Teardown(
                TeardownFailure::Close(e),
            )));
        }
    }

    /// Exit path: settle any in-flight attempt, then release everything.
    async fn shutdown(&mut self) {
        if let Some(pending) = self.pending.take() {
            debug!(
                target: "room.session.actor",
                session_id = %self.session_id,
                "Waiting for in-flight connect attempt before exit"
            );
            let elapsed = pending.started.elapsed();
            if let Ok(Ok(established)) = pending.task.await {
                self.close_connection(established.connection).await;
            }
            metrics::record_connect_attempt(ConnectFailureReason::Abandoned.as_str(), elapsed);
            let _ = pending.respond_to.send(Err(abandoned_error()));
        }

        if self.connection.is_some() || self.binder.bound_count() > 0 || !self.registry.is_empty() {
            self.teardown("unmount").await;
        }

        if self.state != ConnectionState::Idle {
            self.set_state(ConnectionState::Disconnected);
        }
    }

    // ------------------------------------------------------------------
    // Outward surface
    // ------------------------------------------------------------------

    fn snapshot(&self) -> SessionSnapshot {
        SessionSnapshot {
            session_id: self.session_id,
            state: self.state,
            room: self.room.clone(),
            local: self.local.clone(),
            participants: self.registry.snapshot(),
            bound_surfaces: self.binder.bound_count(),
        }
    }

    fn set_state(&mut self, state: ConnectionState) {
        if self.state == state {
            return;
        }
        debug!(
            target: "room.session.actor",
            session_id = %self.session_id,
            from = %self.state,
            to = %state,
            "State transition"
        );
        self.state = state;
        metrics::set_session_state(state.as_code());
        self.emit(SessionEvent::StateChanged(state));
    }

    fn publish_participants(&self) {
        self.emit(SessionEvent::ParticipantsChanged(self.registry.snapshot()));
    }

    fn emit_error(&self, error: SessionError) {
        warn!(
            target: "room.session.actor",
            session_id = %self.session_id,
            code = error.code(),
            error = %error,
            "Session error"
        );
        self.emit(SessionEvent::Error(error));
    }

    fn emit(&self, event: SessionEvent) {
        // No subscribers is not an error.
        let _ = self.events.send(event);
    }
}

fn abandoned_error() -> SessionError {
    SessionError::Connection {
        reason: ConnectFailureReason::Abandoned,
        detail: "disconnect requested before the connection was established".to_string(),
    }
}

async fn wait_pending(
    pending: &mut Option<PendingConnect>,
) -> Result<Result<EstablishedRoom, SessionError>, JoinError> {
    match pending {
        Some(pending) => (&mut pending.task).await,
        None => std::future::pending().await,
    }
}

async fn next_room_event(events: &mut Option<mpsc::Receiver<RoomEvent>>) -> Option<RoomEvent> {
    match events {
        Some(events) => events.recv().await,
        None => std::future::pending().await,
    }
}
