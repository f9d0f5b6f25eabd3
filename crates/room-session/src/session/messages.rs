//! Message and event types for the room session actor.
//!
//! Requests to the actor travel over `tokio::sync::mpsc` with a
//! `tokio::sync::oneshot` reply channel. Notifications to the host travel
//! over a `tokio::sync::broadcast` channel as [`SessionEvent`]s.

use crate::credential::JoinCredential;
use crate::endpoint::RoomEndpoint;
use crate::errors::{SessionError, TeardownFailure};
use crate::session::registry::ParticipantsSnapshot;
use crate::transport::{LocalParticipant, TrackKind};

use common::types::{ParticipantIdentity, RoomName, SurfaceId};
use std::fmt;
use tokio::sync::oneshot;
use uuid::Uuid;

/// Session connection lifecycle.
///
/// ```text
/// Idle ──connect──▶ Connecting ──ok──▶ Connected ──disconnect──▶ Disconnecting ──▶ Disconnected
///                        │                  │
///                        └──err──▶ Failed   └──server closed──▶ Disconnected
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ConnectionState {
    Idle,
    Connecting,
    Connected,
    Disconnecting,
    Disconnected,
    Failed,
}

impl ConnectionState {
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            ConnectionState::Idle => "idle",
            ConnectionState::Connecting => "connecting",
            ConnectionState::Connected => "connected",
            ConnectionState::Disconnecting => "disconnecting",
            ConnectionState::Disconnected => "disconnected",
            ConnectionState::Failed => "failed",
        }
    }

    /// Numeric code for the state gauge.
    #[must_use]
    pub const fn as_code(&self) -> u8 {
        match self {
            ConnectionState::Idle => 0,
            ConnectionState::Connecting => 1,
            ConnectionState::Connected => 2,
            ConnectionState::Disconnecting => 3,
            ConnectionState::Disconnected => 4,
            ConnectionState::Failed => 5,
        }
    }

    /// Whether a connection is in flight, established or being torn down.
    /// `connect` is refused in these states.
    #[must_use]
    pub const fn is_active(&self) -> bool {
        matches!(
            self,
            ConnectionState::Connecting | ConnectionState::Connected | ConnectionState::Disconnecting
        )
    }
}

impl fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Notifications published to subscribers.
#[derive(Debug, Clone)]
pub enum SessionEvent {
    StateChanged(ConnectionState),
    Error(SessionError),
    ParticipantsChanged(ParticipantsSnapshot),
}

/// Point-in-time view of the session.
#[derive(Debug, Clone)]
pub struct SessionSnapshot {
    pub session_id: Uuid,
    pub state: ConnectionState,
    pub room: Option<RoomName>,
    pub local: Option<LocalParticipant>,
    pub participants: ParticipantsSnapshot,
    pub bound_surfaces: usize,
}

/// Outcome of a teardown.
///
/// Teardown always completes; individual failures are collected here
/// instead of aborting the remaining steps.
#[derive(Debug, Clone, Default)]
pub struct TeardownReport {
    pub released_surfaces: usize,
    pub cleared_tracks: usize,
    pub failures: Vec<TeardownFailure>,
}

impl TeardownReport {
    #[must_use]
    pub fn is_clean(&self) -> bool {
        self.failures.is_empty()
    }
}

/// Messages sent to `RoomSessionActor`.
#[derive(Debug)]
pub enum SessionMessage {
    /// Join a room.
    Connect {
        credential: JoinCredential,
        endpoint: RoomEndpoint,
        /// Resolved once the attempt settles (success, failure, timeout or abandon).
        respond_to: oneshot::Sender<Result<(), SessionError>>,
    },

    /// Leave the room and release every resource.
    Disconnect {
        respond_to: oneshot::Sender<TeardownReport>,
    },

    /// Bind a participant's subscribed but unbound track to its surface.
    BindPendingTrack {
        participant: ParticipantIdentity,
        kind: TrackKind,
        respond_to: oneshot::Sender<Result<SurfaceId, SessionError>>,
    },

    /// Give a participant its own remote surface.
    AssignRemoteSurface {
        participant: ParticipantIdentity,
        surface: SurfaceId,
        respond_to: oneshot::Sender<Result<(), SessionError>>,
    },

    /// Take a participant's surface away, unbinding its video.
    ReleaseRemoteSurface {
        participant: ParticipantIdentity,
        respond_to: oneshot::Sender<Result<(), SessionError>>,
    },

    /// Get the current session snapshot.
    GetSnapshot {
        respond_to: oneshot::Sender<SessionSnapshot>,
    },
}
