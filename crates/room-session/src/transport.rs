//! Room transport seam.
//!
//! The media transport itself (signalling, codec negotiation, packet flow)
//! belongs to an external real-time media service. The session manager only
//! needs three things from it: a way to connect with a join credential, a
//! stream of room events in delivery order, and a way to close the
//! connection. [`RoomTransport`] and [`RoomConnection`] are that contract.

use crate::credential::JoinCredential;
use crate::endpoint::RoomEndpoint;
use crate::errors::{EndReason, TransportError};

use common::types::{ParticipantIdentity, TrackSid};
use std::fmt;
use tokio::sync::mpsc;

/// Media kind of a track.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum TrackKind {
    Audio,
    Video,
}

impl TrackKind {
    /// Returns the kind as a string for logs and metric labels.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            TrackKind::Audio => "audio",
            TrackKind::Video => "video",
        }
    }
}

impl fmt::Display for TrackKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A track as reported by the media service.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TrackInfo {
    pub sid: TrackSid,
    pub kind: TrackKind,
}

impl TrackInfo {
    #[must_use]
    pub fn new(sid: impl Into<TrackSid>, kind: TrackKind) -> Self {
        Self {
            sid: sid.into(),
            kind,
        }
    }
}

/// The local participant and the tracks it has already published.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LocalParticipant {
    pub identity: ParticipantIdentity,
    pub tracks: Vec<TrackInfo>,
}

/// A remote participant present when the connection was established,
/// with the tracks it already publishes and the local side is subscribed to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RemoteParticipantInfo {
    pub identity: ParticipantIdentity,
    pub tracks: Vec<TrackInfo>,
}

/// Room-level notifications, delivered in order on a single stream.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RoomEvent {
    ParticipantJoined {
        participant: ParticipantIdentity,
    },
    ParticipantLeft {
        participant: ParticipantIdentity,
    },
    TrackPublished {
        participant: ParticipantIdentity,
        track: TrackInfo,
    },
    TrackSubscribed {
        participant: ParticipantIdentity,
        track: TrackInfo,
    },
    TrackUnsubscribed {
        participant: ParticipantIdentity,
        track: TrackInfo,
    },
    /// The media service closed the connection.
    Disconnected {
        reason: EndReason,
    },
}

impl RoomEvent {
    /// Returns the event type as a string for logs and metric labels.
    #[must_use]
    pub const fn kind(&self) -> &'static str {
        match self {
            RoomEvent::ParticipantJoined { .. } => "participant_joined",
            RoomEvent::ParticipantLeft { .. } => "participant_left",
            RoomEvent::TrackPublished { .. } => "track_published",
            RoomEvent::TrackSubscribed { .. } => "track_subscribed",
            RoomEvent::TrackUnsubscribed { .. } => "track_unsubscribed",
            RoomEvent::Disconnected { .. } => "disconnected",
        }
    }
}

/// Everything a successful handshake hands over to the session.
///
/// The session becomes the sole owner of `connection` and `events`.
pub struct EstablishedRoom {
    pub connection: Box<dyn RoomConnection>,
    pub local: LocalParticipant,
    pub participants: Vec<RemoteParticipantInfo>,
    pub events: mpsc::Receiver<RoomEvent>,
}

impl fmt::Debug for EstablishedRoom {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EstablishedRoom")
            .field("local", &self.local)
            .field("participants", &self.participants.len())
            .finish_non_exhaustive()
    }
}

/// Connects to the media service.
#[async_trait::async_trait]
pub trait RoomTransport: Send + Sync {
    /// Perform the handshake for `credential` against `endpoint`.
    ///
    /// The session bounds this call with its connect timeout; implementations
    /// do not need their own.
    async fn connect(
        &self,
        endpoint: &RoomEndpoint,
        credential: &JoinCredential,
    ) -> Result<EstablishedRoom, TransportError>;
}

/// A live connection to a room.
#[async_trait::async_trait]
pub trait RoomConnection: Send + Sync {
    /// Close the connection and release transport resources.
    async fn close(&self) -> Result<(), TransportError>;
}
