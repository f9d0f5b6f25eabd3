//! Room session error types.
//!
//! `SessionError` is what the host sees, either as the return value of a
//! handle method or as a `SessionEvent::Error`. Transport and sink failures
//! are folded into it so that one participant's broken surface never looks
//! like a session-level failure.

use crate::session::messages::ConnectionState;
use crate::transport::TrackKind;

use chrono::{DateTime, Utc};
use common::types::{ParticipantIdentity, SurfaceId};
use std::fmt;
use thiserror::Error;

/// Room session error type.
///
/// Retry classification:
/// - `Credential`: fatal for this credential, fetch a new one
/// - `Connection`: caller-retriable (explicit user action or external backoff)
/// - `AlreadyConnected`: programmer error, never retried
/// - `SessionEnded`: informational, caller decides whether to reconnect
/// - `Binding`, `Teardown`: isolated, the session keeps running
#[derive(Debug, Clone, Error)]
pub enum SessionError {
    /// Join credential missing, expired or refused by the token service.
    #[error("Credential error: {0}")]
    Credential(CredentialError),

    /// Connection attempt failed.
    #[error("Connection failed ({reason}): {detail}")]
    Connection {
        reason: ConnectFailureReason,
        detail: String,
    },

    /// A connection is already in flight or established.
    #[error("Session is already {state}")]
    AlreadyConnected { state: ConnectionState },

    /// The media service closed the session.
    #[error("Session ended: {0}")]
    SessionEnded(EndReason),

    /// A track could not be attached to (or detached from) a surface.
    #[error("Binding error: {0}")]
    Binding(BindingError),

    /// A release step failed during teardown.
    #[error("Teardown error: {0}")]
    Teardown(TeardownFailure),

    /// Referenced participant or track is not known to the session.
    #[error("Not found: {0}")]
    NotFound(String),

    /// Internal error (actor channel failures, panicked tasks).
    #[error("Internal error: {0}")]
    Internal(String),
}

impl SessionError {
    /// Stable, low-cardinality code for logs and metric labels.
    #[must_use]
    pub const fn code(&self) -> &'static str {
        match self {
            SessionError::Credential(_) => "credential_error",
            SessionError::Connection { .. } => "connection_error",
            SessionError::AlreadyConnected { .. } => "already_connected",
            SessionError::SessionEnded(_) => "session_ended",
            SessionError::Binding(_) => "binding_error",
            SessionError::Teardown(_) => "teardown_error",
            SessionError::NotFound(_) => "not_found",
            SessionError::Internal(_) => "internal_error",
        }
    }

    /// Whether the caller may reasonably retry `connect` with the same credential.
    #[must_use]
    pub const fn is_retriable(&self) -> bool {
        match self {
            SessionError::Connection { reason, .. } => !matches!(
                reason,
                ConnectFailureReason::CredentialRejected
            ),
            SessionError::SessionEnded(reason) => {
                matches!(reason, EndReason::NetworkLost | EndReason::Unknown)
            }
            _ => false,
        }
    }
}

impl From<CredentialError> for SessionError {
    fn from(err: CredentialError) -> Self {
        SessionError::Credential(err)
    }
}

impl From<BindingError> for SessionError {
    fn from(err: BindingError) -> Self {
        SessionError::Binding(err)
    }
}

impl From<TeardownFailure> for SessionError {
    fn from(err: TeardownFailure) -> Self {
        SessionError::Teardown(err)
    }
}

impl From<TransportError> for SessionError {
    fn from(err: TransportError) -> Self {
        match err {
            TransportError::Rejected(detail) => SessionError::Connection {
                reason: ConnectFailureReason::CredentialRejected,
                detail,
            },
            TransportError::Network(detail) => SessionError::Connection {
                reason: ConnectFailureReason::Network,
                detail,
            },
            TransportError::Protocol(detail) => SessionError::Connection {
                reason: ConnectFailureReason::Protocol,
                detail,
            },
        }
    }
}

/// Join credential errors.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum CredentialError {
    /// Token string is empty.
    #[error("Join token is missing")]
    Missing,

    /// Token has expired (or expires within the clock-skew allowance).
    #[error("Join token expired at {expired_at}")]
    Expired { expired_at: DateTime<Utc> },

    /// Token service refused to issue a credential.
    #[error("Token service rejected the request: {0}")]
    Rejected(String),

    /// Token service unreachable or returned a server error.
    #[error("Token service unavailable: {0}")]
    Unavailable(String),

    /// Token service response could not be parsed.
    #[error("Invalid token service response: {0}")]
    InvalidResponse(String),
}

/// Reason code attached to a failed connection attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ConnectFailureReason {
    /// The media service refused the credential.
    CredentialRejected,
    /// Network error while reaching the media service.
    Network,
    /// Handshake did not follow the protocol.
    Protocol,
    /// Handshake exceeded the configured connect timeout.
    Timeout,
    /// `disconnect()` was called before the attempt resolved.
    Abandoned,
}

impl ConnectFailureReason {
    /// Returns the reason as a string for logs and metric labels.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            ConnectFailureReason::CredentialRejected => "credential_rejected",
            ConnectFailureReason::Network => "network",
            ConnectFailureReason::Protocol => "protocol",
            ConnectFailureReason::Timeout => "timeout",
            ConnectFailureReason::Abandoned => "abandoned",
        }
    }
}

impl fmt::Display for ConnectFailureReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Why the media service ended a connected session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EndReason {
    /// Join token expired.
    Expired,
    /// Participant was removed by a moderator.
    Kicked,
    /// Transport detected a network partition (or the event stream ended).
    NetworkLost,
    /// Any other server-side reason.
    Unknown,
}

impl EndReason {
    /// Returns the reason as a string for logs and metric labels.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            EndReason::Expired => "expired",
            EndReason::Kicked => "kicked",
            EndReason::NetworkLost => "network_lost",
            EndReason::Unknown => "unknown",
        }
    }
}

impl fmt::Display for EndReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Surface binding errors reported by the host's `SurfaceSink`.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum BindingError {
    /// The surface no longer exists in the host UI.
    #[error("Surface {0} is no longer available")]
    SurfaceGone(SurfaceId),

    /// The sink refused the operation.
    #[error("Surface {surface} rejected the track: {reason}")]
    Rejected { surface: SurfaceId, reason: String },

    /// No surface is designated for the participant.
    #[error("No surface designated for participant {0}")]
    NoSurface(ParticipantIdentity),

    /// The surface belongs to the local participant's camera.
    #[error("Surface {0} is reserved for the local participant")]
    ReservedSurface(SurfaceId),

    /// Only video tracks are rendered on surfaces.
    #[error("{0} tracks cannot be bound to a surface")]
    UnsupportedKind(TrackKind),
}

/// Errors reported by a `RoomTransport` implementation.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum TransportError {
    /// Media service refused the join token.
    #[error("Join token rejected: {0}")]
    Rejected(String),

    /// Network-level failure.
    #[error("Network error: {0}")]
    Network(String),

    /// Protocol-level failure.
    #[error("Protocol error: {0}")]
    Protocol(String),
}

/// A single release step that failed during teardown.
///
/// Teardown never stops on these; they are collected and reported.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum TeardownFailure {
    /// Detaching a surface failed.
    #[error("unbind failed: {0}")]
    Unbind(BindingError),

    /// Closing the room connection failed.
    #[error("connection close failed: {0}")]
    Close(TransportError),
}
