//! Room session: connection lifecycle, participant registry and surface binding.
//!
//! ```text
//! RoomSessionActor (one per joined room)
//! ├── owns the RoomConnection and its event stream
//! ├── ParticipantRegistry (participant -> {kind -> track})
//! └── MediaSurfaceBinder (track <-> surface, via the host's SurfaceSink)
//! ```
//!
//! # Modules
//!
//! - [`manager`] - `RoomSessionActor` and its handle
//! - [`registry`] - Pure track bookkeeping
//! - [`binder`] - Track to surface bindings and the `SurfaceSink` contract
//! - [`messages`] - Actor messages, session events and snapshots

pub mod binder;
pub mod manager;
pub mod messages;
pub mod registry;

// Re-export primary types
pub use binder::{MediaSurfaceBinder, SurfaceLayout, SurfaceSink};
pub use manager::{RoomSessionActor, RoomSessionHandle, SessionSettings};
pub use messages::*;
pub use registry::{
    DepartedParticipants, ParticipantRegistry, ParticipantSummary, ParticipantTrack,
    ParticipantsSnapshot, SubscriptionState, TrackKey, TrackRef,
};
