//! Room Session Library
//!
//! Client-side session management for a live-class room:
//!
//! - Connection lifecycle against a real-time media service
//! - Participant and track registry driven by room events
//! - Binding of remote and local video tracks to host render surfaces
//! - Join credential exchange with the token service
//!
//! # Architecture
//!
//! ```text
//! host UI ──RoomSessionHandle──▶ RoomSessionActor ──RoomTransport──▶ media service
//!    ▲                               │      ▲
//!    │ SessionEvent (broadcast)      │      └── RoomEvent stream
//!    └───────────────────────────────┤
//!                                    └──SurfaceSink──▶ render surfaces
//! ```
//!
//! # Key Design Decisions
//!
//! - **One actor per room**: all room events, host commands and the connect
//!   result are handled on one task, so the registry needs no locks
//! - **Transport and surfaces are seams**: the media transport and the render
//!   surfaces are supplied by the host as traits
//! - **Teardown always completes**: release failures are collected, never fatal
//!
//! # Modules
//!
//! - [`session`] - Session actor, registry and surface binder
//! - [`credential`] - Join credentials and the token service client
//! - [`config`] - Configuration from environment
//! - [`errors`] - Error types with stable codes

pub mod config;
pub mod credential;
pub mod endpoint;
pub mod errors;
pub mod observability;
pub mod session;
pub mod transport;

pub use config::Config;
pub use credential::{HttpTokenProvider, JoinCredential, TokenProvider};
pub use endpoint::RoomEndpoint;
pub use errors::SessionError;
pub use session::{RoomSessionActor, RoomSessionHandle, SessionEvent, SessionSettings};
