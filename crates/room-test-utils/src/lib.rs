//! # Room Test Utilities
//!
//! Shared test utilities for the room session crate.
//!
//! This crate provides mock implementations and test fixtures for
//! exercising a session without a media service or a UI.
//!
//! ## Modules
//!
//! - `mock_transport` - Scripted `RoomTransport` and the controller used to
//!   play the media service side of a connection
//! - `recording_sink` - In-memory `SurfaceSink` that records attach/detach calls
//! - `fixtures` - Credentials, tracks, participants and a spawned `TestSession`
//!
//! ## Usage
//!
//! ```rust,ignore
//! use room_test_utils::*;
//!
//! #[tokio::test]
//! async fn test_example() {
//!     let transport = MockTransport::accepting(
//!         ScriptedRoom::new("alice")
//!             .with_participant(remote_participant("bob", vec![video_track("TR_bob_v")])),
//!     );
//!     let session = TestSession::spawn(transport);
//!
//!     session.connect_as("alice").await.unwrap();
//!     assert!(session.sink.bound_track("remote-video").is_some());
//! }
//! ```

pub mod fixtures;
pub mod mock_transport;
pub mod recording_sink;

pub use fixtures::*;
pub use mock_transport::{
    ConnectScript, MockConnection, MockTransport, MockTransportBuilder, RoomController,
    ScriptedRoom,
};
pub use recording_sink::{RecordingSurfaceSink, SinkOp};
