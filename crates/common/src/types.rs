//! Identifier newtypes shared by the room crates.
//!
//! All identifiers are opaque strings assigned by the outside world (the
//! token service, the media service or the host UI). Wrapping them keeps a
//! participant identity from being passed where a surface id is expected.

use serde::{Deserialize, Serialize};
use std::fmt;

macro_rules! string_id {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(String);

        impl $name {
            /// Wrap a raw identifier.
            #[must_use]
            pub fn new(value: impl Into<String>) -> Self {
                Self(value.into())
            }

            /// Borrow the raw identifier.
            #[must_use]
            pub fn as_str(&self) -> &str {
                &self.0
            }

            /// Whether the identifier is empty (or whitespace only).
            #[must_use]
            pub fn is_blank(&self) -> bool {
                self.0.trim().is_empty()
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(&self.0)
            }
        }

        impl From<&str> for $name {
            fn from(value: &str) -> Self {
                Self(value.to_string())
            }
        }

        impl From<String> for $name {
            fn from(value: String) -> Self {
                Self(value)
            }
        }
    };
}

string_id!(
    /// Name of a live-class room (e.g. `"algebra-101"`).
    RoomName
);

string_id!(
    /// Identity of a participant inside a room, as encoded in the join token.
    ParticipantIdentity
);

string_id!(
    /// Track id assigned by the media service.
    TrackSid
);

string_id!(
    /// Host-supplied identifier of a rendering surface.
    SurfaceId
);
