//! Secret types for protecting sensitive values from accidental logging.
//!
//! Join credentials are bearer tokens: anyone holding one can enter the room
//! as the participant it names. They are carried as [`SecretString`] from the
//! moment the token service returns them until the transport consumes them.
//!
//! # Compile-Time Safety
//!
//! `SecretString` implements `Debug` with redaction, so a
//! struct that derives `Debug` over a secret field is safe to log with `{:?}`
//! or as a `tracing` field.
//!
//! # Example
//!
//! ```rust
//! use common::secret::{ExposeSecret, SecretString};
//!
//! #[derive(Debug)]
//! struct JoinToken {
//!     room: String,
//!     token: SecretString,  // Safe: Debug shows "[REDACTED]"
//! }
//!
//! let join = JoinToken {
//!     room: "algebra-101".to_string(),
//!     token: SecretString::from("eyJhbGciOi..."),
//! };
//!
//! assert!(!format!("{join:?}").contains("eyJ"));
//!
//! // The transport is the only place that reads the raw value.
//! let raw: &str = join.token.expose_secret();
//! assert!(raw.starts_with("eyJ"));
//! ```
//!
//! # Usage Guidelines
//!
//! Use `SecretString` for:
//! - Room join tokens
//! - Token service API keys
//!
//! Secrets are zeroized when dropped.

// Re-export the main types from secrecy
pub use secrecy::{ExposeSecret, SecretString};
