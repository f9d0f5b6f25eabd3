//! Room session configuration.
//!
//! Configuration is loaded from environment variables. The token service API
//! key is redacted in Debug output.

use crate::endpoint::RoomEndpoint;

use common::config::{ObservabilityConfig, DEFAULT_LOG_FILTER};
use common::secret::SecretString;
use common::types::SurfaceId;
use std::collections::HashMap;
use std::env;
use std::fmt;
use std::time::Duration;
use thiserror::Error;

/// Default bound on the transport handshake, in milliseconds.
pub const DEFAULT_CONNECT_TIMEOUT_MS: u64 = 10_000;

/// Default clock skew allowance when checking credential expiry, in seconds.
pub const DEFAULT_CREDENTIAL_CLOCK_SKEW_SECONDS: u64 = 5;

/// Default surface id for the local camera feed.
pub const DEFAULT_LOCAL_SURFACE: &str = "local-video";

/// Default surface id for remote video feeds.
pub const DEFAULT_REMOTE_SURFACE: &str = "remote-video";

/// Default capacity of the outward session event channel.
pub const DEFAULT_EVENT_CHANNEL_CAPACITY: usize = 64;

/// Departed participants remembered for dropping late track events.
/// The oldest departure is forgotten first.
pub const MAX_DEPARTED_PARTICIPANTS: usize = 256;

/// Room session configuration.
#[derive(Clone)]
pub struct Config {
    /// Media service endpoint (scheme + host + port).
    pub room_endpoint: RoomEndpoint,

    /// Base URL of the token service issuing join credentials.
    pub token_service_url: String,

    /// Optional API key for the token service.
    /// Protected by `SecretString` to prevent accidental logging.
    pub token_service_api_key: Option<SecretString>,

    /// Bound on the transport handshake (default: 10s).
    pub connect_timeout: Duration,

    /// Credentials expiring within this window are treated as expired (default: 5s).
    pub credential_clock_skew: Duration,

    /// Surface receiving the local video feed.
    pub local_surface: SurfaceId,

    /// Default surface for remote video feeds. `None` leaves remote tracks
    /// unbound until the host assigns a per-participant surface.
    pub remote_surface: Option<SurfaceId>,

    /// Capacity of the outward session event channel.
    pub event_channel_capacity: usize,

    /// Logging configuration.
    pub observability: ObservabilityConfig,
}

/// Custom Debug implementation that redacts sensitive fields.
impl fmt::Debug for Config {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Config")
            .field("room_endpoint", &self.room_endpoint.as_str())
            .field("token_service_url", &self.token_service_url)
            .field(
                "token_service_api_key",
                &self.token_service_api_key.as_ref().map(|_| "[REDACTED]"),
            )
            .field("connect_timeout", &self.connect_timeout)
            .field("credential_clock_skew", &self.credential_clock_skew)
            .field("local_surface", &self.local_surface)
            .field("remote_surface", &self.remote_surface)
            .field("event_channel_capacity", &self.event_channel_capacity)
            .field("observability", &self.observability)
            .finish()
    }
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Missing required environment variable: {0}")]
    MissingEnvVar(String),

    #[error("Invalid configuration value: {0}")]
    InvalidValue(String),
}

impl Config {
    /// Load configuration from environment variables.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_vars(&env::vars().collect())
    }

    /// Load configuration from a `HashMap` (for testing).
    pub fn from_vars(vars: &HashMap<String, String>) -> Result<Self, ConfigError> {
        let raw_endpoint = vars
            .get("ROOM_ENDPOINT")
            .ok_or_else(|| ConfigError::MissingEnvVar("ROOM_ENDPOINT".to_string()))?;
        let room_endpoint = RoomEndpoint::parse(raw_endpoint)
            .map_err(|e| ConfigError::InvalidValue(format!("ROOM_ENDPOINT: {e}")))?;

        let token_service_url = vars
            .get("ROOM_TOKEN_SERVICE_URL")
            .ok_or_else(|| ConfigError::MissingEnvVar("ROOM_TOKEN_SERVICE_URL".to_string()))?
            .clone();

        let token_service_api_key = vars
            .get("ROOM_TOKEN_SERVICE_API_KEY")
            .filter(|s| !s.is_empty())
            .map(|s| SecretString::from(s.clone()));

        let connect_timeout = Duration::from_millis(
            vars.get("ROOM_CONNECT_TIMEOUT_MS")
                .and_then(|s| s.parse().ok())
                .filter(|ms| *ms > 0)
                .unwrap_or(DEFAULT_CONNECT_TIMEOUT_MS),
        );

        let credential_clock_skew = Duration::from_secs(
            vars.get("ROOM_CREDENTIAL_CLOCK_SKEW_SECONDS")
                .and_then(|s| s.parse().ok())
                .unwrap_or(DEFAULT_CREDENTIAL_CLOCK_SKEW_SECONDS),
        );

        let local_surface = vars
            .get("ROOM_LOCAL_SURFACE")
            .filter(|s| !s.trim().is_empty())
            .map_or_else(
                || SurfaceId::from(DEFAULT_LOCAL_SURFACE),
                |s| SurfaceId::from(s.as_str()),
            );

        // An explicitly empty value disables the shared remote surface.
        let remote_surface = match vars.get("ROOM_REMOTE_SURFACE") {
            Some(s) if s.trim().is_empty() => None,
            Some(s) => Some(SurfaceId::from(s.as_str())),
            None => Some(SurfaceId::from(DEFAULT_REMOTE_SURFACE)),
        };

        if remote_surface.as_ref() == Some(&local_surface) {
            return Err(ConfigError::InvalidValue(format!(
                "ROOM_REMOTE_SURFACE must differ from ROOM_LOCAL_SURFACE ('{local_surface}')"
            )));
        }

        let event_channel_capacity = vars
            .get("ROOM_EVENT_CHANNEL_CAPACITY")
            .and_then(|s| s.parse().ok())
            .filter(|n| *n > 0)
            .unwrap_or(DEFAULT_EVENT_CHANNEL_CAPACITY);

        let json_logs = match vars.get("ROOM_LOG_FORMAT").map(String::as_str) {
            None | Some("text") => false,
            Some("json") => true,
            Some(other) => {
                return Err(ConfigError::InvalidValue(format!(
                    "ROOM_LOG_FORMAT must be 'text' or 'json', got '{other}'"
                )))
            }
        };

        Ok(Config {
            room_endpoint,
            token_service_url,
            token_service_api_key,
            connect_timeout,
            credential_clock_skew,
            local_surface,
            remote_surface,
            event_channel_capacity,
            observability: ObservabilityConfig {
                log_filter: DEFAULT_LOG_FILTER.to_string(),
                json_logs,
            },
        })
    }
}
