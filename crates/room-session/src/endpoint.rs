//! Room endpoint: network address of the real-time media service.
//!
//! Endpoints come from configuration and are validated once at load time:
//! a scheme the media service speaks, a host, and a port (explicit or the
//! scheme default).

use reqwest::Url;
use std::fmt;
use thiserror::Error;

/// Schemes accepted for the media service endpoint.
pub const SUPPORTED_SCHEMES: [&str; 4] = ["ws", "wss", "http", "https"];

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum EndpointError {
    #[error("Invalid endpoint URL: {0}")]
    InvalidUrl(String),

    #[error("Unsupported endpoint scheme: {0}")]
    UnsupportedScheme(String),

    #[error("Endpoint has no host")]
    MissingHost,

    #[error("Endpoint has no port and scheme has no default")]
    MissingPort,
}

/// Validated media service endpoint.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RoomEndpoint {
    url: Url,
    port: u16,
}

impl RoomEndpoint {
    /// Parse and validate an endpoint string.
    ///
    /// # Errors
    ///
    /// Returns `EndpointError` if the URL does not parse, uses a scheme other
    /// than `ws`, `wss`, `http` or `https`, or lacks a host.
    pub fn parse(raw: &str) -> Result<Self, EndpointError> {
        let url = Url::parse(raw.trim()).map_err(|e| EndpointError::InvalidUrl(e.to_string()))?;

        if !SUPPORTED_SCHEMES.contains(&url.scheme()) {
            return Err(EndpointError::UnsupportedScheme(url.scheme().to_string()));
        }

        if url.host_str().map_or(true, str::is_empty) {
            return Err(EndpointError::MissingHost);
        }

        let port = url.port_or_known_default().ok_or(EndpointError::MissingPort)?;

        Ok(Self { url, port })
    }

    /// URL scheme (`ws`, `wss`, `http`, `https`).
    #[must_use]
    pub fn scheme(&self) -> &str {
        self.url.scheme()
    }

    /// Host name or address.
    #[must_use]
    pub fn host(&self) -> &str {
        self.url.host_str().unwrap_or_default()
    }

    /// Port, explicit or the scheme default.
    #[must_use]
    pub fn port(&self) -> u16 {
        self.port
    }

    /// Whether the endpoint uses TLS.
    #[must_use]
    pub fn is_secure(&self) -> bool {
        matches!(self.scheme(), "wss" | "https")
    }

    /// The full endpoint URL.
    #[must_use]
    pub fn as_str(&self) -> &str {
        self.url.as_str()
    }
}

impl fmt::Display for RoomEndpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
