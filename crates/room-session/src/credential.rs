//! Join credentials and the token exchange.
//!
//! A join credential is a signed token issued by the platform's token service
//! for one `{room, participant}` pair. The session treats the token as opaque:
//! it only checks that it is present and not expired before handing it to the
//! transport.
//!
//! # Exchange
//!
//! ```text
//! POST {token_service_url}/api/rooms/token
//! {"roomName": "algebra-101", "participantIdentity": "alice"}
//!
//! 200 {"token": "<opaque>", "expiresAt": "2026-10-18T12:00:00Z"}
//! ```
//!
//! # Security
//!
//! - Tokens are stored as `SecretString` and never logged
//! - The token service API key (if any) is sent as a bearer header and never logged
//! - HTTP timeouts prevent hanging joins

use crate::errors::CredentialError;

use chrono::{DateTime, Utc};
use common::secret::{ExposeSecret, SecretString};
use common::types::{ParticipantIdentity, RoomName};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::{debug, instrument, trace, warn};

/// Path of the token endpoint on the token service.
pub const TOKEN_PATH: &str = "/api/rooms/token";

/// Default HTTP request timeout for the token exchange.
pub const DEFAULT_TOKEN_HTTP_TIMEOUT: Duration = Duration::from_secs(10);

/// Default connection timeout for the token service HTTP client.
const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(5);

/// A signed join credential bound to one room and participant.
#[derive(Debug, Clone)]
pub struct JoinCredential {
    room_name: RoomName,
    participant_identity: ParticipantIdentity,
    token: SecretString,
    expires_at: DateTime<Utc>,
}

impl JoinCredential {
    #[must_use]
    pub fn new(
        room_name: RoomName,
        participant_identity: ParticipantIdentity,
        token: SecretString,
        expires_at: DateTime<Utc>,
    ) -> Self {
        Self {
            room_name,
            participant_identity,
            token,
            expires_at,
        }
    }

    #[must_use]
    pub fn room_name(&self) -> &RoomName {
        &self.room_name
    }

    #[must_use]
    pub fn participant_identity(&self) -> &ParticipantIdentity {
        &self.participant_identity
    }

    /// The opaque token. Only transports should read it.
    #[must_use]
    pub fn token(&self) -> &SecretString {
        &self.token
    }

    #[must_use]
    pub fn expires_at(&self) -> DateTime<Utc> {
        self.expires_at
    }

    /// Check that the token is present and still valid at `now`.
    ///
    /// A token expiring within `clock_skew` of `now` counts as expired.
    ///
    /// # Errors
    ///
    /// - `CredentialError::Missing` for an empty or whitespace token
    /// - `CredentialError::Expired` for a token past its expiry (minus skew)
    pub fn validate(&self, now: DateTime<Utc>, clock_skew: Duration) -> Result<(), CredentialError> {
        if self.token.expose_secret().trim().is_empty() {
            return Err(CredentialError::Missing);
        }

        let skew = chrono::Duration::from_std(clock_skew).unwrap_or_else(|_| chrono::Duration::zero());
        if self.expires_at <= now + skew {
            return Err(CredentialError::Expired {
                expired_at: self.expires_at,
            });
        }

        Ok(())
    }
}

/// Issues join credentials (the platform's token service).
#[async_trait::async_trait]
pub trait TokenProvider: Send + Sync {
    /// Request a credential for `participant` in `room`.
    async fn fetch_credential(
        &self,
        room: &RoomName,
        participant: &ParticipantIdentity,
    ) -> Result<JoinCredential, CredentialError>;
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct TokenRequest<'a> {
    room_name: &'a str,
    participant_identity: &'a str,
}

/// Token service response. `token` is redacted in Debug output.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct TokenResponse {
    token: SecretString,
    expires_at: DateTime<Utc>,
}

/// `TokenProvider` backed by the platform's HTTP token service.
pub struct HttpTokenProvider {
    base_url: String,
    api_key: Option<SecretString>,
    http_client: reqwest::Client,
}

impl std::fmt::Debug for HttpTokenProvider {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HttpTokenProvider")
            .field("base_url", &self.base_url)
            .field("api_key", &self.api_key.as_ref().map(|_| "[REDACTED]"))
            .finish_non_exhaustive()
    }
}

impl HttpTokenProvider {
    /// Build a provider for the token service at `base_url`.
    ///
    /// # Errors
    ///
    /// Returns `CredentialError::Unavailable` if the HTTP client cannot be built.
    pub fn new(
        base_url: impl Into<String>,
        api_key: Option<SecretString>,
        timeout: Duration,
    ) -> Result<Self, CredentialError> {
        let http_client = reqwest::Client::builder()
            .timeout(timeout)
            .connect_timeout(DEFAULT_CONNECT_TIMEOUT)
            .build()
            .map_err(|e| {
                CredentialError::Unavailable(format!("Failed to build HTTP client: {e}"))
            })?;

        Ok(Self {
            base_url: base_url.into().trim_end_matches('/').to_string(),
            api_key,
            http_client,
        })
    }
}

#[async_trait::async_trait]
impl TokenProvider for HttpTokenProvider {
    #[instrument(skip_all, fields(room = %room))]
    async fn fetch_credential(
        &self,
        room: &RoomName,
        participant: &ParticipantIdentity,
    ) -> Result<JoinCredential, CredentialError> {
        let url = format!("{}{TOKEN_PATH}", self.base_url);

        debug!(
            target: "room.credential",
            url = %url,
            "Requesting join credential"
        );

        let mut request = self.http_client.post(&url).json(&TokenRequest {
            room_name: room.as_str(),
            participant_identity: participant.as_str(),
        });
        if let Some(api_key) = &self.api_key {
            request = request.bearer_auth(api_key.expose_secret());
        }

        let response = request.send().await.map_err(|e| {
            debug!(target: "room.credential", error = %e, "HTTP request failed");
            CredentialError::Unavailable(e.to_string())
        })?;

        let status = response.status();

        if status.is_success() {
            let body: TokenResponse = response.json().await.map_err(|e| {
                warn!(target: "room.credential", error = %e, "Failed to parse token response");
                CredentialError::InvalidResponse(e.to_string())
            })?;

            debug!(
                target: "room.credential",
                expires_at = %body.expires_at,
                "Join credential issued"
            );

            Ok(JoinCredential::new(
                room.clone(),
                participant.clone(),
                body.token,
                body.expires_at,
            ))
        } else if matches!(status.as_u16(), 400 | 401 | 403) {
            let body = response.text().await.unwrap_or_else(|e| {
                trace!(target: "room.credential", error = %e, "Failed to read error response body");
                "<failed to read body>".to_string()
            });
            warn!(
                target: "room.credential",
                status = %status,
                "Token service rejected credential request"
            );
            trace!(target: "room.credential", body = %body, "Rejection response body");
            Err(CredentialError::Rejected(format!("Status {status}")))
        } else {
            warn!(
                target: "room.credential",
                status = %status,
                "Token service returned an error"
            );
            Err(CredentialError::Unavailable(format!(
                "Unexpected status: {status}"
            )))
        }
    }
}
