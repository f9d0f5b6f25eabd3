//! Room session preflight.
//!
//! Loads configuration, installs logging and metrics, then requests a join
//! credential from the token service for the given room and participant.
//! Used to verify that a deployment can issue credentials before a class
//! starts.
//!
//! Usage: `room-session <room> <participant>`

use chrono::Utc;
use common::types::{ParticipantIdentity, RoomName};
use room_session::config::Config;
use room_session::credential::{HttpTokenProvider, TokenProvider, DEFAULT_TOKEN_HTTP_TIMEOUT};
use room_session::observability;
use tracing::{error, info, warn};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Configuration first: it selects the log format
    let config = Config::from_env().map_err(|e| {
        eprintln!("Failed to load configuration: {e}");
        e
    })?;

    observability::init_tracing(&config.observability)?;
    if let Err(e) = observability::init_metrics_recorder() {
        warn!("Metrics recorder not installed: {}", e);
    }

    info!(
        room_endpoint = %config.room_endpoint,
        token_service_url = %config.token_service_url,
        connect_timeout = ?config.connect_timeout,
        "Configuration loaded successfully"
    );

    let mut args = std::env::args().skip(1);
    let (Some(room), Some(participant)) = (args.next(), args.next()) else {
        error!("Usage: room-session <room> <participant>");
        return Err("missing room or participant argument".into());
    };
    let room = RoomName::from(room);
    let participant = ParticipantIdentity::from(participant);
    if room.is_blank() || participant.is_blank() {
        error!("Room and participant must not be blank");
        return Err("blank room or participant".into());
    }

    let provider = HttpTokenProvider::new(
        config.token_service_url.clone(),
        config.token_service_api_key.clone(),
        DEFAULT_TOKEN_HTTP_TIMEOUT,
    )?;

    let credential = provider
        .fetch_credential(&room, &participant)
        .await
        .map_err(|e| {
            error!("Failed to obtain join credential: {}", e);
            e
        })?;

    credential
        .validate(Utc::now(), config.credential_clock_skew)
        .map_err(|e| {
            error!("Issued credential is not usable: {}", e);
            e
        })?;

    info!(
        room = %room,
        participant = %participant,
        expires_at = %credential.expires_at(),
        "Join credential issued"
    );

    Ok(())
}
