//! Observability for the room session.
//!
//! # Privacy by Default
//!
//! Session spans use `#[instrument(skip_all)]` with an explicit field
//! allow-list. Join tokens are never logged. Participant identities appear in
//! log fields but never in metric labels.
//!
//! # Metrics
//!
//! | Metric | Type | Labels | Purpose |
//! |--------|------|--------|---------|
//! | `room_session_connect_total` | Counter | `outcome` | Connect attempts by result |
//! | `room_session_connect_duration_seconds` | Histogram | `outcome` | Handshake latency |
//! | `room_session_state` | Gauge | none | Current `ConnectionState` code |
//! | `room_session_events_total` | Counter | `event` | Room events consumed |
//! | `room_session_events_dropped_total` | Counter | `event` | Events ignored (departed participants) |
//! | `room_session_bind_failures_total` | Counter | `phase` | Surface sink failures |
//! | `room_session_teardowns_total` | Counter | `trigger` | Teardowns run |
//! | `room_session_teardown_failures_total` | Counter | `trigger` | Release steps that failed |
//! | `room_session_bound_surfaces` | Gauge | none | Surfaces showing a track |

pub mod metrics;

use common::config::ObservabilityConfig;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

pub use metrics::init_metrics_recorder;

/// Install the global tracing subscriber.
///
/// `RUST_LOG` takes precedence over `config.log_filter`.
///
/// # Errors
///
/// Returns error if a global subscriber is already installed.
pub fn init_tracing(config: &ObservabilityConfig) -> Result<(), String> {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| config.log_filter.as_str().into());

    let registry = tracing_subscriber::registry().with(filter);

    let result = if config.json_logs {
        registry
            .with(tracing_subscriber::fmt::layer().json())
            .try_init()
    } else {
        registry.with(tracing_subscriber::fmt::layer()).try_init()
    };

    result.map_err(|e| format!("Failed to install tracing subscriber: {e}"))
}
