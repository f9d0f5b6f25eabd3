//! Metrics definitions for the room session.
//!
//! All metrics follow Prometheus naming conventions:
//! - `room_session_` prefix
//! - `_total` suffix for counters
//! - `_seconds` suffix for duration histograms
//!
//! # Cardinality
//!
//! Labels are bounded by code, never by participant or room names:
//! - `outcome`: connect outcomes (success plus `ConnectFailureReason` values)
//! - `event`: room event kinds (6 values)
//! - `phase`: `attach`, `detach`
//! - `trigger`: `disconnect`, `server`, `unmount`

use metrics::{counter, gauge, histogram};
use metrics_exporter_prometheus::{Matcher, PrometheusBuilder, PrometheusHandle};
use std::time::Duration;

/// Initialize the Prometheus metrics recorder and return its handle.
///
/// Must be called before any metrics are recorded. Hosts that already run
/// their own recorder skip this.
///
/// # Errors
///
/// Returns error if the recorder fails to install (e.g., already installed).
pub fn init_metrics_recorder() -> Result<PrometheusHandle, String> {
    PrometheusBuilder::new()
        // Connect handshake: network round trips bounded by the connect timeout
        .set_buckets_for_metric(
            Matcher::Prefix("room_session_connect".to_string()),
            &[
                0.050, 0.100, 0.250, 0.500, 1.000, 2.500, 5.000, 10.000, 30.000,
            ],
        )
        .map_err(|e| format!("Failed to set connect duration buckets: {e}"))?
        .install_recorder()
        .map_err(|e| format!("Failed to install Prometheus metrics recorder: {e}"))
}

/// Record a finished connect attempt.
///
/// Metric: `room_session_connect_total`, `room_session_connect_duration_seconds`
/// Labels: `outcome`
pub fn record_connect_attempt(outcome: &str, duration: Duration) {
    counter!("room_session_connect_total", "outcome" => outcome.to_string()).increment(1);
    histogram!("room_session_connect_duration_seconds", "outcome" => outcome.to_string())
        .record(duration.as_secs_f64());
}

/// Set the current session state code.
///
/// Metric: `room_session_state`
pub fn set_session_state(code: u8) {
    gauge!("room_session_state").set(f64::from(code));
}

/// Count a room event consumed by the session.
///
/// Metric: `room_session_events_total`
/// Labels: `event`
pub fn record_room_event(event: &str) {
    counter!("room_session_events_total", "event" => event.to_string()).increment(1);
}

/// Count a room event dropped without effect (e.g. for a departed participant).
///
/// Metric: `room_session_events_dropped_total`
/// Labels: `event`
pub fn record_event_dropped(event: &str) {
    counter!("room_session_events_dropped_total", "event" => event.to_string()).increment(1);
}

/// Count a surface sink failure.
///
/// Metric: `room_session_bind_failures_total`
/// Labels: `phase` (attach, detach)
pub fn record_bind_failure(phase: &str) {
    counter!("room_session_bind_failures_total", "phase" => phase.to_string()).increment(1);
}

/// Record a teardown and how many release steps failed.
///
/// Metric: `room_session_teardowns_total`, `room_session_teardown_failures_total`
/// Labels: `trigger`
pub fn record_teardown(trigger: &str, failures: usize) {
    counter!("room_session_teardowns_total", "trigger" => trigger.to_string()).increment(1);
    if failures > 0 {
        counter!("room_session_teardown_failures_total", "trigger" => trigger.to_string())
            .increment(failures as u64);
    }
}

/// Set the number of surfaces currently showing a track.
///
/// Metric: `room_session_bound_surfaces`
pub fn set_bound_surfaces(count: usize) {
    // usize to f64 conversion is safe for realistic surface counts (< 2^53)
    #[allow(clippy::cast_precision_loss)]
    gauge!("room_session_bound_surfaces").set(count as f64);
}
