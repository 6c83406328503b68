//! Prometheus metrics recorder and the gateway's metric name constants.

use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};
use std::sync::OnceLock;
use tracing::info;

static RECORDER: OnceLock<PrometheusHandle> = OnceLock::new();

/// Install the global Prometheus recorder, or reuse the one an earlier
/// gateway in this process already installed.
///
/// Returns the handle used to render the `/metrics` endpoint.
pub fn install_recorder() -> PrometheusHandle {
    RECORDER
        .get_or_init(|| {
            let handle = match PrometheusBuilder::new().install_recorder() {
                Ok(handle) => handle,
                // Another recorder got there first; keep a render-only
                // handle so `/metrics` still answers.
                Err(_) => PrometheusBuilder::new().build_recorder().handle(),
            };
            info!("prometheus metrics recorder installed");
            handle
        })
        .clone()
}

/// Render Prometheus text exposition for `/metrics`.
#[must_use]
pub fn render(handle: &PrometheusHandle) -> String {
    handle.render()
}

// Metric name constants to avoid typos across modules.

/// WebSocket sessions opened (counter).
pub const WS_SESSIONS_TOTAL: &str = "ws_sessions_total";
/// WebSocket sessions currently streaming (gauge).
pub const WS_SESSIONS_ACTIVE: &str = "ws_sessions_active";
/// Session duration from upgrade to close (histogram).
pub const WS_SESSION_DURATION_SECONDS: &str = "ws_session_duration_seconds";
/// Frames pushed to clients (counter).
pub const WS_FRAMES_SENT_TOTAL: &str = "ws_frames_sent_total";
/// Frames received from clients (counter).
pub const WS_FRAMES_RECEIVED_TOTAL: &str = "ws_frames_received_total";
/// Client frames that failed to decode (counter).
pub const WS_DECODE_FAILURES_TOTAL: &str = "ws_decode_failures_total";
/// Sessions ended by a failed socket write (counter).
pub const WS_WRITE_FAILURES_TOTAL: &str = "ws_write_failures_total";

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
