//! Prometheus metrics recorder and metric names.

use metrics_exporter_prometheus::{BuildError, PrometheusBuilder, PrometheusHandle};
use tracing::info;

/// Install the Prometheus metrics recorder (global).
///
/// Returns the `PrometheusHandle` used to render the `/metrics` endpoint.
/// Call once at startup before any metrics are recorded.
pub fn install_recorder() -> Result<PrometheusHandle, BuildError> {
    let handle = PrometheusBuilder::new().install_recorder()?;
    info!("prometheus metrics recorder installed");
    Ok(handle)
}

/// Render Prometheus text format from the installed recorder.
pub fn render(handle: &PrometheusHandle) -> String {
    handle.render()
}

// Metric name constants to avoid typos across modules.

/// WebSocket sessions opened (counter).
pub const WS_CONNECTIONS_TOTAL: &str = "ws_connections_total";
/// WebSocket sessions torn down (counter).
pub const WS_DISCONNECTIONS_TOTAL: &str = "ws_disconnections_total";
/// Live WebSocket sessions (gauge).
pub const WS_CONNECTIONS_ACTIVE: &str = "ws_connections_active";
/// Session lifetime in seconds (histogram).
pub const WS_CONNECTION_DURATION_SECONDS: &str = "ws_connection_duration_seconds";
/// Sessions replaced by a newer connection for the same user (counter).
pub const WS_SESSIONS_SUPERSEDED_TOTAL: &str = "ws_sessions_superseded_total";
/// Routed chat messages (counter, labels: outcome).
pub const CHAT_MESSAGES_ROUTED_TOTAL: &str = "chat_messages_routed_total";
/// Inbound frames that did not parse as a chat message (counter).
pub const CHAT_FRAMES_MALFORMED_TOTAL: &str = "chat_frames_malformed_total";
/// Realtime messages written to the chat store (counter).
pub const CHAT_MESSAGES_ARCHIVED_TOTAL: &str = "chat_messages_archived_total";
/// Realtime messages the chat store rejected or failed to write (counter).
pub const CHAT_ARCHIVE_ERRORS_TOTAL: &str = "chat_archive_errors_total";
