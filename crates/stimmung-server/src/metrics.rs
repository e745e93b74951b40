//! Prometheus metrics recorder and metric names.

use metrics_exporter_prometheus::{BuildError, PrometheusBuilder, PrometheusHandle};
use tracing::info;

/// Install the Prometheus metrics recorder (global).
///
/// Returns the handle used to render `/metrics`. Call once at startup,
/// before any metrics are recorded.
pub fn install_recorder() -> Result<PrometheusHandle, BuildError> {
    let handle = PrometheusBuilder::new().install_recorder()?;
    info!("prometheus metrics recorder installed");
    Ok(handle)
}

/// A handle whose recorder is not installed globally. For tests and
/// embedding, where nothing needs to be exported.
pub fn detached_handle() -> PrometheusHandle {
    PrometheusBuilder::new().build_recorder().handle()
}

/// WebSocket connections opened total (counter).
pub const WS_CONNECTIONS_TOTAL: &str = "stimmung_ws_connections_total";
/// WebSocket disconnections total (counter).
pub const WS_DISCONNECTIONS_TOTAL: &str = "stimmung_ws_disconnections_total";
/// Active WebSocket connections (gauge).
pub const WS_CONNECTIONS_ACTIVE: &str = "stimmung_ws_connections_active";
/// WebSocket connection duration seconds (histogram).
pub const WS_CONNECTION_DURATION_SECONDS: &str = "stimmung_ws_connection_duration_seconds";
/// Messages dropped because a client queue was full or closed (counter).
pub const WS_BROADCAST_DROPS_TOTAL: &str = "stimmung_ws_broadcast_drops_total";
/// Upgrade requests refused by admission (counter).
pub const WS_ADMISSION_REFUSED_TOTAL: &str = "stimmung_ws_admission_refused_total";
/// Clients dropped for missing pongs (counter).
pub const WS_HEARTBEAT_TIMEOUTS_TOTAL: &str = "stimmung_ws_heartbeat_timeouts_total";
/// Room events applied (counter, labels: kind).
pub const ROOM_EVENTS_TOTAL: &str = "stimmung_room_events_total";
/// Room events dropped (counter, labels: reason).
pub const ROOM_EVENTS_REJECTED_TOTAL: &str = "stimmung_room_events_rejected_total";
/// Joined participants (gauge).
pub const ROOM_PARTICIPANTS: &str = "stimmung_room_participants";
/// Raised cards (gauge).
pub const ROOM_CARDS: &str = "stimmung_room_cards";
