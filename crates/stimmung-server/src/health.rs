//! `/health` endpoint.

use std::time::Instant;

use serde::Serialize;
use stimmung_core::RoomStats;

/// Health check response body.
#[derive(Debug, Clone, Serialize)]
pub struct HealthResponse {
    /// `"ok"`, or `"unavailable"` when the room actor is gone.
    pub status: String,
    /// Seconds since the server started.
    pub uptime_secs: u64,
    /// Open WebSocket sessions, joined or not.
    pub connections: usize,
    /// Joined participants.
    pub participants: usize,
    /// Raised cards.
    pub cards: usize,
}

/// Build a health response. `None` means the room did not answer.
pub fn health_check(start_time: Instant, stats: Option<RoomStats>) -> HealthResponse {
    let status = if stats.is_some() { "ok" } else { "unavailable" };
    let stats = stats.unwrap_or_default();
    HealthResponse {
        status: status.into(),
        uptime_secs: start_time.elapsed().as_secs(),
        connections: stats.sessions,
        participants: stats.participants,
        cards: stats.cards,
    }
}
