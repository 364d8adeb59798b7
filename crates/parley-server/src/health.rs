//! `/health` endpoint.

use serde::Serialize;
use std::time::Instant;

/// Health check response body.
#[derive(Debug, Clone, Serialize)]
pub struct HealthResponse {
    /// Always `"ok"` when the gateway is running.
    pub status: String,
    /// Seconds since the gateway started.
    pub uptime_secs: u64,
    /// Current open WebSocket connections.
    pub connections: usize,
    /// Distinct users with at least one open connection.
    pub online_users: usize,
    /// Rooms with at least one live subscriber.
    pub active_rooms: usize,
}

/// Build a health response from live counters.
#[must_use]
pub fn health_check(
    start_time: Instant,
    connections: usize,
    online_users: usize,
    active_rooms: usize,
) -> HealthResponse {
    HealthResponse {
        status: "ok".into(),
        uptime_secs: start_time.elapsed().as_secs(),
        connections,
        online_users,
        active_rooms,
    }
}
