//! `/health` endpoint.

use std::time::Instant;

use serde::Serialize;

/// Health check response body.
#[derive(Debug, Clone, Serialize)]
pub struct HealthResponse {
    /// `"ok"` while the engine runs, `"stopping"` otherwise.
    pub status: String,
    /// Seconds since the server started.
    pub uptime_secs: u64,
    /// Live WebSocket connections.
    pub connections: usize,
    /// Identities with at least one live connection.
    pub online_identities: usize,
}

/// Build a health response from live counters.
pub fn health_check(
    start_time: Instant,
    running: bool,
    connections: usize,
    online_identities: usize,
) -> HealthResponse {
    HealthResponse {
        status: if running { "ok" } else { "stopping" }.into(),
        uptime_secs: start_time.elapsed().as_secs(),
        connections,
        online_identities,
    }
}
