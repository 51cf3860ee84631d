//! `/health` endpoint.

use serde::Serialize;
use std::time::Instant;

/// Health check response body.
#[derive(Debug, Clone, Serialize)]
pub struct HealthResponse {
    /// `"ok"` while the channel worker is running, `"degraded"` otherwise.
    pub status: String,
    /// Seconds since the server started.
    pub uptime_secs: u64,
    /// Open transport connections.
    pub connections: usize,
    /// Connections allowed to receive broadcasts.
    pub approved_connections: usize,
    /// Identified users.
    pub users: usize,
}

/// Build a health response from live counters. `users` is `None` when the
/// channel worker could not be reached.
pub fn health_check(
    start_time: Instant,
    connections: usize,
    approved_connections: usize,
    users: Option<usize>,
) -> HealthResponse {
    HealthResponse {
        status: if users.is_some() { "ok" } else { "degraded" }.into(),
        uptime_secs: start_time.elapsed().as_secs(),
        connections,
        approved_connections,
        users: users.unwrap_or(0),
    }
}
