//! Liveness probe served at `/health`.

use std::time::Instant;

use serde::Serialize;

/// JSON body of a liveness probe.
#[derive(Debug, Clone, Serialize)]
pub struct HealthResponse {
    /// `"ok"` whenever the process can answer at all.
    pub status: &'static str,
    /// Whole seconds since [`ChatServer`](crate::ChatServer) was built.
    pub uptime_secs: u64,
    /// Users with a live chat session.
    pub connections: usize,
}

/// Snapshot the probe for a server started at `started`.
pub fn health_check(started: Instant, connections: usize) -> HealthResponse {
    HealthResponse {
        status: "ok",
        uptime_secs: started.elapsed().as_secs(),
        connections,
    }
}
