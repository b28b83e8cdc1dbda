//! Read-only statistics snapshot for the stats endpoint

use serde::Serialize;
use std::collections::BTreeMap;
use tokio::time::Instant;

use crate::registry::{BackendStatus, Registry};

/// Proxy-wide statistics document served by `GET /stats`.
#[derive(Debug, Clone, Serialize)]
pub struct StatsSnapshot {
    pub total_hit_count: u64,
    /// Running mean of all observed latencies, milliseconds.
    pub total_avg_latency: f64,
    pub servers: BTreeMap<String, ServerStats>,
}

#[derive(Debug, Clone, Serialize)]
pub struct ServerStats {
    pub status: BackendStatus,
    pub hit_count: u64,
    /// Running mean latency of this backend, milliseconds.
    pub avg_lat: f64,
    pub weight: u32,
    /// Seconds until the cooldown elapses; 0 when not cooling down.
    pub wait: f64,
}

/// Assemble a snapshot. Each backend's fields are read under its own lock
/// so they are mutually consistent; the document as a whole is not atomic
/// across backends.
pub fn collect(registry: &Registry) -> StatsSnapshot {
    let now = Instant::now();
    let mut servers = BTreeMap::new();

    for backend in registry.snapshot() {
        let state = backend.snapshot();
        let wait = match (state.status, state.recover_at) {
            (BackendStatus::Unhealthy, Some(at)) => {
                at.saturating_duration_since(now).as_secs_f64()
            },
            _ => 0.0,
        };
        servers.insert(
            backend.url().to_string(),
            ServerStats {
                status: state.status,
                hit_count: state.hit_count,
                avg_lat: state.avg_latency_ms,
                weight: state.weight,
                wait,
            },
        );
    }

    StatsSnapshot {
        total_hit_count: registry.totals().total_hit(),
        total_avg_latency: registry.totals().avg_latency_ms(),
        servers,
    }
}
