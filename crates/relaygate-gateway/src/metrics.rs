//! Per-endpoint request metrics.

use std::collections::{BTreeMap, HashMap};
use std::time::Duration;

use parking_lot::Mutex;
use serde::Serialize;

#[derive(Debug, Default, Clone, Copy)]
struct EndpointStats {
    requests: u64,
    errors: u64,
    total_latency: Duration,
    max_latency: Duration,
}

/// Point-in-time view of one endpoint's counters.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct EndpointSnapshot {
    /// Requests seen.
    pub requests: u64,
    /// Requests that ended in an error.
    pub errors: u64,
    /// Sum of request latencies in milliseconds.
    pub total_latency_ms: u64,
    /// Mean latency in milliseconds.
    pub avg_latency_ms: u64,
    /// Slowest request in milliseconds.
    pub max_latency_ms: u64,
}

fn millis(duration: Duration) -> u64 {
    u64::try_from(duration.as_millis()).unwrap_or(u64::MAX)
}

/// Request counters keyed by endpoint name.
#[derive(Debug, Default)]
pub struct GatewayMetrics {
    endpoints: Mutex<HashMap<&'static str, EndpointStats>>,
}

impl GatewayMetrics {
    /// Create an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Record one request.
    pub fn record(&self, endpoint: &'static str, latency: Duration, is_error: bool) {
        let mut endpoints = self.endpoints.lock();
        let stats = endpoints.entry(endpoint).or_default();
        stats.requests += 1;
        if is_error {
            stats.errors += 1;
        }
        stats.total_latency = stats.total_latency.saturating_add(latency);
        stats.max_latency = stats.max_latency.max(latency);
    }

    /// Snapshot of every endpoint, sorted by name.
    #[must_use]
    pub fn snapshot(&self) -> BTreeMap<&'static str, EndpointSnapshot> {
        self.endpoints
            .lock()
            .iter()
            .map(|(name, stats)| {
                let total = millis(stats.total_latency);
                (
                    *name,
                    EndpointSnapshot {
                        requests: stats.requests,
                        errors: stats.errors,
                        total_latency_ms: total,
                        avg_latency_ms: total / stats.requests.max(1),
                        max_latency_ms: millis(stats.max_latency),
                    },
                )
            })
            .collect()
    }
}
