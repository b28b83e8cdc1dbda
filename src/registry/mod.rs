//! Ordered backend registry
//!
//! Backends announce themselves through `POST /register` and are kept in
//! insertion order, which defines the selector's iteration order. The set
//! never shrinks; `reset` replaces each entry with a fresh default state
//! keyed by the same URL.

pub mod backend;

use parking_lot::{Mutex, RwLock};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tracing::info;

pub use backend::{
    Backend, BackendState, BackendStatus, Thresholds, WeightPolicy, NORMAL_WEIGHT, SLOW_WEIGHT,
};

/// Outcome of a registration call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Registration {
    Created,
    Revived,
}

/// Proxy-wide counters kept alongside the backend set.
///
/// `total_hit` is bumped by the selector in the same critical section as the
/// chosen backend's hit counter, so the two always sum up exactly.
pub struct TotalCounters {
    total_hit: AtomicU64,
    total_avg_latency_ms: Mutex<f64>,
}

impl TotalCounters {
    fn new() -> Self {
        Self {
            total_hit: AtomicU64::new(0),
            total_avg_latency_ms: Mutex::new(0.0),
        }
    }

    pub fn record_hit(&self) {
        self.total_hit.fetch_add(1, Ordering::Relaxed);
    }

    pub fn total_hit(&self) -> u64 {
        self.total_hit.load(Ordering::Relaxed)
    }

    /// Fold a sample into the global running mean, weighted by the hit total
    /// that already includes the request being observed.
    pub fn record_latency(&self, sample_ms: u64) {
        let mut avg = self.total_avg_latency_ms.lock();
        let k = self.total_hit().max(1) as f64;
        *avg = (*avg * (k - 1.0) + sample_ms as f64) / k;
    }

    pub fn avg_latency_ms(&self) -> f64 {
        *self.total_avg_latency_ms.lock()
    }

    fn reset(&self) {
        self.total_hit.store(0, Ordering::Relaxed);
        *self.total_avg_latency_ms.lock() = 0.0;
    }
}

/// The registered backend set plus the proxy-wide counters.
pub struct Registry {
    backends: RwLock<Vec<Arc<Backend>>>,
    totals: TotalCounters,
    thresholds: Thresholds,
    policy: WeightPolicy,
}

impl Registry {
    pub fn new(thresholds: Thresholds, policy: WeightPolicy) -> Self {
        Self {
            backends: RwLock::new(Vec::new()),
            totals: TotalCounters::new(),
            thresholds,
            policy,
        }
    }

    /// Append-or-revive: a known URL is marked healthy with its counters
    /// intact, an unknown one is appended with default state.
    pub fn register(&self, url: &str) -> Registration {
        let mut backends = self.backends.write();
        if let Some(existing) = backends.iter().find(|b| b.url() == url) {
            existing.revive();
            return Registration::Revived;
        }
        backends.push(Arc::new(Backend::new(
            url.to_string(),
            self.thresholds,
            self.policy.normal,
        )));
        info!(backend = %url, total = backends.len(), "Backend registered");
        Registration::Created
    }

    /// Stable view of the current backend set, in registration order.
    pub fn snapshot(&self) -> Vec<Arc<Backend>> {
        self.backends.read().clone()
    }

    pub fn len(&self) -> usize {
        self.backends.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.backends.read().is_empty()
    }

    pub fn totals(&self) -> &TotalCounters {
        &self.totals
    }

    /// Replace every backend with a fresh default state keyed by the same
    /// URL, preserving order, and zero the proxy-wide counters. In-flight
    /// requests keep reporting against the state they were dispatched to.
    pub fn reset(&self) {
        let mut backends = self.backends.write();
        for slot in backends.iter_mut() {
            *slot = Arc::new(Backend::new(
                slot.url().to_string(),
                self.thresholds,
                self.policy.normal,
            ));
        }
        self.totals.reset();
        info!(backends = backends.len(), "Registry reset");
    }
}
