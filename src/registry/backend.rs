//! Per-backend state machine
//!
//! Each registered backend carries its own counters, health status, cooldown
//! deadline, latency average, and dispatch weight. Every read-modify-write
//! goes through the backend's own mutex so a stats reader never observes a
//! half-applied outcome.
//!
//! Two independent demotion axes drive the status:
//! - request errors (refusal/timeout under live traffic) demote to
//!   `Unhealthy` with a timed cooldown, and successful traffic rescues the
//!   backend once the cooldown has elapsed;
//! - healthcheck errors demote to `Down`, and only a successful probe
//!   rescues a `Down` backend.

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use tokio::time::{Duration, Instant};
use tracing::{info, warn};

use crate::config::ProxyConfig;

/// Dispatch weight of a backend at normal speed.
pub const NORMAL_WEIGHT: u32 = 2;
/// Dispatch weight of a backend demoted for slow responses.
pub const SLOW_WEIGHT: u32 = 1;

/// Weight classes in effect for this proxy instance.
///
/// With weighting disabled both classes collapse to 1 and the selector
/// degenerates to plain round-robin.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WeightPolicy {
    pub normal: u32,
    pub slow: u32,
}

impl WeightPolicy {
    pub fn from_weighted(weighted: bool) -> Self {
        if weighted {
            Self {
                normal: NORMAL_WEIGHT,
                slow: SLOW_WEIGHT,
            }
        } else {
            Self { normal: 1, slow: 1 }
        }
    }
}

/// Demotion thresholds, fixed per backend at creation.
#[derive(Debug, Clone, Copy)]
pub struct Thresholds {
    pub request_errors: u32,
    pub healthcheck_errors: u32,
    pub slow_requests: u32,
}

impl From<&ProxyConfig> for Thresholds {
    fn from(proxy: &ProxyConfig) -> Self {
        Self {
            request_errors: proxy.request_error_threshold,
            healthcheck_errors: proxy.healthcheck_error_threshold,
            slow_requests: proxy.slow_request_threshold,
        }
    }
}

/// Backend health status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum BackendStatus {
    /// Accepting traffic.
    Healthy,
    /// Demoted by request errors; excluded until the cooldown elapses.
    Unhealthy,
    /// Demoted by probe failures; excluded until a probe succeeds.
    Down,
}

/// Mutable per-backend state, guarded by the backend's mutex.
#[derive(Debug, Clone)]
pub struct BackendState {
    pub status: BackendStatus,
    pub hit_count: u64,
    pub request_error_count: u32,
    pub healthcheck_error_count: u32,
    pub slow_request_count: u32,
    /// Cooldown deadline; meaningful only while status is `Unhealthy`.
    pub recover_at: Option<Instant>,
    pub avg_latency_ms: f64,
    pub weight: u32,
}

impl BackendState {
    fn new(weight: u32) -> Self {
        Self {
            status: BackendStatus::Healthy,
            hit_count: 0,
            request_error_count: 0,
            healthcheck_error_count: 0,
            slow_request_count: 0,
            recover_at: None,
            avg_latency_ms: 0.0,
            weight,
        }
    }
}

/// One registered backend. The URL is its immutable identity.
pub struct Backend {
    url: String,
    thresholds: Thresholds,
    state: Mutex<BackendState>,
}

impl Backend {
    pub fn new(url: String, thresholds: Thresholds, initial_weight: u32) -> Self {
        Self {
            url,
            thresholds,
            state: Mutex::new(BackendState::new(initial_weight)),
        }
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    pub fn status(&self) -> BackendStatus {
        self.state.lock().status
    }

    /// Eligibility check and hit accounting in a single critical section.
    ///
    /// A backend is eligible on this pass iff it is not `Down`, not inside an
    /// `Unhealthy` cooldown, and its weight reaches the current tier. On
    /// acceptance the hit counter is bumped before the lock is released, so
    /// the count exactly equals the number of selections.
    pub fn try_claim(&self, now: Instant, tier: u32) -> bool {
        let mut state = self.state.lock();

        let available = match state.status {
            BackendStatus::Down => false,
            BackendStatus::Unhealthy => state.recover_at.is_none_or(|at| now >= at),
            BackendStatus::Healthy => true,
        };

        if available && state.weight >= tier {
            state.hit_count += 1;
            true
        } else {
            false
        }
    }

    /// A forwarded request completed without counting against the backend.
    pub fn on_request_success(&self) {
        let mut state = self.state.lock();
        state.request_error_count = 0;
        if state.status != BackendStatus::Healthy {
            info!(backend = %self.url, "Backend recovered via successful request");
        }
        state.status = BackendStatus::Healthy;
        state.recover_at = None;
    }

    /// A forwarded request failed (transport error, timeout, or 5xx).
    pub fn on_request_error(&self, now: Instant, cooldown: Duration) {
        let mut state = self.state.lock();
        state.request_error_count += 1;
        if state.request_error_count >= self.thresholds.request_errors {
            if state.status != BackendStatus::Unhealthy {
                warn!(
                    backend = %self.url,
                    errors = state.request_error_count,
                    cooldown_ms = cooldown.as_millis() as u64,
                    "Backend marked unhealthy"
                );
            }
            state.status = BackendStatus::Unhealthy;
            state.recover_at = Some(now + cooldown);
        }
    }

    /// A liveness probe returned 200.
    ///
    /// Deliberately rescues only `Down` backends; recovery from `Unhealthy`
    /// is driven by the cooldown plus the next successful request.
    pub fn on_healthcheck_success(&self) {
        let mut state = self.state.lock();
        if state.status == BackendStatus::Down {
            state.status = BackendStatus::Healthy;
            state.healthcheck_error_count = 0;
            info!(backend = %self.url, "Backend revived by healthcheck");
        }
    }

    /// A liveness probe failed (transport error or non-200).
    pub fn on_healthcheck_error(&self) {
        let mut state = self.state.lock();
        state.healthcheck_error_count += 1;
        if state.healthcheck_error_count >= self.thresholds.healthcheck_errors {
            if state.status != BackendStatus::Down {
                warn!(
                    backend = %self.url,
                    failures = state.healthcheck_error_count,
                    "Backend marked down"
                );
            }
            state.status = BackendStatus::Down;
        }
    }

    /// Fold a latency sample into the running mean and apply the slow-request
    /// policy: any fast sample rehabilitates immediately, while accumulated
    /// slow samples past the threshold halve the backend's dispatch share.
    ///
    /// The mean is hit-count weighted: `new = (old * (k - 1) + x) / k` with
    /// `k` the hit count that already includes the current request.
    pub fn record_latency(&self, sample_ms: u64, expected_latency_ms: u64, policy: WeightPolicy) {
        let mut state = self.state.lock();

        let x = sample_ms as f64;
        let k = state.hit_count.max(1) as f64;
        state.avg_latency_ms = (state.avg_latency_ms * (k - 1.0) + x) / k;

        if sample_ms <= expected_latency_ms {
            state.slow_request_count = 0;
            state.weight = policy.normal;
        } else {
            state.slow_request_count += 1;
            if state.slow_request_count > self.thresholds.slow_requests {
                if state.weight != policy.slow {
                    info!(
                        backend = %self.url,
                        slow_requests = state.slow_request_count,
                        "Backend demoted to slow weight"
                    );
                }
                state.weight = policy.slow;
            }
        }
    }

    /// Re-registration of a known URL: mark healthy, keep counters.
    pub fn revive(&self) {
        let mut state = self.state.lock();
        if state.status != BackendStatus::Healthy {
            info!(backend = %self.url, "Backend revived by re-registration");
        }
        state.status = BackendStatus::Healthy;
    }

    /// Consistent copy of the backend's fields, taken under its lock.
    pub fn snapshot(&self) -> BackendState {
        self.state.lock().clone()
    }
}

impl std::fmt::Debug for Backend {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Backend")
            .field("url", &self.url)
            .field("state", &*self.state.lock())
            .finish()
    }
}
