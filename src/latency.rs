//! Latency tracking
//!
//! Observes one sample per forwarded request and maintains two hit-count
//! weighted running means: the proxy-wide average and the selected
//! backend's own average. The same observation drives the slow-request
//! policy that moves a backend between the normal and slow weight classes.

use crate::registry::{Backend, TotalCounters, WeightPolicy};

pub struct LatencyTracker {
    expected_latency_ms: u64,
    policy: WeightPolicy,
}

impl LatencyTracker {
    pub fn new(expected_latency_ms: u64, policy: WeightPolicy) -> Self {
        Self {
            expected_latency_ms,
            policy,
        }
    }

    /// Record one whole-millisecond sample against the backend the request
    /// was dispatched to. Both averages use the post-increment hit count of
    /// their scope, so they are eventually consistent with the true sample
    /// order rather than a precise statistic.
    pub fn observe(&self, backend: &Backend, totals: &TotalCounters, sample_ms: u64) {
        totals.record_latency(sample_ms);
        backend.record_latency(sample_ms, self.expected_latency_ms, self.policy);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::registry::{Registry, Thresholds, NORMAL_WEIGHT, SLOW_WEIGHT};
    use tokio::time::Instant;

    fn setup() -> (Registry, LatencyTracker) {
        let policy = WeightPolicy::from_weighted(true);
        let registry = Registry::new(
            Thresholds {
                request_errors: 2,
                healthcheck_errors: 2,
                slow_requests: 2,
            },
            policy,
        );
        registry.register("http://localhost:9001");
        (registry, LatencyTracker::new(100, policy))
    }

    #[tokio::test]
    async fn test_observe_updates_both_averages() {
        let (registry, tracker) = setup();
        let backend = registry.snapshot()[0].clone();

        assert!(backend.try_claim(Instant::now(), 1));
        registry.totals().record_hit();
        tracker.observe(&backend, registry.totals(), 40);

        assert!(backend.try_claim(Instant::now(), 1));
        registry.totals().record_hit();
        tracker.observe(&backend, registry.totals(), 80);

        assert!((registry.totals().avg_latency_ms() - 60.0).abs() < f64::EPSILON);
        assert!((backend.snapshot().avg_latency_ms - 60.0).abs() < f64::EPSILON);
    }

    #[tokio::test]
    async fn test_slow_samples_demote_past_threshold() {
        let (registry, tracker) = setup();
        let backend = registry.snapshot()[0].clone();

        for expected_weight in [NORMAL_WEIGHT, NORMAL_WEIGHT, SLOW_WEIGHT] {
            assert!(backend.try_claim(Instant::now(), 1));
            registry.totals().record_hit();
            tracker.observe(&backend, registry.totals(), 150);
            assert_eq!(backend.snapshot().weight, expected_weight);
        }
    }

    #[tokio::test]
    async fn test_fast_sample_restores_normal_weight() {
        let (registry, tracker) = setup();
        let backend = registry.snapshot()[0].clone();

        for _ in 0..3 {
            assert!(backend.try_claim(Instant::now(), 1));
            registry.totals().record_hit();
            tracker.observe(&backend, registry.totals(), 150);
        }
        assert_eq!(backend.snapshot().weight, SLOW_WEIGHT);

        assert!(backend.try_claim(Instant::now(), 1));
        registry.totals().record_hit();
        tracker.observe(&backend, registry.totals(), 90);

        let state = backend.snapshot();
        assert_eq!(state.weight, NORMAL_WEIGHT);
        assert_eq!(state.slow_request_count, 0);
    }
}
