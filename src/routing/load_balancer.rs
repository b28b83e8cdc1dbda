//! Weighted round-robin dispatch
//!
//! The selector walks the registry in registration order with a monotone
//! cursor and a two-value weight tier. The tier ticks down on every wrap to
//! index zero and resets once it falls below one, so over two full wraps a
//! normal-weight backend is visible on both sub-passes while a slow-demoted
//! backend is visible on only one — roughly a 2:1 traffic split.
//!
//! A backend is eligible on a pass iff it is not DOWN, not inside an
//! UNHEALTHY cooldown, and its weight reaches the current tier. The scan is
//! bounded to two full wraps; if nothing is eligible in that window the
//! selection fails instead of spinning.

use parking_lot::Mutex;
use std::sync::Arc;
use thiserror::Error;
use tokio::time::Instant;
use tracing::debug;

use crate::registry::{Backend, Registry, WeightPolicy};

#[derive(Debug, Error, PartialEq, Eq)]
pub enum SelectError {
    #[error("no eligible backend")]
    NoEligibleBackend,
}

/// Cursor state, guarded by the selector lock.
struct Cursor {
    /// Monotone selection index; the registry slot is `index % n`.
    index: u64,
    /// Current weight tier, in `1..=policy.normal`.
    tier: u32,
}

/// Weighted round-robin selector over the registry.
pub struct LoadBalancer {
    cursor: Mutex<Cursor>,
    policy: WeightPolicy,
}

impl LoadBalancer {
    pub fn new(policy: WeightPolicy) -> Self {
        Self {
            cursor: Mutex::new(Cursor {
                index: 0,
                tier: policy.normal,
            }),
            policy,
        }
    }

    pub fn policy(&self) -> WeightPolicy {
        self.policy
    }

    /// Pick the next eligible backend and account the hit.
    ///
    /// The chosen backend's hit counter and the global total are bumped
    /// while the cursor lock is held, so concurrent selections see hit
    /// counts in cursor-acquisition order and the totals stay exact.
    pub fn select(&self, registry: &Registry) -> Result<Arc<Backend>, SelectError> {
        let backends = registry.snapshot();
        let n = backends.len();
        if n == 0 {
            return Err(SelectError::NoEligibleBackend);
        }

        let now = Instant::now();
        let mut cursor = self.cursor.lock();

        // Two full wraps visit every backend under both tier values.
        for _ in 0..(2 * n) {
            let idx = (cursor.index % n as u64) as usize;
            if idx == 0 {
                cursor.tier = if cursor.tier <= 1 {
                    self.policy.normal
                } else {
                    cursor.tier - 1
                };
            }
            let candidate = &backends[idx];
            cursor.index += 1;

            if candidate.try_claim(now, cursor.tier) {
                registry.totals().record_hit();
                debug!(backend = %candidate.url(), tier = cursor.tier, "Selected backend");
                return Ok(Arc::clone(candidate));
            }
        }

        Err(SelectError::NoEligibleBackend)
    }

    /// Return the weight tier to its starting value. Used by the reset
    /// operation; the cursor position itself is preserved.
    pub fn reset(&self) {
        self.cursor.lock().tier = self.policy.normal;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::registry::{BackendStatus, Thresholds, SLOW_WEIGHT};
    use proptest::prelude::*;
    use std::collections::HashMap;
    use tokio::time::Duration;

    fn test_registry(urls: &[&str]) -> Registry {
        let registry = Registry::new(
            Thresholds {
                request_errors: 2,
                healthcheck_errors: 2,
                slow_requests: 2,
            },
            WeightPolicy::from_weighted(true),
        );
        for url in urls {
            registry.register(url);
        }
        registry
    }

    fn hit_counts(registry: &Registry) -> HashMap<String, u64> {
        registry
            .snapshot()
            .iter()
            .map(|b| (b.url().to_string(), b.snapshot().hit_count))
            .collect()
    }

    fn demote_to_slow(backend: &Backend) {
        let policy = WeightPolicy::from_weighted(true);
        for _ in 0..3 {
            backend.record_latency(500, 100, policy);
        }
        assert_eq!(backend.snapshot().weight, SLOW_WEIGHT);
    }

    #[tokio::test]
    async fn test_even_distribution_over_healthy_backends() {
        let registry = test_registry(&["http://a", "http://b", "http://c"]);
        let lb = LoadBalancer::new(WeightPolicy::from_weighted(true));

        for _ in 0..6 {
            lb.select(&registry).unwrap();
        }

        let hits = hit_counts(&registry);
        assert_eq!(hits["http://a"], 2);
        assert_eq!(hits["http://b"], 2);
        assert_eq!(hits["http://c"], 2);
        assert_eq!(registry.totals().total_hit(), 6);
    }

    #[tokio::test]
    async fn test_slow_backend_gets_half_share() {
        let registry = test_registry(&["http://a", "http://b"]);
        let lb = LoadBalancer::new(WeightPolicy::from_weighted(true));

        demote_to_slow(&registry.snapshot()[0]);

        for _ in 0..6 {
            lb.select(&registry).unwrap();
        }

        let hits = hit_counts(&registry);
        assert_eq!(hits["http://a"], 2);
        assert_eq!(hits["http://b"], 4);
    }

    #[tokio::test]
    async fn test_unweighted_policy_is_plain_round_robin() {
        let registry = Registry::new(
            Thresholds {
                request_errors: 2,
                healthcheck_errors: 2,
                slow_requests: 2,
            },
            WeightPolicy::from_weighted(false),
        );
        registry.register("http://a");
        registry.register("http://b");
        let lb = LoadBalancer::new(WeightPolicy::from_weighted(false));

        // Slow samples cannot demote anyone: both classes are weight 1.
        let policy = WeightPolicy::from_weighted(false);
        for _ in 0..5 {
            registry.snapshot()[0].record_latency(500, 100, policy);
        }

        for _ in 0..8 {
            lb.select(&registry).unwrap();
        }
        let hits = hit_counts(&registry);
        assert_eq!(hits["http://a"], 4);
        assert_eq!(hits["http://b"], 4);
    }

    #[tokio::test]
    async fn test_down_backend_is_skipped() {
        let registry = test_registry(&["http://a", "http://b"]);
        let lb = LoadBalancer::new(WeightPolicy::from_weighted(true));

        let down = registry.snapshot()[0].clone();
        down.on_healthcheck_error();
        down.on_healthcheck_error();
        assert_eq!(down.status(), BackendStatus::Down);

        for _ in 0..4 {
            let picked = lb.select(&registry).unwrap();
            assert_eq!(picked.url(), "http://b");
        }
        assert_eq!(hit_counts(&registry)["http://a"], 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_cooldown_excludes_then_readmits() {
        let registry = test_registry(&["http://a", "http://b"]);
        let lb = LoadBalancer::new(WeightPolicy::from_weighted(true));
        let cooldown = Duration::from_secs(30);

        let unhealthy = registry.snapshot()[0].clone();
        unhealthy.on_request_error(Instant::now(), cooldown);
        unhealthy.on_request_error(Instant::now(), cooldown);

        for _ in 0..4 {
            assert_eq!(lb.select(&registry).unwrap().url(), "http://b");
        }

        tokio::time::advance(Duration::from_secs(31)).await;
        let urls: Vec<_> = (0..2).map(|_| lb.select(&registry).unwrap().url().to_string()).collect();
        assert!(urls.contains(&"http://a".to_string()));
    }

    #[tokio::test]
    async fn test_no_eligible_backend_terminates() {
        let registry = test_registry(&["http://a", "http://b"]);
        let lb = LoadBalancer::new(WeightPolicy::from_weighted(true));

        for backend in registry.snapshot() {
            backend.on_healthcheck_error();
            backend.on_healthcheck_error();
        }

        assert_eq!(
            lb.select(&registry).unwrap_err(),
            SelectError::NoEligibleBackend
        );
    }

    #[tokio::test]
    async fn test_empty_registry_fails() {
        let registry = test_registry(&[]);
        let lb = LoadBalancer::new(WeightPolicy::from_weighted(true));
        assert_eq!(
            lb.select(&registry).unwrap_err(),
            SelectError::NoEligibleBackend
        );
    }

    #[tokio::test]
    async fn test_total_hits_match_backend_hits() {
        let registry = test_registry(&["http://a", "http://b", "http://c"]);
        let lb = LoadBalancer::new(WeightPolicy::from_weighted(true));
        demote_to_slow(&registry.snapshot()[1]);

        for _ in 0..25 {
            lb.select(&registry).unwrap();
        }

        let sum: u64 = hit_counts(&registry).values().sum();
        assert_eq!(sum, registry.totals().total_hit());
        assert_eq!(sum, 25);
    }

    proptest! {
        /// Whatever mix of down/slow backends the registry holds, a
        /// successful selection never lands on a DOWN backend and the hit
        /// totals stay exact.
        #[test]
        fn prop_selection_respects_eligibility(
            down_mask in proptest::collection::vec(any::<bool>(), 1..6),
            slow_mask in proptest::collection::vec(any::<bool>(), 1..6),
            requests in 1usize..40,
        ) {
            let rt = tokio::runtime::Builder::new_current_thread()
                .enable_time()
                .build()
                .unwrap();
            rt.block_on(async {
                let urls: Vec<String> =
                    (0..down_mask.len()).map(|i| format!("http://backend-{i}")).collect();
                let url_refs: Vec<&str> = urls.iter().map(String::as_str).collect();
                let registry = test_registry(&url_refs);
                let lb = LoadBalancer::new(WeightPolicy::from_weighted(true));

                for (i, backend) in registry.snapshot().iter().enumerate() {
                    if down_mask[i] {
                        backend.on_healthcheck_error();
                        backend.on_healthcheck_error();
                    } else if slow_mask.get(i).copied().unwrap_or(false) {
                        demote_to_slow(backend);
                    }
                }

                let any_eligible = down_mask.iter().any(|down| !down);
                for _ in 0..requests {
                    match lb.select(&registry) {
                        Ok(backend) => {
                            prop_assert!(any_eligible);
                            prop_assert_ne!(backend.status(), BackendStatus::Down);
                        },
                        Err(SelectError::NoEligibleBackend) => {
                            prop_assert!(!any_eligible);
                        },
                    }
                }

                let sum: u64 = registry
                    .snapshot()
                    .iter()
                    .map(|b| b.snapshot().hit_count)
                    .sum();
                prop_assert_eq!(sum, registry.totals().total_hit());
                Ok(())
            })?;
        }
    }
}
