//! Periodic health probe task
//!
//! One interval task fans out a GET to every registered backend's
//! healthcheck endpoint on each tick. Probes run as independent spawned
//! tasks: they never block each other, the forwarding path, or the next
//! tick. A probe succeeds iff the transport succeeds and the status is
//! exactly 200; everything else counts as a failure. Each probe carries its
//! own deadline so a hung backend cannot pile up outstanding probes.

use reqwest::StatusCode;
use std::sync::Arc;
use tokio::task::JoinHandle;
use tokio::time::{interval, Duration, MissedTickBehavior};
use tracing::{debug, warn};

use crate::config::HealthProbeConfig;
use crate::error::Result;
use crate::metrics;
use crate::registry::{Backend, Registry};

pub struct HealthProber {
    registry: Arc<Registry>,
    client: reqwest::Client,
    interval: Duration,
    path: String,
}

impl HealthProber {
    pub fn new(registry: Arc<Registry>, config: &HealthProbeConfig) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_millis(config.timeout_ms))
            .build()?;

        Ok(Self {
            registry,
            client,
            interval: Duration::from_millis(config.interval_ms),
            path: config.path.clone(),
        })
    }

    /// Start the probe loop as a background task.
    pub fn spawn(self) -> JoinHandle<()> {
        tokio::spawn(self.run())
    }

    async fn run(self) {
        let mut ticker = interval(self.interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

        loop {
            ticker.tick().await;

            for backend in self.registry.snapshot() {
                let client = self.client.clone();
                let path = self.path.clone();
                tokio::spawn(async move {
                    probe_backend(&client, &backend, &path).await;
                });
            }
        }
    }
}

/// Issue one probe and feed the outcome into the backend's state machine.
async fn probe_backend(client: &reqwest::Client, backend: &Backend, path: &str) {
    let url = format!("{}{}", backend.url(), path);

    match client.get(&url).send().await {
        Ok(response) if response.status() == StatusCode::OK => {
            debug!(backend = %backend.url(), "Health probe succeeded");
            backend.on_healthcheck_success();
            metrics::record_health_check(backend.url(), true);
        },
        Ok(response) => {
            warn!(
                backend = %backend.url(),
                status = %response.status(),
                "Health probe returned non-200"
            );
            backend.on_healthcheck_error();
            metrics::record_health_check(backend.url(), false);
        },
        Err(e) => {
            let reason = if e.is_timeout() {
                "timeout".to_string()
            } else if e.is_connect() {
                "connection refused".to_string()
            } else {
                e.to_string()
            };
            warn!(backend = %backend.url(), %reason, "Health probe failed");
            backend.on_healthcheck_error();
            metrics::record_health_check(backend.url(), false);
        },
    }

    metrics::update_backend_health(backend.url(), backend.status());
}
