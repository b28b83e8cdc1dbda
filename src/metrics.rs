//! Prometheus metrics following the usual naming conventions

use axum::{http::StatusCode, response::IntoResponse};
use lazy_static::lazy_static;
use prometheus::{
    histogram_opts, opts, register_counter_vec, register_gauge_vec, register_histogram_vec,
    CounterVec, Encoder, GaugeVec, HistogramVec, Registry, TextEncoder,
};
use std::time::Duration;

use crate::registry::BackendStatus;

lazy_static! {
    // Forwarding metrics
    pub static ref PROXY_REQUESTS_TOTAL: CounterVec = register_counter_vec!(
        opts!(
            "hivegate_proxy_requests_total",
            "Total number of proxied requests"
        ),
        &["backend", "outcome"]  // outcome: success, error, timeout
    ).unwrap();

    pub static ref PROXY_REQUEST_DURATION_SECONDS: HistogramVec = register_histogram_vec!(
        histogram_opts!(
            "hivegate_proxy_request_duration_seconds",
            "Upstream request duration in seconds",
            vec![0.001, 0.005, 0.01, 0.025, 0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0, 10.0]
        ),
        &["backend"]
    ).unwrap();

    // Health probe metrics
    pub static ref HEALTH_CHECK_TOTAL: CounterVec = register_counter_vec!(
        opts!(
            "hivegate_health_check_total",
            "Total number of health probes performed"
        ),
        &["backend", "result"]  // result: success, failure
    ).unwrap();

    pub static ref BACKEND_HEALTH_STATUS: GaugeVec = register_gauge_vec!(
        opts!(
            "hivegate_backend_health_status",
            "Backend status (1=healthy, 0.5=unhealthy, 0=down)"
        ),
        &["backend"]
    ).unwrap();

    // Registry for all metrics
    pub static ref REGISTRY: Registry = {
        let registry = Registry::new();
        registry.register(Box::new(PROXY_REQUESTS_TOTAL.clone())).unwrap();
        registry.register(Box::new(PROXY_REQUEST_DURATION_SECONDS.clone())).unwrap();
        registry.register(Box::new(HEALTH_CHECK_TOTAL.clone())).unwrap();
        registry.register(Box::new(BACKEND_HEALTH_STATUS.clone())).unwrap();
        registry
    };
}

/// Record an upstream exchange outcome
pub fn record_proxy_request(backend: &str, outcome: &str, duration: Duration) {
    PROXY_REQUESTS_TOTAL.with_label_values(&[backend, outcome]).inc();
    PROXY_REQUEST_DURATION_SECONDS
        .with_label_values(&[backend])
        .observe(duration.as_secs_f64());
}

/// Record a probe result
pub fn record_health_check(backend: &str, success: bool) {
    let result = if success { "success" } else { "failure" };
    HEALTH_CHECK_TOTAL.with_label_values(&[backend, result]).inc();
}

/// Publish a backend's current status as a gauge
pub fn update_backend_health(backend: &str, status: BackendStatus) {
    let value = match status {
        BackendStatus::Healthy => 1.0,
        BackendStatus::Unhealthy => 0.5,
        BackendStatus::Down => 0.0,
    };
    BACKEND_HEALTH_STATUS.with_label_values(&[backend]).set(value);
}

/// HTTP handler for the /metrics endpoint
pub async fn metrics_handler() -> impl IntoResponse {
    let encoder = TextEncoder::new();
    let metric_families = REGISTRY.gather();

    let mut buffer = Vec::new();
    match encoder.encode(&metric_families, &mut buffer) {
        Ok(()) => (
            StatusCode::OK,
            [("Content-Type", "text/plain; version=0.0.4")],
            buffer,
        ),
        Err(e) => {
            tracing::error!("Failed to encode metrics: {}", e);
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                [("Content-Type", "text/plain")],
                b"Failed to export metrics".to_vec(),
            )
        },
    }
}
