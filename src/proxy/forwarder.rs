//! Wildcard forwarding path
//!
//! Any request that misses the admin routes lands here: pick a backend,
//! replay the request against it (method, path, query, headers, and body
//! stream unchanged), time the exchange, and stream the upstream response
//! back. The upstream status is passed through verbatim — only transport
//! errors, client-side timeouts, and 5xx responses count against the
//! backend, so an application-level 4xx reaches the client untouched.

use axum::{
    body::Body,
    extract::{Request, State},
    http,
    response::Response,
};
use tokio::time::{Duration, Instant};
use tracing::{debug, warn};

use crate::error::ProxyError;
use crate::metrics;
use crate::proxy::server::AppState;

pub async fn forward(
    State(state): State<AppState>,
    req: Request,
) -> Result<Response, ProxyError> {
    if state.registry.is_empty() {
        return Err(ProxyError::NoEligibleBackend);
    }

    let backend = state.balancer.select(&state.registry)?;
    let cooldown = Duration::from_millis(state.config.proxy.cooldown_ms);

    let (parts, body) = req.into_parts();
    let path_query = parts
        .uri
        .path_and_query()
        .map(|pq| pq.as_str())
        .unwrap_or("/");
    let target = format!("{}{}", backend.url(), path_query);
    debug!(method = %parts.method, %target, "Forwarding request");

    let upstream = state
        .client
        .request(parts.method, target)
        .headers(parts.headers)
        .body(reqwest::Body::wrap_stream(body.into_data_stream()));

    let start = Instant::now();
    let result = upstream.send().await;
    let elapsed = start.elapsed();

    // The sample is reported for every completed exchange, success or not;
    // the selector already counted this request against the backend.
    state
        .tracker
        .observe(&backend, state.registry.totals(), elapsed.as_millis() as u64);

    let response = match result {
        Err(e) => {
            backend.on_request_error(Instant::now(), cooldown);
            let outcome = if e.is_timeout() { "timeout" } else { "error" };
            metrics::record_proxy_request(backend.url(), outcome, elapsed);
            warn!(backend = %backend.url(), error = %e, "Upstream request failed");

            if e.is_timeout() {
                Err(ProxyError::UpstreamTimeout(e.to_string()))
            } else {
                Err(ProxyError::Upstream(e.to_string()))
            }
        },
        Ok(upstream_response) => {
            let status = upstream_response.status();
            if status.is_server_error() {
                backend.on_request_error(Instant::now(), cooldown);
                metrics::record_proxy_request(backend.url(), "error", elapsed);
            } else {
                backend.on_request_success();
                metrics::record_proxy_request(backend.url(), "success", elapsed);
            }

            let mut builder = http::Response::builder().status(status);
            if let Some(headers) = builder.headers_mut() {
                *headers = upstream_response.headers().clone();
            }
            builder
                .body(Body::from_stream(upstream_response.bytes_stream()))
                .map_err(|e| ProxyError::ResponseConstruction(e.to_string()))
        },
    };

    metrics::update_backend_health(backend.url(), backend.status());
    response
}
