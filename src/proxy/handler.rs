//! Admin endpoint handlers: register, stats, reset

use axum::{extract::State, http::StatusCode, Json};
use bytes::Bytes;
use serde::Deserialize;
use tracing::info;
use url::Url;

use crate::error::ProxyError;
use crate::proxy::server::AppState;
use crate::stats::{self, StatsSnapshot};

/// Registration payload sent by a backend at startup.
#[derive(Debug, Deserialize)]
pub struct RegisterPayload {
    pub url: String,
}

/// `POST /register` — announce a backend.
///
/// The body is parsed by hand rather than through the `Json` extractor so a
/// malformed payload maps to 500, which is what the backend fleet expects.
pub async fn register(
    State(state): State<AppState>,
    body: Bytes,
) -> Result<StatusCode, ProxyError> {
    let payload: RegisterPayload = serde_json::from_slice(&body)
        .map_err(|e| ProxyError::InvalidRegistration(e.to_string()))?;

    Url::parse(&payload.url).map_err(|e| {
        ProxyError::InvalidRegistration(format!("{}: {e}", payload.url))
    })?;

    // A trailing slash would double up when request paths are spliced on.
    let url = payload.url.trim_end_matches('/');
    let outcome = state.registry.register(url);
    info!(backend = %url, ?outcome, "Registration accepted");

    Ok(StatusCode::OK)
}

/// `GET /stats` — snapshot of the registry and proxy-wide totals.
pub async fn stats(State(state): State<AppState>) -> Json<StatsSnapshot> {
    Json(stats::collect(&state.registry))
}

/// `PUT /reset` — return every backend to a fresh state and zero the
/// totals. Registration order survives; DOWN backends are re-admitted.
pub async fn reset(State(state): State<AppState>) -> StatusCode {
    state.registry.reset();
    state.balancer.reset();
    StatusCode::OK
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_register_payload_shape() {
        let payload: RegisterPayload =
            serde_json::from_str(r#"{"url": "http://localhost:9001"}"#).unwrap();
        assert_eq!(payload.url, "http://localhost:9001");

        assert!(serde_json::from_str::<RegisterPayload>(r#"{"address": "x"}"#).is_err());
        assert!(serde_json::from_str::<RegisterPayload>("not json").is_err());
    }
}
