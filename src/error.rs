//! Error types for hivegate

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use std::io;
use thiserror::Error;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Error, Debug)]
pub enum Error {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Server error: {0}")]
    Server(String),

    #[error("IO error: {0}")]
    Io(#[from] io::Error),

    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),
}

/// Proxy-boundary errors surfaced to clients as HTTP responses.
#[derive(Error, Debug)]
pub enum ProxyError {
    #[error("no healthy server available")]
    NoEligibleBackend,

    #[error("upstream request timed out: {0}")]
    UpstreamTimeout(String),

    #[error("upstream request failed: {0}")]
    Upstream(String),

    #[error("invalid registration: {0}")]
    InvalidRegistration(String),

    #[error("failed to build response: {0}")]
    ResponseConstruction(String),
}

impl ProxyError {
    /// Status code at the proxy boundary.
    ///
    /// 408 for "no eligible backend" is kept for compatibility with the
    /// mock-backend fleet; 503 would be the conventional choice.
    pub fn status_code(&self) -> StatusCode {
        match self {
            ProxyError::NoEligibleBackend => StatusCode::REQUEST_TIMEOUT,
            ProxyError::UpstreamTimeout(_) => StatusCode::REQUEST_TIMEOUT,
            ProxyError::Upstream(_) => StatusCode::INTERNAL_SERVER_ERROR,
            ProxyError::InvalidRegistration(_) => StatusCode::INTERNAL_SERVER_ERROR,
            ProxyError::ResponseConstruction(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for ProxyError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        let body = Json(json!({
            "error": self.to_string(),
        }));
        (status, body).into_response()
    }
}

impl From<crate::routing::load_balancer::SelectError> for ProxyError {
    fn from(err: crate::routing::load_balancer::SelectError) -> Self {
        match err {
            crate::routing::load_balancer::SelectError::NoEligibleBackend => {
                ProxyError::NoEligibleBackend
            },
        }
    }
}
