//! Main proxy server implementation using the Axum web framework.
//!
//! Wires the registry, selector, latency tracker, and shared upstream
//! client into one `AppState`, assembles the router, and runs the listener
//! with the health prober alongside.
//!
//! Route precedence is strict: the admin endpoints shadow any backend path
//! with the same name; everything else falls through to the forwarder.

use axum::{
    routing::{get, post, put},
    Router,
};
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpListener;
use tower_http::trace::TraceLayer;
use tracing::info;

use crate::{
    config::Config,
    error::{Error, Result},
    health::HealthProber,
    latency::LatencyTracker,
    metrics,
    proxy::{forwarder, handler},
    registry::{Registry, Thresholds, WeightPolicy},
    routing::LoadBalancer,
};

/// Shared application state passed to all handlers
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<Config>,
    pub registry: Arc<Registry>,
    pub balancer: Arc<LoadBalancer>,
    pub tracker: Arc<LatencyTracker>,
    /// Upstream client shared across handlers; connection reuse is expected.
    pub client: reqwest::Client,
}

/// Main proxy server structure containing all shared state and configuration.
pub struct ProxyServer {
    config: Arc<Config>,
    state: AppState,
}

impl ProxyServer {
    /// Initialize a new proxy server with the given configuration.
    pub fn new(config: Config) -> Result<Self> {
        config.validate()?;

        let policy = WeightPolicy::from_weighted(config.proxy.weighted);
        let thresholds = Thresholds::from(&config.proxy);

        let registry = Arc::new(Registry::new(thresholds, policy));
        let balancer = Arc::new(LoadBalancer::new(policy));
        let tracker = Arc::new(LatencyTracker::new(
            config.proxy.expected_latency_ms,
            policy,
        ));

        let mut builder = reqwest::Client::builder();
        if config.proxy.upstream_timeout_ms > 0 {
            builder = builder.timeout(Duration::from_millis(config.proxy.upstream_timeout_ms));
        }
        let client = builder.build()?;

        let config = Arc::new(config);
        let state = AppState {
            config: config.clone(),
            registry,
            balancer,
            tracker,
            client,
        };

        Ok(Self { config, state })
    }

    pub fn state(&self) -> AppState {
        self.state.clone()
    }

    /// Build the Axum router with admin routes, metrics, and the wildcard
    /// forwarder.
    pub fn build_router(&self) -> Router {
        Router::new()
            .route("/register", post(handler::register))
            .route("/stats", get(handler::stats))
            .route("/reset", put(handler::reset))
            .route("/metrics", get(metrics::metrics_handler))
            .fallback(forwarder::forward)
            .layer(TraceLayer::new_for_http())
            .with_state(self.state.clone())
    }

    /// Bind the configured address and serve until shutdown.
    pub async fn run(self) -> Result<()> {
        let addr = format!("{}:{}", self.config.server.host, self.config.server.port)
            .parse::<SocketAddr>()
            .map_err(|e| Error::Config(format!("Invalid address: {e}")))?;

        let listener = TcpListener::bind(addr)
            .await
            .map_err(|e| Error::Server(format!("Failed to bind: {e}")))?;

        self.serve_on(listener).await
    }

    /// Serve on an already-bound listener. Used directly by tests so they
    /// can bind port 0 and learn the assigned address first.
    pub async fn serve_on(self, listener: TcpListener) -> Result<()> {
        let addr = listener
            .local_addr()
            .map_err(|e| Error::Server(format!("Failed to read local addr: {e}")))?;

        let prober = HealthProber::new(self.state.registry.clone(), &self.config.health)?;
        let probe_task = prober.spawn();

        info!(%addr, "Proxy listening");

        let router = self.build_router();
        let result = axum::serve(listener, router)
            .with_graceful_shutdown(async {
                let _ = tokio::signal::ctrl_c().await;
                info!("Shutting down proxy server gracefully...");
            })
            .await
            .map_err(|e| Error::Server(format!("Server error: {e}")));

        probe_task.abort();
        result
    }
}
