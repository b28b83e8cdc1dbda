//! Common test utilities for integration tests

use hivegate::config::Config;
use hivegate::ProxyServer;
use reqwest::Client;
use serde_json::{json, Value};
use std::net::SocketAddr;
use std::time::Duration;
use tokio::net::TcpListener;

/// Create a test configuration with timers sized for fast tests.
///
/// Probing is effectively parked (one-minute interval) so tests that do not
/// exercise the prober are not disturbed by it; probe-focused tests override
/// the interval themselves.
pub fn test_config() -> Config {
    let mut config = Config::default();
    config.server.host = "127.0.0.1".to_string();
    config.server.port = 0;
    config.health.interval_ms = 60_000;
    config
}

/// Start a proxy server on an ephemeral port.
pub async fn start_proxy(config: Config) -> TestProxy {
    let server = ProxyServer::new(config).expect("Failed to create server");

    let listener = TcpListener::bind("127.0.0.1:0").await.expect("Failed to bind test port");
    let addr = listener.local_addr().expect("Failed to read local addr");

    let handle = tokio::spawn(async move {
        server.serve_on(listener).await.expect("Server failed");
    });

    // Give the listener a moment to start accepting.
    tokio::time::sleep(Duration::from_millis(150)).await;

    TestProxy { addr, handle }
}

/// Test proxy handle
pub struct TestProxy {
    addr: SocketAddr,
    handle: tokio::task::JoinHandle<()>,
}

impl TestProxy {
    pub fn url(&self) -> String {
        format!("http://{}", self.addr)
    }
}

impl Drop for TestProxy {
    fn drop(&mut self) {
        self.handle.abort();
    }
}

/// Create a test HTTP client
pub fn test_client() -> Client {
    Client::builder()
        .timeout(Duration::from_secs(5))
        .build()
        .expect("Failed to create client")
}

/// Register a backend with the proxy and assert acceptance.
pub async fn register_backend(client: &Client, proxy_url: &str, backend_url: &str) {
    let response = client
        .post(format!("{proxy_url}/register"))
        .json(&json!({ "url": backend_url }))
        .send()
        .await
        .expect("register request failed");
    assert_eq!(response.status(), 200, "registration rejected");
}

/// Fetch and parse the stats document.
pub async fn fetch_stats(client: &Client, proxy_url: &str) -> Value {
    client
        .get(format!("{proxy_url}/stats"))
        .send()
        .await
        .expect("stats request failed")
        .json()
        .await
        .expect("stats body was not JSON")
}

/// Shortcut into the per-server section of the stats document.
#[allow(dead_code)]
pub fn server_stats<'a>(stats: &'a Value, backend_url: &str) -> &'a Value {
    &stats["servers"][backend_url]
}
