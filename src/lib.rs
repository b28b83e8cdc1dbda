//! Hivegate Library
//!
//! Core functionality for the self-registering reverse proxy: backends
//! announce themselves at startup, traffic is dispatched with a weighted
//! round-robin over the healthy set, a periodic probe demotes and revives
//! instances, and aggregate statistics are exposed over HTTP.

pub mod config;
pub mod error;
pub mod health;
pub mod latency;
pub mod metrics;
pub mod proxy;
pub mod registry;
pub mod routing;
pub mod stats;

pub use config::Config;
pub use error::{Error, Result};
pub use proxy::ProxyServer;
