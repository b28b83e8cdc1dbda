//! Configuration module for hivegate
//!
//! Handles loading and validation of the YAML configuration file. Every
//! field has a default so the proxy runs with no config file at all.

use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};
use std::path::Path;

#[derive(Debug, Clone, Deserialize, Serialize, Default)]
pub struct Config {
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub proxy: ProxyConfig,
    #[serde(default)]
    pub health: HealthProbeConfig,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ServerConfig {
    #[serde(default = "default_host")]
    pub host: String,
    #[serde(default = "default_port")]
    pub port: u16,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ProxyConfig {
    /// Two-tier weighting. When disabled both weight classes are pinned to 1
    /// and dispatch degenerates to plain round-robin.
    #[serde(default = "default_true")]
    pub weighted: bool,
    /// Latency budget a sample is compared against for slow-request demotion.
    #[serde(default = "default_expected_latency_ms")]
    pub expected_latency_ms: u64,
    /// Client-side deadline for upstream calls. 0 disables the deadline.
    #[serde(default = "default_upstream_timeout_ms")]
    pub upstream_timeout_ms: u64,
    /// How long an UNHEALTHY backend is excluded from selection.
    #[serde(default = "default_cooldown_ms")]
    pub cooldown_ms: u64,
    #[serde(default = "default_threshold")]
    pub request_error_threshold: u32,
    #[serde(default = "default_threshold")]
    pub healthcheck_error_threshold: u32,
    #[serde(default = "default_threshold")]
    pub slow_request_threshold: u32,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct HealthProbeConfig {
    #[serde(default = "default_probe_interval_ms")]
    pub interval_ms: u64,
    #[serde(default = "default_probe_timeout_ms")]
    pub timeout_ms: u64,
    #[serde(default = "default_probe_path")]
    pub path: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
        }
    }
}

impl Default for ProxyConfig {
    fn default() -> Self {
        Self {
            weighted: true,
            expected_latency_ms: default_expected_latency_ms(),
            upstream_timeout_ms: default_upstream_timeout_ms(),
            cooldown_ms: default_cooldown_ms(),
            request_error_threshold: default_threshold(),
            healthcheck_error_threshold: default_threshold(),
            slow_request_threshold: default_threshold(),
        }
    }
}

impl Default for HealthProbeConfig {
    fn default() -> Self {
        Self {
            interval_ms: default_probe_interval_ms(),
            timeout_ms: default_probe_timeout_ms(),
            path: default_probe_path(),
        }
    }
}

fn default_host() -> String {
    "0.0.0.0".to_string()
}

fn default_port() -> u16 {
    8888
}

fn default_true() -> bool {
    true
}

fn default_expected_latency_ms() -> u64 {
    100
}

fn default_upstream_timeout_ms() -> u64 {
    10_000
}

fn default_cooldown_ms() -> u64 {
    30_000
}

fn default_threshold() -> u32 {
    2
}

fn default_probe_interval_ms() -> u64 {
    5_000
}

fn default_probe_timeout_ms() -> u64 {
    5_000
}

fn default_probe_path() -> String {
    "/healthcheck".to_string()
}

impl Config {
    /// Load configuration from a YAML file.
    pub fn from_file(path: &Path) -> Result<Self> {
        let contents = std::fs::read_to_string(path)?;
        let config: Config = serde_yaml::from_str(&contents)?;
        Ok(config)
    }

    /// Validate a configuration file without starting the proxy.
    pub fn validate_file(path: &Path) -> Result<Self> {
        let config = Self::from_file(path)?;
        config.validate()?;
        Ok(config)
    }

    /// Check invariants the rest of the system relies on.
    pub fn validate(&self) -> Result<()> {
        if self.proxy.expected_latency_ms == 0 {
            return Err(Error::Config(
                "proxy.expected_latency_ms must be positive".into(),
            ));
        }
        if self.proxy.cooldown_ms == 0 {
            return Err(Error::Config("proxy.cooldown_ms must be positive".into()));
        }
        if self.proxy.request_error_threshold == 0
            || self.proxy.healthcheck_error_threshold == 0
            || self.proxy.slow_request_threshold == 0
        {
            return Err(Error::Config("thresholds must be at least 1".into()));
        }
        if self.health.interval_ms == 0 {
            return Err(Error::Config("health.interval_ms must be positive".into()));
        }
        if !self.health.path.starts_with('/') {
            return Err(Error::Config(format!(
                "health.path must start with '/': {}",
                self.health.path
            )));
        }
        Ok(())
    }
}
