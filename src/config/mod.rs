//! Configuration management for flowline
//!
//! Server binding, database location, and engine tuning. Every value can be
//! overridden with an environment variable for container deployment.

use crate::runtime::step::RetryPolicy;
use serde::{Deserialize, Serialize};
use std::{str::FromStr, time::Duration};

/// Main application configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    pub server: ServerConfig,
    pub database: DatabaseConfig,
    pub engine: EngineConfig,
}

/// HTTP server configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    /// Bind address (e.g., "0.0.0.0")
    pub host: String,
    pub port: u16,
}

/// Database configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatabaseConfig {
    /// Directory holding `flowline.db` (workflows and step checkpoints)
    pub data_dir: String,
}

/// Execution engine tuning
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EngineConfig {
    /// Per-request timeout for HTTP nodes
    pub http_timeout_secs: u64,
    /// Classify HTTP timeouts, connection failures and 5xx responses as retriable
    pub retry_transient_http: bool,
    /// Attempts per step (including the first) for retriable failures
    pub max_step_attempts: u32,
    /// Back-off before the second attempt; doubles afterwards
    pub retry_base_delay_ms: u64,
    /// Backlog per status channel
    pub status_channel_capacity: usize,
    /// Number of recent runs whose node statuses stay pollable
    pub status_retained_runs: usize,
}

impl EngineConfig {
    pub fn http_timeout(&self) -> Duration {
        Duration::from_secs(self.http_timeout_secs)
    }

    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy {
            max_attempts: self.max_step_attempts.max(1),
            base_delay: Duration::from_millis(self.retry_base_delay_ms),
        }
    }
}

/// Read an env var, falling back to `default` when unset or unparseable
fn env_or<T: FromStr>(key: &str, default: T) -> T {
    std::env::var(key)
        .ok()
        .and_then(|value| value.trim().parse().ok())
        .unwrap_or(default)
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            http_timeout_secs: env_or("FLOWLINE_HTTP_TIMEOUT_SECS", 30),
            retry_transient_http: env_or("FLOWLINE_HTTP_RETRY_TRANSIENT", false),
            max_step_attempts: env_or("FLOWLINE_MAX_STEP_ATTEMPTS", 3),
            retry_base_delay_ms: env_or("FLOWLINE_RETRY_BASE_DELAY_MS", 200),
            status_channel_capacity: env_or("FLOWLINE_STATUS_CAPACITY", 256),
            status_retained_runs: env_or("FLOWLINE_STATUS_RETAINED_RUNS", 1024),
        }
    }
}

impl Default for Config {
    /// Default configuration with ENV_VAR support for k8s/container deployment
    fn default() -> Self {
        Self {
            server: ServerConfig {
                host: env_or("FLOWLINE_HOST", "0.0.0.0".to_string()),
                port: env_or("FLOWLINE_PORT", 3004),
            },
            database: DatabaseConfig {
                data_dir: env_or("FLOWLINE_DATA_DIR", "data".to_string()),
            },
            engine: EngineConfig::default(),
        }
    }
}
