//! Binary log configuration.
//!
//! The configuration is deserialized from the node configuration file and
//! validated once at startup. All timing knobs are expressed in milliseconds
//! so they round-trip cleanly through serde.

use std::time::Duration;

use serde::Deserialize;

/// Default port of the log service.
pub const DEFAULT_PORT: u16 = 9092;
/// Default timeout for the initial connection attempt.
pub const DEFAULT_CONNECT_TIMEOUT_MS: u64 = 60_000;
/// Default interval between aggregate-watermark checks in position waits.
pub const DEFAULT_WAIT_POLL_INTERVAL_MS: u64 = 500;
/// Default grace period granted to the polling worker on shutdown.
pub const DEFAULT_SHUTDOWN_GRACE_MS: u64 = 2_000;

/// Configuration for a [`crate::log::BinaryLog`] instance.
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct BinaryLogConfig {
    /// Hosts of the log service, tried in order.
    #[serde(default = "default_hosts")]
    pub hosts: Vec<String>,

    /// Port of the log service.
    #[serde(default = "default_port")]
    pub port: u16,

    /// Optional deployment name, used as prefix for the stream names so that
    /// multiple engines can share one log service.
    #[serde(default)]
    pub name: Option<String>,

    #[serde(default = "default_connect_timeout_ms")]
    pub connect_timeout_ms: u64,

    #[serde(default = "default_wait_poll_interval_ms")]
    pub wait_poll_interval_ms: u64,

    #[serde(default = "default_shutdown_grace_ms")]
    pub shutdown_grace_ms: u64,
}

fn default_hosts() -> Vec<String> {
    vec!["localhost".to_string()]
}

fn default_port() -> u16 {
    DEFAULT_PORT
}

fn default_connect_timeout_ms() -> u64 {
    DEFAULT_CONNECT_TIMEOUT_MS
}

fn default_wait_poll_interval_ms() -> u64 {
    DEFAULT_WAIT_POLL_INTERVAL_MS
}

fn default_shutdown_grace_ms() -> u64 {
    DEFAULT_SHUTDOWN_GRACE_MS
}

impl Default for BinaryLogConfig {
    fn default() -> Self {
        BinaryLogConfig {
            hosts: default_hosts(),
            port: DEFAULT_PORT,
            name: None,
            connect_timeout_ms: DEFAULT_CONNECT_TIMEOUT_MS,
            wait_poll_interval_ms: DEFAULT_WAIT_POLL_INTERVAL_MS,
            shutdown_grace_ms: DEFAULT_SHUTDOWN_GRACE_MS,
        }
    }
}

impl BinaryLogConfig {
    /// Check the configuration for values that cannot work at runtime.
    pub fn validate(&self) -> Result<(), String> {
        if self.hosts.is_empty() {
            return Err("hosts must not be empty".to_string());
        }
        if self.hosts.iter().any(|h| h.trim().is_empty()) {
            return Err("hosts must not contain blank entries".to_string());
        }
        if self.wait_poll_interval_ms == 0 {
            return Err("wait_poll_interval_ms must be greater than zero".to_string());
        }
        Ok(())
    }

    pub fn connect_timeout(&self) -> Duration {
        Duration::from_millis(self.connect_timeout_ms)
    }

    pub fn wait_poll_interval(&self) -> Duration {
        Duration::from_millis(self.wait_poll_interval_ms)
    }

    pub fn shutdown_grace(&self) -> Duration {
        Duration::from_millis(self.shutdown_grace_ms)
    }
}
