// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Bridge configuration.
//!
//! Everything the process wiring needs to assemble the transports, the
//! gateway and the scheduler: endpoint numbers for both directions,
//! timeouts, retry/reconnect bounds, worker sizing, cache locations and
//! the transport selector. JSON with per-field defaults; unknown fields
//! are rejected nowhere, absent fields fall back.

use crate::bp::{ReceiverOptions, SenderOptions};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

/// Which transport carries bundles.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "kebab-case")]
pub enum TransportKind {
    /// Raw AF_BP socket (requires the bp-socket kernel module).
    #[default]
    BpSocket,
    /// Shell out to the ION `bpsendfile`/`bprecvfile` utilities.
    IonCli,
}

/// Top-level configuration for the bridge core.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BridgeConfig {
    /// Local node number (this side of the DTN link).
    #[serde(default = "default_local_node")]
    pub local_node: u32,

    /// Local service bundles are sent from.
    #[serde(default = "default_send_service")]
    pub send_service: u32,

    /// Local service responses arrive on.
    #[serde(default = "default_receive_service")]
    pub receive_service: u32,

    /// Remote node number (the side with network access).
    #[serde(default = "default_remote_node")]
    pub remote_node: u32,

    /// Remote service requests are addressed to.
    #[serde(default = "default_remote_service")]
    pub remote_service: u32,

    /// Transport implementation to use.
    #[serde(default)]
    pub transport: TransportKind,

    /// Deadline for one proxied round trip, in seconds.
    #[serde(default = "default_gateway_deadline")]
    pub gateway_deadline_secs: u64,

    /// Kernel-level send timeout, in seconds.
    #[serde(default = "default_send_timeout")]
    pub send_timeout_secs: u64,

    /// Receive wakeup interval, in seconds.
    #[serde(default = "default_recv_timeout")]
    pub recv_timeout_secs: u64,

    /// Additional attempts for a failed bundle send.
    #[serde(default = "default_send_retries")]
    pub send_retry_attempts: u32,

    /// Backoff between send retries, in milliseconds.
    #[serde(default = "default_send_backoff")]
    pub send_retry_backoff_ms: u64,

    /// Consecutive receive errors before the socket is rebound.
    #[serde(default = "default_error_threshold")]
    pub receive_error_threshold: u32,

    /// Maximum rebind attempts before the receive loop gives up.
    #[serde(default = "default_rebind_attempts")]
    pub reconnect_attempts: u32,

    /// Backoff between rebind attempts, in milliseconds.
    #[serde(default = "default_rebind_backoff")]
    pub reconnect_backoff_ms: u64,

    /// Capacity of the received-bundle queue.
    #[serde(default = "default_queue_capacity")]
    pub queue_capacity: usize,

    /// Maximum bundle payload size in bytes.
    #[serde(default = "default_max_bundle_size")]
    pub max_bundle_size: usize,

    /// Worker threads draining the reservation queue.
    #[serde(default = "default_workers")]
    pub workers: usize,

    /// How long a worker's pop blocks, in seconds.
    #[serde(default = "default_pop_timeout")]
    pub pop_timeout_secs: u64,

    /// Default TTL for cached responses, in seconds.
    #[serde(default = "default_ttl")]
    pub default_ttl_secs: u64,

    /// Interval between expiry sweeps, in seconds.
    #[serde(default = "default_cleanup_interval")]
    pub cleanup_interval_secs: u64,

    /// Directory for cached response bodies and scratch files.
    #[serde(default = "default_cache_dir")]
    pub cache_dir: String,

    /// SQLite database path for the cache index.
    #[serde(default = "default_db_path")]
    pub db_path: String,

    /// `bpsendfile` executable (ion-cli transport).
    #[serde(default = "default_bpsendfile")]
    pub ion_send_program: String,

    /// `bprecvfile` executable (ion-cli transport).
    #[serde(default = "default_bprecvfile")]
    pub ion_recv_program: String,
}

fn default_local_node() -> u32 {
    149
}
fn default_send_service() -> u32 {
    1
}
fn default_receive_service() -> u32 {
    2
}
fn default_remote_node() -> u32 {
    150
}
fn default_remote_service() -> u32 {
    1
}
fn default_gateway_deadline() -> u64 {
    180
}
fn default_send_timeout() -> u64 {
    30
}
fn default_recv_timeout() -> u64 {
    1
}
fn default_send_retries() -> u32 {
    3
}
fn default_send_backoff() -> u64 {
    1000
}
fn default_error_threshold() -> u32 {
    3
}
fn default_rebind_attempts() -> u32 {
    3
}
fn default_rebind_backoff() -> u64 {
    2000
}
fn default_queue_capacity() -> usize {
    100
}
fn default_max_bundle_size() -> usize {
    4 * 1024 * 1024
}
fn default_workers() -> usize {
    5
}
fn default_pop_timeout() -> u64 {
    5
}
fn default_ttl() -> u64 {
    24 * 60 * 60
}
fn default_cleanup_interval() -> u64 {
    5 * 60
}
fn default_cache_dir() -> String {
    "./tmp/bp_cache".to_string()
}
fn default_db_path() -> String {
    "./tmp/bp_cache/index.db".to_string()
}
fn default_bpsendfile() -> String {
    "bpsendfile".to_string()
}
fn default_bprecvfile() -> String {
    "bprecvfile".to_string()
}

impl Default for BridgeConfig {
    fn default() -> Self {
        // Every field has a serde default; an empty object is the default config.
        serde_json::from_str("{}").expect("default config is valid")
    }
}

impl BridgeConfig {
    /// Load configuration from a JSON file.
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let content =
            std::fs::read_to_string(path).map_err(|e| ConfigError::Io(e.to_string()))?;
        let config: Self =
            serde_json::from_str(&content).map_err(|e| ConfigError::Parse(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Check invariants the rest of the system relies on.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.workers == 0 {
            return Err(ConfigError::InvalidValue("workers cannot be 0".into()));
        }
        if self.max_bundle_size == 0 {
            return Err(ConfigError::InvalidValue(
                "max_bundle_size cannot be 0".into(),
            ));
        }
        if self.queue_capacity == 0 {
            return Err(ConfigError::InvalidValue(
                "queue_capacity cannot be 0".into(),
            ));
        }
        if self.cache_dir.is_empty() {
            return Err(ConfigError::InvalidValue("cache_dir cannot be empty".into()));
        }
        if self.db_path.is_empty() {
            return Err(ConfigError::InvalidValue("db_path cannot be empty".into()));
        }
        if self.gateway_deadline_secs == 0 {
            return Err(ConfigError::InvalidValue(
                "gateway_deadline_secs cannot be 0".into(),
            ));
        }
        Ok(())
    }

    /// Local endpoint bundles are sent from.
    pub fn send_addr(&self) -> crate::bp::BpAddr {
        crate::bp::BpAddr::new(self.local_node, self.send_service)
    }

    /// Local endpoint responses arrive on.
    pub fn receive_addr(&self) -> crate::bp::BpAddr {
        crate::bp::BpAddr::new(self.local_node, self.receive_service)
    }

    /// Remote endpoint requests are addressed to.
    pub fn remote_addr(&self) -> crate::bp::BpAddr {
        crate::bp::BpAddr::new(self.remote_node, self.remote_service)
    }

    pub fn gateway_deadline(&self) -> Duration {
        Duration::from_secs(self.gateway_deadline_secs)
    }

    pub fn sender_options(&self) -> SenderOptions {
        SenderOptions {
            max_bundle_size: self.max_bundle_size,
            retry_attempts: self.send_retry_attempts,
            retry_backoff: Duration::from_millis(self.send_retry_backoff_ms),
            send_timeout: Duration::from_secs(self.send_timeout_secs),
        }
    }

    pub fn receiver_options(&self) -> ReceiverOptions {
        ReceiverOptions {
            max_bundle_size: self.max_bundle_size,
            queue_capacity: self.queue_capacity,
            error_threshold: self.receive_error_threshold,
            rebind_attempts: self.reconnect_attempts,
            rebind_backoff: Duration::from_millis(self.reconnect_backoff_ms),
            recv_timeout: Duration::from_secs(self.recv_timeout_secs),
        }
    }

    pub fn worker_options(&self) -> crate::scheduler::WorkerOptions {
        crate::scheduler::WorkerOptions {
            workers: self.workers,
            pop_timeout: Duration::from_secs(self.pop_timeout_secs),
            default_ttl: Duration::from_secs(self.default_ttl_secs),
            gateway_deadline: self.gateway_deadline(),
            cleanup_interval: Duration::from_secs(self.cleanup_interval_secs),
        }
    }
}

/// Configuration error types.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConfigError {
    Io(String),
    Parse(String),
    InvalidValue(String),
}

impl std::fmt::Display for ConfigError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Io(s) => write!(f, "I/O error: {}", s),
            Self::Parse(s) => write!(f, "parse error: {}", s),
            Self::InvalidValue(s) => write!(f, "invalid value: {}", s),
        }
    }
}

impl std::error::Error for ConfigError {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_validates() {
        let config = BridgeConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.workers, 5);
        assert_eq!(config.max_bundle_size, 4 * 1024 * 1024);
        assert_eq!(config.transport, TransportKind::BpSocket);
        assert_eq!(config.send_addr().to_string(), "ipn:149.1");
        assert_eq!(config.receive_addr().to_string(), "ipn:149.2");
        assert_eq!(config.remote_addr().to_string(), "ipn:150.1");
    }

    #[test]
    fn zero_workers_is_invalid() {
        let config = BridgeConfig {
            workers: 0,
            ..Default::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn transport_kind_uses_kebab_case() {
        let config: BridgeConfig =
            serde_json::from_str(r#"{"transport": "ion-cli"}"#).unwrap();
        assert_eq!(config.transport, TransportKind::IonCli);
    }

    #[test]
    fn from_file_roundtrip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("bridge.json");
        let mut config = BridgeConfig::default();
        config.workers = 3;
        config.remote_node = 222;
        std::fs::write(&path, serde_json::to_string_pretty(&config).unwrap()).unwrap();

        let loaded = BridgeConfig::from_file(&path).unwrap();
        assert_eq!(loaded.workers, 3);
        assert_eq!(loaded.remote_node, 222);
    }

    #[test]
    fn from_file_rejects_invalid_values() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("bad.json");
        std::fs::write(&path, r#"{"workers": 0}"#).unwrap();
        assert!(matches!(
            BridgeConfig::from_file(&path).unwrap_err(),
            ConfigError::InvalidValue(_)
        ));
    }

    #[test]
    fn options_are_derived_from_config() {
        let config = BridgeConfig::default();
        let sender = config.sender_options();
        assert_eq!(sender.max_bundle_size, config.max_bundle_size);
        let receiver = config.receiver_options();
        assert_eq!(receiver.queue_capacity, 100);
        let workers = config.worker_options();
        assert_eq!(workers.workers, 5);
        assert_eq!(workers.default_ttl, Duration::from_secs(86400));
    }
}
