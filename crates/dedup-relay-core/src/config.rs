//! Centralized Configuration Management
//!
//! All tunables of the relay pipeline live here so the CLI can load them from
//! one TOML document. Durations are stored as milliseconds.

use std::collections::HashSet;
use std::net::{Ipv4Addr, SocketAddr, SocketAddrV4};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::errors::ConfigError;
use crate::store::{HashStrategy, DEFAULT_STORE_CAPACITY};

/// `data` value that marks a message for forwarding
pub const DEFAULT_TRIGGER_VALUE: u64 = 10;

// ----------------------------------------------------------------------------
// Listener Configuration
// ----------------------------------------------------------------------------

/// One datagram ingest endpoint
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ListenerConfig {
    /// Stage name used in logs and reports
    pub name: String,
    /// Local address to bind
    pub bind: SocketAddr,
}

impl ListenerConfig {
    pub fn new(name: impl Into<String>, bind: SocketAddr) -> Self {
        Self {
            name: name.into(),
            bind,
        }
    }
}

fn default_listeners() -> Vec<ListenerConfig> {
    [5000, 5001]
        .into_iter()
        .enumerate()
        .map(|(i, port)| {
            ListenerConfig::new(
                format!("receiver-{}", i + 1),
                SocketAddr::V4(SocketAddrV4::new(Ipv4Addr::UNSPECIFIED, port)),
            )
        })
        .collect()
}

// ----------------------------------------------------------------------------
// Forwarding Configuration
// ----------------------------------------------------------------------------

/// Outbound stream connection settings
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ForwardConfig {
    /// Address of the downstream acceptor
    pub target: SocketAddr,
    /// Total connect attempts before giving up
    pub connect_attempts: u32,
    /// Upper bound on a single connect attempt
    pub connect_timeout_ms: u64,
    /// Pause between failed attempts
    pub retry_delay_ms: u64,
}

impl Default for ForwardConfig {
    fn default() -> Self {
        Self {
            target: SocketAddr::V4(SocketAddrV4::new(Ipv4Addr::LOCALHOST, 6000)),
            connect_attempts: 5,
            connect_timeout_ms: 100,
            retry_delay_ms: 100,
        }
    }
}

impl ForwardConfig {
    pub fn connect_timeout(&self) -> Duration {
        Duration::from_millis(self.connect_timeout_ms)
    }

    pub fn retry_delay(&self) -> Duration {
        Duration::from_millis(self.retry_delay_ms)
    }
}

// ----------------------------------------------------------------------------
// Pool Configuration
// ----------------------------------------------------------------------------

/// Send worker pool settings
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PoolConfig {
    /// Number of concurrent send workers
    pub workers: usize,
    /// How long a worker waits for writability after a would-block
    pub writable_wait_ms: u64,
}

impl Default for PoolConfig {
    fn default() -> Self {
        Self {
            workers: 2,
            writable_wait_ms: 10,
        }
    }
}

impl PoolConfig {
    pub fn writable_wait(&self) -> Duration {
        Duration::from_millis(self.writable_wait_ms)
    }
}

// ----------------------------------------------------------------------------
// Store Configuration
// ----------------------------------------------------------------------------

/// Deduplicating store settings
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct StoreConfig {
    /// Initial bucket count
    pub initial_capacity: usize,
    /// Bucket hashing
    pub hash: HashStrategy,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            initial_capacity: DEFAULT_STORE_CAPACITY,
            hash: HashStrategy::default(),
        }
    }
}

// ----------------------------------------------------------------------------
// Relay Configuration
// ----------------------------------------------------------------------------

/// Complete pipeline configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RelayConfig {
    pub listeners: Vec<ListenerConfig>,
    pub forward: ForwardConfig,
    pub pool: PoolConfig,
    pub store: StoreConfig,
    /// Messages whose `data` equals this value are forwarded
    pub trigger_value: u64,
}

impl Default for RelayConfig {
    fn default() -> Self {
        Self {
            listeners: default_listeners(),
            forward: ForwardConfig::default(),
            pool: PoolConfig::default(),
            store: StoreConfig::default(),
            trigger_value: DEFAULT_TRIGGER_VALUE,
        }
    }
}

impl RelayConfig {
    /// Configuration for loopback tests: ephemeral listener ports and fast retries
    pub fn loopback(listener_count: usize, target: SocketAddr) -> Self {
        let listeners = (0..listener_count)
            .map(|i| {
                ListenerConfig::new(
                    format!("receiver-{}", i + 1),
                    SocketAddr::V4(SocketAddrV4::new(Ipv4Addr::LOCALHOST, 0)),
                )
            })
            .collect();

        Self {
            listeners,
            forward: ForwardConfig {
                target,
                connect_attempts: 5,
                connect_timeout_ms: 100,
                retry_delay_ms: 10,
            },
            ..Self::default()
        }
    }

    /// Check the configuration for values the pipeline cannot run with
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.listeners.is_empty() {
            return Err(ConfigError::NoListeners);
        }

        let mut seen = HashSet::new();
        for listener in &self.listeners {
            // Port 0 asks the OS for a fresh port, so repeats are fine
            if listener.bind.port() != 0 && !seen.insert(listener.bind) {
                return Err(ConfigError::DuplicateListener(listener.bind));
            }
        }

        if self.pool.workers == 0 {
            return Err(ConfigError::NoWorkers);
        }
        if self.forward.connect_attempts == 0 {
            return Err(ConfigError::NoConnectAttempts);
        }
        if self.store.initial_capacity == 0 {
            return Err(ConfigError::InvalidCapacity(self.store.initial_capacity));
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_match_reference_deployment() {
        let config = RelayConfig::default();

        assert_eq!(config.listeners.len(), 2);
        assert_eq!(config.listeners[0].bind.port(), 5000);
        assert_eq!(config.listeners[1].bind.port(), 5001);
        assert_eq!(config.forward.target.port(), 6000);
        assert_eq!(config.forward.connect_attempts, 5);
        assert_eq!(config.forward.connect_timeout(), Duration::from_millis(100));
        assert_eq!(config.pool.workers, 2);
        assert_eq!(config.trigger_value, 10);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_validation_errors() {
        let mut config = RelayConfig::default();
        config.listeners.clear();
        assert_eq!(config.validate(), Err(ConfigError::NoListeners));

        let mut config = RelayConfig::default();
        config.listeners[1].bind = config.listeners[0].bind;
        assert!(matches!(
            config.validate(),
            Err(ConfigError::DuplicateListener(_))
        ));

        let mut config = RelayConfig::default();
        config.pool.workers = 0;
        assert_eq!(config.validate(), Err(ConfigError::NoWorkers));

        let mut config = RelayConfig::default();
        config.forward.connect_attempts = 0;
        assert_eq!(config.validate(), Err(ConfigError::NoConnectAttempts));
    }

    #[test]
    fn test_loopback_allows_repeated_ephemeral_ports() {
        let config = RelayConfig::loopback(2, "127.0.0.1:6000".parse().unwrap());
        assert_eq!(config.listeners.len(), 2);
        assert!(config.listeners.iter().all(|l| l.bind.port() == 0));
        assert!(config.validate().is_ok());
    }
}
