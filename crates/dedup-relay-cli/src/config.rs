//! Dedup Relay CLI Configuration
//!
//! Configuration is read from a single TOML file when `--config` is given and
//! falls back to defaults otherwise. Every section and field is optional:
//!
//! ```toml
//! [relay]
//! trigger_value = 10
//!
//! [[relay.listeners]]
//! name = "receiver-1"
//! bind = "0.0.0.0:5000"
//!
//! [relay.forward]
//! target = "127.0.0.1:6000"
//!
//! [run]
//! duration_secs = 10
//! ```

use std::path::Path;
use std::time::Duration;

use dedup_relay_core::RelayConfig;
use serde::{Deserialize, Serialize};

use crate::error::{CliError, Result};

// ----------------------------------------------------------------------------
// Application Configuration
// ----------------------------------------------------------------------------

/// Complete configuration for the `dedup-relay` binary
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    /// Pipeline configuration
    pub relay: RelayConfig,

    /// Run behaviour of the `run` command
    pub run: RunConfig,
}

/// How long the `run` command keeps the pipeline up
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RunConfig {
    pub duration_secs: u64,
}

impl Default for RunConfig {
    fn default() -> Self {
        Self { duration_secs: 10 }
    }
}

impl RunConfig {
    pub fn duration(&self) -> Duration {
        Duration::from_secs(self.duration_secs)
    }
}

impl AppConfig {
    /// Load and validate configuration from a TOML file
    pub fn load_from_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let contents = std::fs::read_to_string(path).map_err(|e| {
            CliError::Config(format!("Failed to read {}: {}", path.display(), e))
        })?;
        Self::from_toml(&contents)
    }

    /// Parse and validate configuration from TOML text
    pub fn from_toml(contents: &str) -> Result<Self> {
        let config: Self = toml::from_str(contents)?;
        config.relay.validate()?;
        Ok(config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use dedup_relay_core::HashStrategy;

    #[test]
    fn test_empty_file_uses_defaults() {
        let config = AppConfig::from_toml("").unwrap();
        assert_eq!(config, AppConfig::default());
        assert_eq!(config.run.duration(), Duration::from_secs(10));
    }

    #[test]
    fn test_partial_overrides() {
        let config = AppConfig::from_toml(
            r#"
            [relay]
            trigger_value = 42

            [[relay.listeners]]
            name = "only"
            bind = "127.0.0.1:7000"

            [relay.forward]
            target = "127.0.0.1:7100"
            connect_attempts = 3

            [relay.store]
            hash = "identity"

            [run]
            duration_secs = 2
            "#,
        )
        .unwrap();

        assert_eq!(config.relay.trigger_value, 42);
        assert_eq!(config.relay.listeners.len(), 1);
        assert_eq!(config.relay.listeners[0].name, "only");
        assert_eq!(config.relay.forward.target.port(), 7100);
        assert_eq!(config.relay.forward.connect_attempts, 3);
        assert_eq!(config.relay.forward.retry_delay_ms, 100);
        assert_eq!(config.relay.store.hash, HashStrategy::Identity);
        assert_eq!(config.relay.pool.workers, 2);
        assert_eq!(config.run.duration_secs, 2);
    }

    #[test]
    fn test_invalid_values_rejected() {
        let result = AppConfig::from_toml("[relay.pool]\nworkers = 0\n");
        assert!(matches!(result, Err(CliError::Config(_))));

        let result = AppConfig::from_toml("[relay.forward]\ntarget = \"not an address\"\n");
        assert!(matches!(result, Err(CliError::TomlParsing(_))));
    }

    #[test]
    fn test_load_from_file() {
        let path = std::env::temp_dir().join(format!("dedup-relay-{}.toml", std::process::id()));
        std::fs::write(&path, "[run]\nduration_secs = 5\n").unwrap();

        let config = AppConfig::load_from_file(&path).unwrap();
        std::fs::remove_file(&path).unwrap();
        assert_eq!(config.run.duration_secs, 5);

        assert!(matches!(
            AppConfig::load_from_file(&path),
            Err(CliError::Config(_))
        ));
    }
}
