//! Error handling for the dedup-relay CLI

use thiserror::Error;

/// CLI-specific error types
#[derive(Error, Debug)]
pub enum CliError {
    #[error("Relay error: {0}")]
    Relay(#[from] dedup_relay_core::RelayError),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Invalid frame: {0}")]
    Frame(#[from] dedup_relay_core::FrameError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("TOML parsing error: {0}")]
    TomlParsing(#[from] toml::de::Error),
}

/// Result type for CLI operations
pub type Result<T> = std::result::Result<T, CliError>;

impl From<dedup_relay_core::ConfigError> for CliError {
    fn from(err: dedup_relay_core::ConfigError) -> Self {
        CliError::Config(err.to_string())
    }
}
