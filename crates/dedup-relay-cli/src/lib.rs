//! Dedup Relay CLI library
//!
//! Argument parsing, configuration loading and command handlers for the
//! `dedup-relay` binary, plus the test generator and sink used to exercise a
//! running relay.

pub mod cli;
pub mod commands;
pub mod config;
pub mod emit;
pub mod error;
pub mod sink;

pub use cli::{Cli, Commands};
pub use commands::CommandDispatcher;
pub use config::{AppConfig, RunConfig};
pub use error::{CliError, Result};
