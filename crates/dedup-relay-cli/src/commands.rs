//! Command handlers for the dedup-relay CLI

use std::net::SocketAddr;
use std::time::Duration;

use dedup_relay_runtime::{RelayRuntime, RunSummary};
use tokio::net::TcpListener;
use tracing::{info, warn};

use crate::cli::{Cli, Commands};
use crate::config::AppConfig;
use crate::emit::{default_targets, emit};
use crate::error::Result;
use crate::sink::run_sink;

/// Command dispatcher for handling CLI commands
pub struct CommandDispatcher;

impl CommandDispatcher {
    /// Execute a CLI command
    pub async fn execute(cli: Cli, config: AppConfig) -> Result<()> {
        match cli.command {
            Commands::Run { duration } => {
                let duration = duration
                    .map(Duration::from_secs)
                    .unwrap_or_else(|| config.run.duration());
                let summary = Self::handle_run_command(config, duration).await?;
                println!("{}", summary);
                Ok(())
            }
            Commands::Emit {
                count,
                interval_ms,
                targets,
            } => Self::handle_emit_command(targets, count, interval_ms).await,
            Commands::Sink { bind } => Self::handle_sink_command(bind).await,
        }
    }

    /// Run the pipeline until the duration elapses or Ctrl-C arrives
    pub async fn handle_run_command(config: AppConfig, duration: Duration) -> Result<RunSummary> {
        let runtime = RelayRuntime::new(config.relay)?;
        info!(
            forward_to = %runtime.config().forward.target,
            trigger = runtime.config().trigger_value,
            "Starting relay"
        );
        let handle = runtime.start().await;

        for (name, addr) in handle.listener_addrs() {
            info!("{} listening on {}", name, addr);
        }
        info!("Relay running for {}s", duration.as_secs());

        tokio::select! {
            _ = tokio::time::sleep(duration) => {}
            result = tokio::signal::ctrl_c() => match result {
                Ok(()) => info!("Interrupted, shutting down"),
                Err(e) => warn!("Failed to listen for Ctrl-C: {}", e),
            },
        }

        let summary = handle.shutdown().await;
        if summary.dispatch.is_failed() {
            warn!("Forwarding failed; triggered messages were not delivered");
        }
        Ok(summary)
    }

    async fn handle_emit_command(
        targets: Vec<SocketAddr>,
        count: u64,
        interval_ms: u64,
    ) -> Result<()> {
        let targets = if targets.is_empty() {
            default_targets()
        } else {
            targets
        };

        let sent = emit(&targets, count, Duration::from_millis(interval_ms)).await?;
        info!("Emitted {} datagrams to {} targets", sent, targets.len());
        Ok(())
    }

    async fn handle_sink_command(bind: SocketAddr) -> Result<()> {
        let listener = TcpListener::bind(bind).await?;
        run_sink(listener).await?;
        Ok(())
    }
}
