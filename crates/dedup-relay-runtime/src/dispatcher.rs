//! Forwarding Dispatcher
//!
//! Owns the outbound connection, pops messages from the handoff queue in FIFO
//! order and hands each one, with a freshly duplicated handle, to the send
//! pool. The dispatcher never writes to the network itself.
//!
//! The loop runs until the queue is closed and empty, so everything queued
//! before shutdown is handed to a worker. If the connection cannot be
//! established the dispatcher returns without touching the queue.

use std::sync::Arc;

use dedup_relay_core::{ForwardConfig, HandoffQueue, RelayResult};
use tokio::net::TcpStream;
use tracing::{debug, error, info, warn};

use crate::connection::OutboundConnection;
use crate::pool::{SendPool, SendTask};

/// Totals reported when the dispatcher stops
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DispatchReport {
    /// Messages handed to the send pool
    pub dispatched: u64,
    /// Messages dropped because the connection handle could not be duplicated.
    /// They are not re-queued; the dispatcher moves on to the next message.
    pub handle_failures: u64,
    /// Messages the pool refused because it was already shut down
    pub rejected: u64,
}

pub struct Dispatcher {
    config: ForwardConfig,
    queue: Arc<HandoffQueue>,
    pool: Arc<SendPool<TcpStream>>,
}

impl Dispatcher {
    pub fn new(
        config: ForwardConfig,
        queue: Arc<HandoffQueue>,
        pool: Arc<SendPool<TcpStream>>,
    ) -> Self {
        Self {
            config,
            queue,
            pool,
        }
    }

    /// Connect, then forward until the queue is closed and drained
    pub async fn run(self) -> RelayResult<DispatchReport> {
        info!(peer = %self.config.target, "Dispatcher starting");

        let connection = OutboundConnection::connect(&self.config).await?;
        let report = self.forward(&connection).await;

        info!(
            dispatched = report.dispatched,
            handle_failures = report.handle_failures,
            rejected = report.rejected,
            "Dispatcher stopped"
        );
        Ok(report)
    }

    /// Drain the queue onto the pool over an established connection
    pub async fn forward(&self, connection: &OutboundConnection) -> DispatchReport {
        let mut report = DispatchReport::default();

        while let Some(message) = self.queue.pop().await {
            let handle = match connection.duplicate() {
                Ok(handle) => handle,
                Err(e) => {
                    report.handle_failures += 1;
                    error!(id = message.id, "Failed to duplicate connection handle: {}", e);
                    continue;
                }
            };

            match self.pool.submit(SendTask::new(message, handle)) {
                Ok(()) => {
                    report.dispatched += 1;
                    debug!(id = message.id, "Handed message to send pool");
                }
                Err(e) => {
                    report.rejected += 1;
                    warn!(id = message.id, "{}", e);
                }
            }
        }

        report
    }
}
