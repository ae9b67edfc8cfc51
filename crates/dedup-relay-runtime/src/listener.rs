//! Listener Stage
//!
//! One stage per configured datagram endpoint. Each stage receives frames,
//! decodes them, offers them to the shared [`DedupStore`] and queues first-seen
//! trigger messages for forwarding. Stages share nothing but the store and the
//! handoff queue.
//!
//! The receive is raced against the shutdown token instead of polling, so a
//! stage notices shutdown as soon as it is signalled.

use std::net::SocketAddr;
use std::sync::Arc;

use dedup_relay_core::{
    Admission, DedupStore, HandoffQueue, ListenerConfig, Message, QueueError, RelayError,
    RelayResult,
};
use tokio::net::UdpSocket;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

/// Receive buffer size; anything larger than a frame is reported as malformed
const MAX_DATAGRAM: usize = 512;

// ----------------------------------------------------------------------------
// Shared State
// ----------------------------------------------------------------------------

/// Handles every listener stage receives
#[derive(Debug, Clone)]
pub struct IngestContext {
    pub store: Arc<DedupStore>,
    pub queue: Arc<HandoffQueue>,
    pub shutdown: CancellationToken,
    /// `data` value that selects a message for forwarding
    pub trigger_value: u64,
}

// ----------------------------------------------------------------------------
// Listener Report
// ----------------------------------------------------------------------------

/// Per-stage counters, returned when the stage stops
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ListenerReport {
    pub name: String,
    /// Datagrams read from the socket, malformed ones included
    pub received: u64,
    /// Messages whose id this stage saw first
    pub unique: u64,
    pub duplicates: u64,
    pub malformed: u64,
    /// Trigger messages pushed onto the handoff queue
    pub forwarded: u64,
}

// ----------------------------------------------------------------------------
// Listener Stage
// ----------------------------------------------------------------------------

pub struct ListenerStage {
    socket: UdpSocket,
    context: IngestContext,
    report: ListenerReport,
}

impl ListenerStage {
    /// Bind the stage's endpoint. A failure here is fatal to this stage only.
    pub async fn bind(config: &ListenerConfig, context: IngestContext) -> RelayResult<Self> {
        let socket = UdpSocket::bind(config.bind)
            .await
            .map_err(|source| RelayError::Bind {
                stage: config.name.clone(),
                addr: config.bind,
                source,
            })?;

        Ok(Self {
            socket,
            context,
            report: ListenerReport {
                name: config.name.clone(),
                ..ListenerReport::default()
            },
        })
    }

    pub fn name(&self) -> &str {
        &self.report.name
    }

    pub fn local_addr(&self) -> std::io::Result<SocketAddr> {
        self.socket.local_addr()
    }

    /// Receive until shutdown. The socket is closed when the stage returns.
    pub async fn run(mut self) -> RelayResult<ListenerReport> {
        if let Ok(addr) = self.local_addr() {
            info!(stage = %self.report.name, %addr, "Listener started");
        }

        let mut buf = [0u8; MAX_DATAGRAM];
        loop {
            let (len, peer) = tokio::select! {
                biased;

                _ = self.context.shutdown.cancelled() => break,

                result = self.socket.recv_from(&mut buf) => match result {
                    Ok(received) => received,
                    Err(e) if RelayError::is_transient(&e) => {
                        debug!(stage = %self.report.name, "Transient receive error: {}", e);
                        continue;
                    }
                    Err(source) => {
                        let err = RelayError::Receive {
                            stage: self.report.name.clone(),
                            source,
                        };
                        error!("{}", err);
                        return Err(err);
                    }
                },
            };

            self.handle_datagram(&buf[..len], peer);
        }

        info!(
            stage = %self.report.name,
            received = self.report.received,
            unique = self.report.unique,
            duplicates = self.report.duplicates,
            malformed = self.report.malformed,
            forwarded = self.report.forwarded,
            "Listener stopped"
        );
        Ok(self.report)
    }

    fn handle_datagram(&mut self, bytes: &[u8], peer: SocketAddr) {
        self.report.received += 1;

        let message = match Message::decode(bytes) {
            Ok(message) => message,
            Err(e) => {
                self.report.malformed += 1;
                warn!(stage = %self.report.name, %peer, "{}", e);
                return;
            }
        };

        let trigger_value = self.context.trigger_value;
        let queue = &self.context.queue;
        let mut queued: Option<Result<(), QueueError>> = None;

        let admission = self.context.store.admit(message, |first| {
            if first.data == trigger_value {
                queued = Some(queue.push(*first));
            }
        });

        let name = &self.report.name;
        match admission {
            Admission::New => {
                self.report.unique += 1;
                info!("{} received: {}", name, message);

                match queued {
                    Some(Ok(())) => {
                        self.report.forwarded += 1;
                        debug!(stage = %name, id = message.id, "Queued for forwarding");
                    }
                    Some(Err(e)) => warn!(stage = %name, "{}", e),
                    None => {}
                }
            }
            Admission::Duplicate => {
                self.report.duplicates += 1;
                info!("{} skipped duplicate ID={}", name, message.id);
            }
        }
    }
}
