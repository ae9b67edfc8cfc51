//! Relay Runtime
//!
//! Wires the pipeline together and owns its lifecycle:
//!
//! 1. Create the shared store, handoff queue, send pool and shutdown token
//! 2. Bind every listener stage; a stage that cannot bind is recorded and
//!    skipped while its siblings run
//! 3. Spawn the listeners and the dispatcher
//!
//! Shutdown runs in a fixed order so that nothing a listener queued is lost
//! before the dispatcher has seen it: cancel, join listeners, close the queue,
//! join the dispatcher, drain the pool, then discard whatever is left.

use std::fmt;
use std::net::SocketAddr;
use std::sync::Arc;

use dedup_relay_core::{DedupStore, HandoffQueue, RelayConfig, RelayError, RelayResult};
use futures::future::join_all;
use tokio::net::TcpStream;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

use crate::dispatcher::{DispatchReport, Dispatcher};
use crate::listener::{IngestContext, ListenerReport, ListenerStage};
use crate::pool::{PoolReport, SendPool};

// ----------------------------------------------------------------------------
// Run Summary
// ----------------------------------------------------------------------------

/// How a listener stage ended
#[derive(Debug)]
pub enum ListenerOutcome {
    Stopped(ListenerReport),
    Failed { name: String, error: RelayError },
}

impl ListenerOutcome {
    pub fn name(&self) -> &str {
        match self {
            Self::Stopped(report) => &report.name,
            Self::Failed { name, .. } => name,
        }
    }

    pub fn report(&self) -> Option<&ListenerReport> {
        match self {
            Self::Stopped(report) => Some(report),
            Self::Failed { .. } => None,
        }
    }
}

/// How the dispatcher ended
#[derive(Debug)]
pub enum DispatchOutcome {
    Completed(DispatchReport),
    Failed(RelayError),
}

impl DispatchOutcome {
    pub fn is_failed(&self) -> bool {
        matches!(self, Self::Failed(_))
    }
}

/// Everything the pipeline reports once it has fully stopped
#[derive(Debug)]
pub struct RunSummary {
    /// Distinct message ids admitted by the store
    pub unique_messages: usize,
    pub listeners: Vec<ListenerOutcome>,
    pub dispatch: DispatchOutcome,
    pub pool: PoolReport,
    /// Messages left in the handoff queue that were never dispatched
    pub abandoned: usize,
}

impl fmt::Display for RunSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "Total unique messages: {}", self.unique_messages)?;
        for outcome in &self.listeners {
            match outcome {
                ListenerOutcome::Stopped(r) => writeln!(
                    f,
                    "  {}: received={} unique={} duplicates={} malformed={} forwarded={}",
                    r.name, r.received, r.unique, r.duplicates, r.malformed, r.forwarded
                )?,
                ListenerOutcome::Failed { name, error } => {
                    writeln!(f, "  {}: failed ({})", name, error)?
                }
            }
        }
        match &self.dispatch {
            DispatchOutcome::Completed(r) => writeln!(
                f,
                "  dispatcher: dispatched={} handle_failures={} rejected={}",
                r.dispatched, r.handle_failures, r.rejected
            )?,
            DispatchOutcome::Failed(e) => writeln!(f, "  dispatcher: failed ({})", e)?,
        }
        write!(
            f,
            "  send pool: sent={} failed={} discarded={} abandoned={}",
            self.pool.sent, self.pool.failed, self.pool.discarded, self.abandoned
        )
    }
}

// ----------------------------------------------------------------------------
// Relay Runtime
// ----------------------------------------------------------------------------

/// Validated pipeline configuration, ready to start
pub struct RelayRuntime {
    config: RelayConfig,
}

impl RelayRuntime {
    pub fn new(config: RelayConfig) -> RelayResult<Self> {
        config.validate()?;
        Ok(Self { config })
    }

    pub fn config(&self) -> &RelayConfig {
        &self.config
    }

    /// Bind listeners and spawn every task. Must be called from within a
    /// Tokio runtime.
    pub async fn start(self) -> RuntimeHandle {
        let config = self.config;
        let store = Arc::new(DedupStore::new(
            config.store.initial_capacity,
            config.store.hash,
        ));
        let queue = Arc::new(HandoffQueue::new());
        let shutdown = CancellationToken::new();
        let pool = Arc::new(SendPool::<TcpStream>::new(
            config.pool.workers,
            config.pool.writable_wait(),
        ));

        let context = IngestContext {
            store: Arc::clone(&store),
            queue: Arc::clone(&queue),
            shutdown: shutdown.clone(),
            trigger_value: config.trigger_value,
        };

        let mut listeners = Vec::with_capacity(config.listeners.len());
        let mut failed = Vec::new();
        let mut listener_addrs = Vec::new();

        for listener in &config.listeners {
            match ListenerStage::bind(listener, context.clone()).await {
                Ok(stage) => {
                    match stage.local_addr() {
                        Ok(addr) => listener_addrs.push((listener.name.clone(), addr)),
                        Err(e) => warn!(stage = %listener.name, "Unknown local address: {}", e),
                    }
                    listeners.push((listener.name.clone(), tokio::spawn(stage.run())));
                }
                Err(error) => {
                    error!("{}", error);
                    failed.push(ListenerOutcome::Failed {
                        name: listener.name.clone(),
                        error,
                    });
                }
            }
        }

        let dispatcher = Dispatcher::new(
            config.forward.clone(),
            Arc::clone(&queue),
            Arc::clone(&pool),
        );
        let dispatcher = tokio::spawn(dispatcher.run());

        info!(
            listeners = listeners.len(),
            failed = failed.len(),
            workers = config.pool.workers,
            "Relay pipeline started"
        );

        RuntimeHandle {
            store,
            queue,
            pool,
            shutdown,
            listeners,
            failed,
            listener_addrs,
            dispatcher,
        }
    }
}

// ----------------------------------------------------------------------------
// Runtime Handle
// ----------------------------------------------------------------------------

type StageHandle<T> = JoinHandle<RelayResult<T>>;

/// Handle to a running pipeline
pub struct RuntimeHandle {
    store: Arc<DedupStore>,
    queue: Arc<HandoffQueue>,
    pool: Arc<SendPool<TcpStream>>,
    shutdown: CancellationToken,
    listeners: Vec<(String, StageHandle<ListenerReport>)>,
    failed: Vec<ListenerOutcome>,
    listener_addrs: Vec<(String, SocketAddr)>,
    dispatcher: StageHandle<DispatchReport>,
}

impl RuntimeHandle {
    /// Bound address of every listener that started, by stage name
    pub fn listener_addrs(&self) -> &[(String, SocketAddr)] {
        &self.listener_addrs
    }

    pub fn store(&self) -> &Arc<DedupStore> {
        &self.store
    }

    pub fn queue(&self) -> &Arc<HandoffQueue> {
        &self.queue
    }

    pub fn is_dispatcher_finished(&self) -> bool {
        self.dispatcher.is_finished()
    }

    /// Stop the pipeline and collect every stage's report
    pub async fn shutdown(self) -> RunSummary {
        info!("Shutting down relay pipeline");
        self.shutdown.cancel();

        let (names, handles): (Vec<_>, Vec<_>) = self.listeners.into_iter().unzip();
        let mut listeners = self.failed;
        for (name, joined) in names.into_iter().zip(join_all(handles).await) {
            listeners.push(match joined {
                Ok(Ok(report)) => ListenerOutcome::Stopped(report),
                Ok(Err(error)) => ListenerOutcome::Failed { name, error },
                Err(e) => ListenerOutcome::Failed {
                    name,
                    error: RelayError::Task(e.to_string()),
                },
            });
        }

        // No listener can push any more, so the dispatcher drains and stops
        self.queue.close();

        let dispatch = match self.dispatcher.await {
            Ok(Ok(report)) => DispatchOutcome::Completed(report),
            Ok(Err(error)) => DispatchOutcome::Failed(error),
            Err(e) => DispatchOutcome::Failed(RelayError::Task(e.to_string())),
        };

        let pool = self.pool.shutdown().await;

        let abandoned = self.queue.discard_remaining();
        if abandoned > 0 {
            warn!(abandoned, "Discarded messages that were never dispatched");
        }

        let summary = RunSummary {
            unique_messages: self.store.len(),
            listeners,
            dispatch,
            pool,
            abandoned,
        };
        info!(
            unique = summary.unique_messages,
            sent = summary.pool.sent,
            "Relay pipeline stopped"
        );
        summary
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use dedup_relay_core::{ConfigError, ListenerConfig};
    use tokio::net::{TcpListener, UdpSocket};

    #[test]
    fn test_invalid_config_is_rejected() {
        let mut config = RelayConfig::default();
        config.pool.workers = 0;

        assert!(matches!(
            RelayRuntime::new(config),
            Err(RelayError::Config(ConfigError::NoWorkers))
        ));
    }

    #[tokio::test]
    async fn test_bind_failure_leaves_siblings_running() {
        let acceptor = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let taken = UdpSocket::bind("127.0.0.1:0").await.unwrap();

        let mut config = RelayConfig::loopback(2, acceptor.local_addr().unwrap());
        config.listeners[0] = ListenerConfig::new("receiver-1", taken.local_addr().unwrap());

        let handle = RelayRuntime::new(config).unwrap().start().await;
        assert_eq!(handle.listener_addrs().len(), 1);
        assert_eq!(handle.listener_addrs()[0].0, "receiver-2");

        let summary = handle.shutdown().await;
        assert_eq!(summary.listeners.len(), 2);
        assert!(matches!(
            &summary.listeners[0],
            ListenerOutcome::Failed { name, error: RelayError::Bind { .. } } if name == "receiver-1"
        ));
        assert!(summary.listeners[1].report().is_some());
    }

    #[tokio::test]
    async fn test_summary_display_reports_unique_total() {
        let acceptor = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let config = RelayConfig::loopback(1, acceptor.local_addr().unwrap());

        let handle = RelayRuntime::new(config).unwrap().start().await;
        let summary = handle.shutdown().await;

        let text = summary.to_string();
        assert!(text.starts_with("Total unique messages: 0"));
        assert!(text.contains("receiver-1: received=0"));
        assert_eq!(summary.listeners[0].name(), "receiver-1");
    }
}
