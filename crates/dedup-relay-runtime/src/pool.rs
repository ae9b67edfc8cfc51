//! Send Worker Pool
//!
//! A fixed set of workers pulling [`SendTask`]s from a shared queue. Each task
//! carries its own handle to the outbound connection; the worker writes the
//! encoded frame, looping over partial writes, then drops the handle.
//!
//! - The queue lock is held only while taking a task, never across I/O
//! - A failed send ends that task only; the worker moves on
//! - Shutdown refuses new tasks but lets workers drain what is queued
//!
//! Workers run concurrently, so two tasks submitted back to back may reach the
//! wire in either order. Ordering is only guaranteed up to the handoff.

use std::io;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use async_trait::async_trait;
use dedup_relay_core::{Message, RelayError, RelayResult};
use tokio::net::TcpStream;
use tokio::sync::{mpsc, Mutex as AsyncMutex};
use tokio::task::JoinHandle;
use tokio::time::timeout;
use tracing::{debug, error, info, warn};

// ----------------------------------------------------------------------------
// Frame Sink
// ----------------------------------------------------------------------------

/// A non-blocking, write-capable connection handle
#[async_trait]
pub trait FrameSink: Send + Sync + 'static {
    /// Wait until the handle is likely writable
    async fn writable(&self) -> io::Result<()>;

    /// Attempt a write without blocking; may write fewer bytes than offered
    fn try_write(&self, buf: &[u8]) -> io::Result<usize>;
}

#[async_trait]
impl FrameSink for TcpStream {
    async fn writable(&self) -> io::Result<()> {
        TcpStream::writable(self).await
    }

    fn try_write(&self, buf: &[u8]) -> io::Result<usize> {
        TcpStream::try_write(self, buf)
    }
}

/// Write an entire frame, retrying short writes and would-block
pub async fn send_frame<S>(sink: &S, frame: &[u8], writable_wait: Duration) -> io::Result<()>
where
    S: FrameSink + ?Sized,
{
    let mut sent = 0;
    while sent < frame.len() {
        match sink.try_write(&frame[sent..]) {
            Ok(0) => {
                return Err(io::Error::new(
                    io::ErrorKind::WriteZero,
                    "connection accepted no bytes",
                ))
            }
            Ok(n) => sent += n,
            Err(e) if e.kind() == io::ErrorKind::WouldBlock => {
                // An elapsed wait just means another write attempt
                if let Ok(Err(e)) = timeout(writable_wait, sink.writable()).await {
                    return Err(e);
                }
            }
            Err(e) if e.kind() == io::ErrorKind::Interrupted => {}
            Err(e) => return Err(e),
        }
    }
    Ok(())
}

// ----------------------------------------------------------------------------
// Send Task
// ----------------------------------------------------------------------------

/// One message paired with the handle it must be sent on.
/// Dropping the task releases the handle.
#[derive(Debug)]
pub struct SendTask<H> {
    pub message: Message,
    pub handle: H,
}

impl<H> SendTask<H> {
    pub fn new(message: Message, handle: H) -> Self {
        Self { message, handle }
    }
}

// ----------------------------------------------------------------------------
// Send Pool
// ----------------------------------------------------------------------------

/// Totals reported when the pool shuts down
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PoolReport {
    pub sent: u64,
    pub failed: u64,
    /// Tasks still queued after every worker exited
    pub discarded: u64,
}

#[derive(Debug, Default)]
struct PoolStats {
    sent: AtomicU64,
    failed: AtomicU64,
}

type TaskReceiver<H> = Arc<AsyncMutex<mpsc::UnboundedReceiver<SendTask<H>>>>;

/// Fixed-size pool of send workers
pub struct SendPool<H: FrameSink> {
    sender: Mutex<Option<mpsc::UnboundedSender<SendTask<H>>>>,
    receiver: TaskReceiver<H>,
    workers: Mutex<Vec<JoinHandle<()>>>,
    stats: Arc<PoolStats>,
}

impl<H: FrameSink> SendPool<H> {
    /// Start `workers` send workers on the current Tokio runtime
    pub fn new(workers: usize, writable_wait: Duration) -> Self {
        let (sender, receiver) = mpsc::unbounded_channel();
        let receiver = Arc::new(AsyncMutex::new(receiver));
        let stats = Arc::new(PoolStats::default());

        let handles = (0..workers)
            .map(|worker| {
                tokio::spawn(run_worker(
                    worker,
                    Arc::clone(&receiver),
                    Arc::clone(&stats),
                    writable_wait,
                ))
            })
            .collect();

        debug!(workers, "Send pool started");

        Self {
            sender: Mutex::new(Some(sender)),
            receiver,
            workers: Mutex::new(handles),
            stats,
        }
    }

    /// Queue a task. Fails once shutdown has been requested; the task (and
    /// its handle) is dropped in that case.
    pub fn submit(&self, task: SendTask<H>) -> RelayResult<()> {
        let sender = self.sender.lock().unwrap_or_else(PoisonError::into_inner);
        match sender.as_ref() {
            Some(sender) => sender.send(task).map_err(|_| RelayError::PoolShutDown),
            None => Err(RelayError::PoolShutDown),
        }
    }

    pub fn is_shut_down(&self) -> bool {
        self.sender
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .is_none()
    }

    pub fn sent(&self) -> u64 {
        self.stats.sent.load(Ordering::Relaxed)
    }

    pub fn failed(&self) -> u64 {
        self.stats.failed.load(Ordering::Relaxed)
    }

    /// Stop accepting tasks, wait for workers to drain the queue, then discard
    /// anything a dead worker left behind.
    pub async fn shutdown(&self) -> PoolReport {
        // Dropping the only sender closes the channel once it is drained
        self.sender
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();

        let workers = std::mem::take(
            &mut *self.workers.lock().unwrap_or_else(PoisonError::into_inner),
        );
        for (worker, handle) in workers.into_iter().enumerate() {
            if let Err(e) = handle.await {
                error!(worker, "Send worker ended abnormally: {}", e);
            }
        }

        let mut discarded = 0;
        {
            let mut receiver = self.receiver.lock().await;
            while let Ok(task) = receiver.try_recv() {
                warn!(id = task.message.id, "Discarding unsent task");
                discarded += 1;
            }
        }

        let report = PoolReport {
            sent: self.sent(),
            failed: self.failed(),
            discarded,
        };
        info!(
            sent = report.sent,
            failed = report.failed,
            discarded = report.discarded,
            "Send pool stopped"
        );
        report
    }
}

async fn run_worker<H: FrameSink>(
    worker: usize,
    receiver: TaskReceiver<H>,
    stats: Arc<PoolStats>,
    writable_wait: Duration,
) {
    debug!(worker, "Send worker starting");

    loop {
        // The guard is dropped at the end of this statement, before any I/O
        let task = receiver.lock().await.recv().await;
        let Some(SendTask { message, handle }) = task else {
            break;
        };

        let frame = message.encode();
        match send_frame(&handle, &frame, writable_wait).await {
            Ok(()) => {
                stats.sent.fetch_add(1, Ordering::Relaxed);
                info!(worker, id = message.id, "Transmitted: ID={}", message.id);
            }
            Err(source) => {
                stats.failed.fetch_add(1, Ordering::Relaxed);
                let err = RelayError::Send {
                    id: message.id,
                    source,
                };
                error!(worker, "{}", err);
            }
        }

        drop(handle);
    }

    debug!(worker, "Send worker stopped");
}
