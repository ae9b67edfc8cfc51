//! Error types for the relay pipeline
//!
//! Each failure class maps to the component that handles it: malformed frames
//! are dropped by the listener, a closed queue is reported by producers, and
//! setup failures end only the stage that owns the endpoint.

use std::io;
use std::net::SocketAddr;

use crate::message::Message;

// ----------------------------------------------------------------------------
// Specific Error Types
// ----------------------------------------------------------------------------

/// Frame decoding failures
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum FrameError {
    #[error("Malformed frame: expected {expected} bytes, got {actual}")]
    WrongLength { expected: usize, actual: usize },
}

/// Handoff queue failures
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum QueueError {
    /// The queue was closed; the rejected message is handed back
    #[error("Handoff queue closed, message {} not accepted", .0.id)]
    Closed(Message),
}

/// Configuration validation failures
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ConfigError {
    #[error("At least one listener must be configured")]
    NoListeners,
    #[error("Duplicate listener address {0}")]
    DuplicateListener(SocketAddr),
    #[error("Send pool needs at least one worker")]
    NoWorkers,
    #[error("Connect attempts must be at least 1")]
    NoConnectAttempts,
    #[error("Store capacity must be greater than zero, got {0}")]
    InvalidCapacity(usize),
}

// ----------------------------------------------------------------------------
// Main Error Type
// ----------------------------------------------------------------------------

/// Unified error for relay stages
#[derive(Debug, thiserror::Error)]
pub enum RelayError {
    #[error(transparent)]
    Frame(#[from] FrameError),

    #[error(transparent)]
    Queue(#[from] QueueError),

    #[error("Invalid configuration: {0}")]
    Config(#[from] ConfigError),

    #[error("{stage} failed to bind {addr}: {source}")]
    Bind {
        stage: String,
        addr: SocketAddr,
        #[source]
        source: io::Error,
    },

    #[error("{stage} receive failed: {source}")]
    Receive {
        stage: String,
        #[source]
        source: io::Error,
    },

    #[error("Connection to {addr} failed after {attempts} attempts")]
    ConnectExhausted { addr: SocketAddr, attempts: u32 },

    #[error("Send failed for ID={id}: {source}")]
    Send {
        id: u64,
        #[source]
        source: io::Error,
    },

    #[error("Send pool is shut down")]
    PoolShutDown,

    #[error("Task failed: {0}")]
    Task(String),

    #[error("I/O error: {0}")]
    Io(#[from] io::Error),
}

impl RelayError {
    /// Whether an I/O error on a datagram receive is transient and should be
    /// retried locally. `ConnectionReset` is included because an ICMP port
    /// unreachable from an earlier send surfaces as a reset on the next
    /// `recv_from`; on a stream socket a reset is fatal and must not use this.
    pub fn is_transient(err: &io::Error) -> bool {
        matches!(
            err.kind(),
            io::ErrorKind::WouldBlock | io::ErrorKind::Interrupted | io::ErrorKind::ConnectionReset
        )
    }
}

/// Result type for relay operations
pub type RelayResult<T> = core::result::Result<T, RelayError>;
