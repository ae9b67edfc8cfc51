//! Dedup Relay Runtime
//!
//! The async tasks that make up the relay pipeline:
//! - `ListenerStage`: one datagram endpoint feeding the shared store
//! - `Dispatcher`: drains the handoff queue onto the send pool
//! - `SendPool`: fixed set of workers writing frames to the outbound stream
//! - `RelayRuntime`: starts the stages and shuts them down in order
//!
//! `dedup-relay-core` provides the message, store, queue and configuration
//! types these tasks are built from.

pub mod connection;
pub mod dispatcher;
pub mod listener;
pub mod pool;
mod runtime;

pub use connection::OutboundConnection;
pub use dispatcher::{DispatchReport, Dispatcher};
pub use listener::{IngestContext, ListenerReport, ListenerStage};
pub use pool::{send_frame, FrameSink, PoolReport, SendPool, SendTask};
pub use runtime::*;

// Re-export core types for convenience
pub use dedup_relay_core::{
    DedupStore, HandoffQueue, Message, RelayConfig, RelayError, RelayResult, FRAME_SIZE,
};
