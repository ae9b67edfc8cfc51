//! Dedup Relay Core
//!
//! Building blocks shared by every stage of the relay pipeline: the
//! fixed-layout [`Message`] and its wire codec, the [`DedupStore`] that
//! suppresses repeated ids, the [`HandoffQueue`] between ingest and
//! forwarding, configuration, and the error taxonomy.

// ----------------------------------------------------------------------------
// Module Declarations
// ----------------------------------------------------------------------------

pub mod config;
pub mod errors;
pub mod message;
pub mod queue;
pub mod store;

// ----------------------------------------------------------------------------
// Public API
// ----------------------------------------------------------------------------

pub use config::{ForwardConfig, ListenerConfig, PoolConfig, RelayConfig, StoreConfig};
pub use errors::{ConfigError, FrameError, QueueError, RelayError, RelayResult};
pub use message::{Message, FRAME_SIZE};
pub use queue::HandoffQueue;
pub use store::{Admission, DedupStore, HashStrategy, MessageTable};
