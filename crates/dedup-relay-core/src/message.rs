//! Fixed-layout relay message and its wire codec
//!
//! Every frame on both transports (datagram ingest and the forwarded stream)
//! has the same 24-byte layout. Multi-byte fields are big-endian:
//!
//! ```text
//! 0        2    3              8                16               24
//! +--------+----+--------------+----------------+----------------+
//! |  size  |kind|   padding    |       id       |      data      |
//! +--------+----+--------------+----------------+----------------+
//! ```
//!
//! Padding bytes are written as zero and ignored when decoding. The `size`
//! field is carried for compatibility but never trusted as a length prefix.

use core::fmt;

use serde::{Deserialize, Serialize};

use crate::errors::FrameError;

// ----------------------------------------------------------------------------
// Constants
// ----------------------------------------------------------------------------

/// Exact encoded length of one frame
pub const FRAME_SIZE: usize = 24;

const SIZE_OFFSET: usize = 0;
const KIND_OFFSET: usize = 2;
const ID_OFFSET: usize = 8;
const DATA_OFFSET: usize = 16;

// ----------------------------------------------------------------------------
// Message
// ----------------------------------------------------------------------------

/// A single relay message. Copied between stages, never mutated.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Message {
    /// Encoded frame length as reported by the producer
    pub size: u16,
    /// Message type tag
    pub kind: u8,
    /// Deduplication key
    pub id: u64,
    /// Payload value; drives the forwarding decision
    pub data: u64,
}

impl Message {
    /// Create a message whose `size` matches the wire frame length
    pub fn new(kind: u8, id: u64, data: u64) -> Self {
        Self {
            size: FRAME_SIZE as u16,
            kind,
            id,
            data,
        }
    }

    /// Encode into a fixed-size frame
    pub fn encode(&self) -> [u8; FRAME_SIZE] {
        let mut frame = [0u8; FRAME_SIZE];
        frame[SIZE_OFFSET..KIND_OFFSET].copy_from_slice(&self.size.to_be_bytes());
        frame[KIND_OFFSET] = self.kind;
        frame[ID_OFFSET..DATA_OFFSET].copy_from_slice(&self.id.to_be_bytes());
        frame[DATA_OFFSET..FRAME_SIZE].copy_from_slice(&self.data.to_be_bytes());
        frame
    }

    /// Decode a frame. Any byte count other than [`FRAME_SIZE`] is rejected.
    pub fn decode(bytes: &[u8]) -> Result<Self, FrameError> {
        let frame: &[u8; FRAME_SIZE] =
            bytes.try_into().map_err(|_| FrameError::WrongLength {
                expected: FRAME_SIZE,
                actual: bytes.len(),
            })?;

        Ok(Self {
            size: u16::from_be_bytes([frame[SIZE_OFFSET], frame[SIZE_OFFSET + 1]]),
            kind: frame[KIND_OFFSET],
            id: read_u64(frame, ID_OFFSET),
            data: read_u64(frame, DATA_OFFSET),
        })
    }
}

impl fmt::Display for Message {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ID={}, Data={}", self.id, self.data)
    }
}

fn read_u64(frame: &[u8; FRAME_SIZE], offset: usize) -> u64 {
    let mut raw = [0u8; 8];
    raw.copy_from_slice(&frame[offset..offset + 8]);
    u64::from_be_bytes(raw)
}
