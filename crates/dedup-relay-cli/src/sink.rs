//! Forwarding sink
//!
//! Accepts a single stream connection and logs every frame on it. Frames are
//! read with exact 24-byte reads and no resynchronisation, so a stream that
//! loses alignment stays misaligned until it closes.

use std::io;

use dedup_relay_core::{Message, FRAME_SIZE};
use tokio::io::{AsyncRead, AsyncReadExt};
use tokio::net::TcpListener;
use tracing::{info, warn};

use crate::error::Result;

/// Accept one connection on `listener` and read frames until it closes.
/// Returns the number of frames received.
pub async fn run_sink(listener: TcpListener) -> Result<u64> {
    info!("Sink listening on {}", listener.local_addr()?);

    let (stream, peer) = listener.accept().await?;
    info!(%peer, "Accepted forwarding connection");

    let received = read_frames(stream).await?;
    info!(received, "Forwarding connection closed");
    Ok(received)
}

/// Read and log frames until end of stream
pub async fn read_frames<R: AsyncRead + Unpin>(mut reader: R) -> Result<u64> {
    let mut frame = [0u8; FRAME_SIZE];
    let mut received = 0;

    loop {
        match reader.read_exact(&mut frame).await {
            Ok(_) => {}
            Err(e) if e.kind() == io::ErrorKind::UnexpectedEof => break,
            Err(e) => return Err(e.into()),
        }

        let message = Message::decode(&frame)?;
        if usize::from(message.size) != FRAME_SIZE {
            warn!(size = message.size, "Frame reports unexpected size");
        }
        info!("Received via TCP: {}", message);
        received += 1;
    }

    Ok(received)
}
