//! Outbound stream connection
//!
//! The dispatcher owns one connection for the whole run. Send workers never
//! share it directly: each task gets a duplicated descriptor, so every worker
//! writes through its own handle and closes it when the task ends.

use std::io;
use std::net::SocketAddr;

use dedup_relay_core::{ForwardConfig, RelayError, RelayResult};
use tokio::net::TcpStream;
use tokio::time::{sleep, timeout};
use tracing::{error, info, warn};

/// The single forwarding connection
#[derive(Debug)]
pub struct OutboundConnection {
    stream: std::net::TcpStream,
    peer: SocketAddr,
}

impl OutboundConnection {
    /// Connect with bounded retry. Each attempt is capped by the connect
    /// timeout; failed attempts are separated by the retry delay.
    pub async fn connect(config: &ForwardConfig) -> RelayResult<Self> {
        let addr = config.target;
        let attempts = config.connect_attempts;

        for attempt in 1..=attempts {
            match timeout(config.connect_timeout(), TcpStream::connect(addr)).await {
                Ok(Ok(stream)) => {
                    if let Err(e) = stream.set_nodelay(true) {
                        warn!("Failed to disable Nagle on forwarding connection: {}", e);
                    }
                    info!(%addr, attempt, "Forwarding connection established");
                    return Ok(Self {
                        // Stays in non-blocking mode, which the duplicates inherit
                        stream: stream.into_std()?,
                        peer: addr,
                    });
                }
                Ok(Err(e)) => {
                    warn!(%addr, attempt, "TCP connect failed, retrying: {}", e);
                }
                Err(_) => {
                    warn!(
                        %addr,
                        attempt,
                        "TCP connect timed out after {}ms, retrying",
                        config.connect_timeout_ms
                    );
                }
            }

            if attempt < attempts {
                sleep(config.retry_delay()).await;
            }
        }

        let err = RelayError::ConnectExhausted { addr, attempts };
        error!("{}", err);
        Err(err)
    }

    pub fn peer_addr(&self) -> SocketAddr {
        self.peer
    }

    /// Duplicate the underlying descriptor into an independent async handle.
    /// Must be called from within a Tokio runtime.
    pub fn duplicate(&self) -> io::Result<TcpStream> {
        TcpStream::from_std(self.stream.try_clone()?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::{Duration, Instant};
    use tokio::io::AsyncReadExt;
    use tokio::net::TcpListener;

    async fn refused_addr() -> SocketAddr {
        // Bind then release a port so nothing is listening there
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        drop(listener);
        addr
    }

    #[tokio::test]
    async fn test_connect_gives_up_after_bounded_attempts() {
        let config = ForwardConfig {
            target: refused_addr().await,
            connect_attempts: 5,
            connect_timeout_ms: 100,
            retry_delay_ms: 10,
        };

        let started = Instant::now();
        let err = OutboundConnection::connect(&config).await.unwrap_err();

        assert!(matches!(
            err,
            RelayError::ConnectExhausted { attempts: 5, .. }
        ));
        // Four pauses between five attempts
        assert!(started.elapsed() >= Duration::from_millis(40));
    }

    #[tokio::test]
    async fn test_duplicated_handles_share_the_connection() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let config = ForwardConfig {
            target: listener.local_addr().unwrap(),
            ..ForwardConfig::default()
        };

        let connection = OutboundConnection::connect(&config).await.unwrap();
        let (mut accepted, _) = listener.accept().await.unwrap();

        let first = connection.duplicate().unwrap();
        let second = connection.duplicate().unwrap();
        first.writable().await.unwrap();
        assert_eq!(first.try_write(b"abc").unwrap(), 3);
        drop(first);
        second.writable().await.unwrap();
        assert_eq!(second.try_write(b"def").unwrap(), 3);
        drop(second);

        let mut received = [0u8; 6];
        accepted.read_exact(&mut received).await.unwrap();
        assert_eq!(&received, b"abcdef");
        assert_eq!(connection.peer_addr(), config.target);
    }
}
