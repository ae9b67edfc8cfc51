//! Test message generator
//!
//! Sends a fixed sequence to every target: message `i` has id `i % 5`, and
//! every third message carries the trigger value 10. With the default count
//! the relay sees ids 0 through 4 twice each and forwards ids 0 and 3.

use std::net::{Ipv4Addr, SocketAddr, SocketAddrV4};
use std::time::Duration;

use dedup_relay_core::Message;
use tokio::net::UdpSocket;
use tracing::{error, info};

use crate::error::Result;

const TEST_KIND: u8 = 1;
const TEST_TRIGGER: u64 = 10;

/// Default generator destinations, matching the default listener ports
pub fn default_targets() -> Vec<SocketAddr> {
    [5000, 5001]
        .into_iter()
        .map(|port| SocketAddr::V4(SocketAddrV4::new(Ipv4Addr::LOCALHOST, port)))
        .collect()
}

/// The `i`-th message of the test sequence
pub fn test_message(i: u64) -> Message {
    let data = if i % 3 == 0 { TEST_TRIGGER } else { i };
    Message::new(TEST_KIND, i % 5, data)
}

/// Send `count` messages to every target, pausing `interval` between them.
/// Returns the number of datagrams sent successfully.
pub async fn emit(targets: &[SocketAddr], count: u64, interval: Duration) -> Result<u64> {
    let local = SocketAddr::V4(SocketAddrV4::new(Ipv4Addr::UNSPECIFIED, 0));
    let socket = UdpSocket::bind(local).await?;
    let mut sent = 0;

    for i in 0..count {
        let message = test_message(i);
        let frame = message.encode();

        for &dest in targets {
            match socket.send_to(&frame, dest).await {
                Ok(_) => sent += 1,
                // A lost datagram is not fatal to the sequence
                Err(e) => error!(%dest, "Failed to send message ID={}: {}", message.id, e),
            }
        }
        info!("Sent: {}", message);

        if i + 1 < count {
            tokio::time::sleep(interval).await;
        }
    }

    Ok(sent)
}

#[cfg(test)]
mod tests {
    use super::*;
    use dedup_relay_core::FRAME_SIZE;

    #[test]
    fn test_sequence_shape() {
        let ids: Vec<u64> = (0..10).map(|i| test_message(i).id).collect();
        assert_eq!(ids, vec![0, 1, 2, 3, 4, 0, 1, 2, 3, 4]);

        let triggers: Vec<u64> = (0..10)
            .map(test_message)
            .filter(|m| m.data == 10)
            .map(|m| m.id)
            .collect();
        assert_eq!(triggers, vec![0, 3, 1, 4]);
        assert_eq!(test_message(4).data, 4);
    }

    #[tokio::test]
    async fn test_emit_reaches_every_target() {
        let first = UdpSocket::bind("127.0.0.1:0").await.unwrap();
        let second = UdpSocket::bind("127.0.0.1:0").await.unwrap();
        let targets = vec![first.local_addr().unwrap(), second.local_addr().unwrap()];

        let sent = emit(&targets, 3, Duration::from_millis(1)).await.unwrap();
        assert_eq!(sent, 6);

        for socket in [&first, &second] {
            let mut buf = [0u8; 64];
            for i in 0..3 {
                let (len, _) = socket.recv_from(&mut buf).await.unwrap();
                assert_eq!(len, FRAME_SIZE);
                assert_eq!(Message::decode(&buf[..len]).unwrap(), test_message(i));
            }
        }
    }
}
