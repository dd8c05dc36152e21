use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::time::Duration;

use bytes::{BufMut, Bytes, BytesMut};
use tokio::sync::broadcast;
use tokio::time::{sleep, timeout, Instant};

use crate::events::TransportEvent;
use crate::neighbor::Neighbor;
use crate::packer::Packer;
use crate::tcp::config::TcpTransportConfig;
use crate::tcp::transport::TcpTransport;

/// Trivial codec for tests: text, right-padded with spaces to the packet
/// size.
pub struct TextPacker {
    packet_size: usize,
}

impl TextPacker {
    pub fn new(packet_size: usize) -> TextPacker {
        TextPacker { packet_size }
    }
}

impl Packer for TextPacker {
    type Data = String;

    fn packet_size(&self) -> usize {
        self.packet_size
    }

    fn pack(&self, data: &String) -> Bytes {
        assert!(data.len() <= self.packet_size, "test data too long");
        let mut buf = BytesMut::with_capacity(self.packet_size);
        buf.put_slice(data.as_bytes());
        buf.resize(self.packet_size, b' ');
        buf.freeze()
    }

    fn unpack(&self, packet: &[u8]) -> anyhow::Result<String> {
        let text = std::str::from_utf8(packet)?;
        Ok(text.trim_end_matches(' ').to_owned())
    }
}

/// Loopback-bound config with a reconnection interval short enough for
/// tests to wait out.
pub fn test_config(port: u16) -> TcpTransportConfig {
    let mut config = TcpTransportConfig::new(port);
    config.bind_host = IpAddr::V4(Ipv4Addr::LOCALHOST);
    config.reconnect_interval = Duration::from_millis(100);
    config
}

/// A port that was free a moment ago. Good enough for tests that need to
/// know a peer's port before the peer exists.
pub fn free_local_port() -> u16 {
    std::net::TcpListener::bind("127.0.0.1:0")
        .unwrap()
        .local_addr()
        .unwrap()
        .port()
}

pub async fn wait_for_connection<P: Packer>(
    transport: &TcpTransport<P>,
    neighbor: &Neighbor,
    deadline: Duration,
) -> bool {
    let start = Instant::now();
    while start.elapsed() < deadline {
        if transport.is_connected_to(neighbor).await {
            return true;
        }
        sleep(Duration::from_millis(5)).await;
    }
    false
}

pub async fn next_receive(
    events: &mut broadcast::Receiver<TransportEvent<String>>,
    deadline: Duration,
) -> Option<(String, Neighbor, SocketAddr)> {
    timeout(deadline, async {
        loop {
            match events.recv().await {
                Ok(TransportEvent::Receive {
                    data,
                    neighbor,
                    remote_addr,
                }) => return Some((data, neighbor, remote_addr)),
                Ok(_) | Err(broadcast::error::RecvError::Lagged(_)) => continue,
                Err(broadcast::error::RecvError::Closed) => return None,
            }
        }
    })
    .await
    .ok()
    .flatten()
}

pub async fn next_discovered(
    events: &mut broadcast::Receiver<TransportEvent<String>>,
    deadline: Duration,
) -> Option<Neighbor> {
    timeout(deadline, async {
        loop {
            match events.recv().await {
                Ok(TransportEvent::NeighborDiscovered(neighbor)) => return Some(neighbor),
                Ok(_) | Err(broadcast::error::RecvError::Lagged(_)) => continue,
                Err(broadcast::error::RecvError::Closed) => return None,
            }
        }
    })
    .await
    .ok()
    .flatten()
}
