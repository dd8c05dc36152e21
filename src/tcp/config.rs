use std::net::{IpAddr, Ipv4Addr};
use std::time::Duration;

#[derive(Debug, Clone)]
pub struct TcpTransportConfig {
    /// Address the listener binds to.
    pub bind_host: IpAddr,

    /// Port the listener binds to, and the port announced in outbound
    /// handshakes. Binding port 0 works: the handshake then announces the
    /// port the OS actually assigned.
    pub port: u16,

    /// Pause between reconnection ticks. A tick retries every neighbor
    /// currently marked as needing reconnection; the next tick is scheduled
    /// only after all attempts of the previous one have settled.
    pub reconnect_interval: Duration,

    /// How long an accepted connection may take to deliver its 10-byte
    /// handshake before it is dropped.
    pub handshake_timeout: Duration,

    /// Admit inbound connections from addresses no registered neighbor
    /// claims, synthesizing and registering a neighbor for them.
    pub receive_unknown_neighbors: bool,
}

impl TcpTransportConfig {
    pub fn new(port: u16) -> TcpTransportConfig {
        TcpTransportConfig {
            bind_host: IpAddr::V4(Ipv4Addr::UNSPECIFIED),
            port,
            reconnect_interval: Duration::from_secs(60),
            handshake_timeout: Duration::from_secs(10),
            receive_unknown_neighbors: false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = TcpTransportConfig::new(1440);

        assert_eq!(config.bind_host, IpAddr::V4(Ipv4Addr::UNSPECIFIED));
        assert_eq!(config.port, 1440);
        assert_eq!(config.reconnect_interval, Duration::from_secs(60));
        assert_eq!(config.handshake_timeout, Duration::from_secs(10));
        assert!(!config.receive_unknown_neighbors);
    }
}
