//! TCP transport for a peer-to-peer packet gateway.
//!
//! The gateway exchanges fixed-size application packets with a set of known
//! neighbors. Each pair of peers is linked by *two* TCP connections, one
//! opened by each side: the connection a peer opens is its send socket, the
//! connection it accepts is its receive socket. This keeps every socket
//! strictly half-duplex at the application level and lets each side manage
//! its own outbound lifecycle.
//!
//! ## Wire protocol
//!
//! Per TCP connection:
//! ```ascii
//! 0..9 : handshake - the connecting side's listening port as ASCII digits,
//!         zero-padded left to exactly 10 characters (port 1440 -> "0000001440")
//! 10.. : concatenated application packets, each exactly `packet_size` bytes,
//!         opaque to this layer
//! ```
//!
//! The handshake is the only thing written before application packets. It
//! tells the accepting side which listening port the remote gateway serves
//! on, which is what identifies (or, if configured, auto-registers) the
//! neighbor behind an inbound connection.
//!
//! Packet structure is owned by an external codec passed in as a [`packer::Packer`];
//! this crate only guarantees that what goes in and comes out of a socket is
//! a whole number of `packet_size`-byte blocks, in order per peer.
//!
//! Connection healing is periodic: neighbors whose outbound connect failed
//! are retried on a fixed interval until the connect succeeds, the neighbor
//! is removed, or the transport shuts down.

pub mod error;
pub mod events;
pub mod neighbor;
pub mod packer;
pub mod tcp;

#[cfg(test)]
mod test_util;

#[cfg(test)]
mod test {
    use tracing::Level;

    #[ctor::ctor]
    fn init_test_logging() {
        tracing_subscriber::fmt()
            .with_max_level(Level::TRACE)
            .try_init()
            .ok();
    }
}
