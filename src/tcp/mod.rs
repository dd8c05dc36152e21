//! The TCP transport: listener, per-neighbor connection pairs, handshake,
//! framing and the reconnection loop.

pub mod config;
pub mod framer;
pub mod handshake;
pub mod transport;

mod receive;
mod reconnect;
mod send_socket;
