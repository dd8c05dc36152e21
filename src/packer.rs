use std::fmt::Debug;

use bytes::Bytes;

/// The external packet codec.
///
/// The transport treats packet contents as opaque: all it relies on is that
/// `pack` yields exactly [`packet_size`](Packer::packet_size) bytes for any
/// data, and that `unpack` is its inverse. The codec is passed to the
/// transport by value - there is no process-wide packer.
///
/// `unpack` is fallible because inbound bytes come off the network; a block
/// that fails to decode is logged and skipped by the receive loop.
#[cfg_attr(test, mockall::automock(type Data = Vec<u8>;))]
pub trait Packer: Send + Sync + 'static {
    type Data: Clone + Debug + Send + 'static;

    /// The fixed size of every packet, in bytes.
    fn packet_size(&self) -> usize;

    fn pack(&self, data: &Self::Data) -> Bytes;

    fn unpack(&self, packet: &[u8]) -> anyhow::Result<Self::Data>;
}
