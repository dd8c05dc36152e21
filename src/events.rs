use std::net::SocketAddr;

use tokio::sync::broadcast;

use crate::error::TransportError;
use crate::neighbor::Neighbor;

/// Sized so a consumer that falls behind during a burst loses events rather
/// than stalling the transport's socket tasks.
const EVENT_CHANNEL_CAPACITY: usize = 1024;

/// What the transport reports to its host.
#[derive(Clone, Debug)]
pub enum TransportEvent<D> {
    /// A successfully decoded inbound packet, with the neighbor it came from
    /// and the remote address of the receive socket that carried it.
    Receive {
        data: D,
        neighbor: Neighbor,
        remote_addr: SocketAddr,
    },

    /// A neighbor synthesized from an unknown inbound connection. Emitted
    /// once per auto-discovered neighbor, only with
    /// `receive_unknown_neighbors` enabled.
    NeighborDiscovered(Neighbor),

    /// Non-fatal trouble on an established socket or on the listener.
    Error(TransportError),
}

/// Fan-out point for [`TransportEvent`]s. Subscribers come and go; publishing
/// with no subscribers is a no-op.
pub(crate) struct EventNotifier<D> {
    sender: broadcast::Sender<TransportEvent<D>>,
}

impl<D: Clone + Send + 'static> EventNotifier<D> {
    pub fn new() -> EventNotifier<D> {
        let (sender, _) = broadcast::channel(EVENT_CHANNEL_CAPACITY);
        EventNotifier { sender }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<TransportEvent<D>> {
        self.sender.subscribe()
    }

    pub fn publish(&self, event: TransportEvent<D>) {
        let _ = self.sender.send(event);
    }
}
