use std::sync::Arc;

use bytes::BytesMut;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::net::TcpStream;
use tokio::sync::Mutex;
use tracing::{debug, trace, warn};

use crate::error::TransportError;
use crate::events::TransportEvent;
use crate::neighbor::Neighbor;
use crate::packer::Packer;
use crate::tcp::handshake::PortAnnouncement;
use crate::tcp::transport::{SendEntry, SharedTransport};

/// The write side of an outbound connection. Packets are written through an
/// async mutex whose lock queue is FIFO, which is what gives `send` its
/// per-neighbor call-order guarantee.
pub(crate) struct SendSocket {
    write_half: OwnedWriteHalf,
}

impl SendSocket {
    pub(crate) fn new(write_half: OwnedWriteHalf) -> SendSocket {
        SendSocket { write_half }
    }

    pub(crate) async fn send_packet(&mut self, packet: &[u8]) -> std::io::Result<()> {
        self.write_half.write_all(packet).await
    }

    /// Graceful close. A shutdown error means the connection is already gone,
    /// which is what we wanted anyway.
    pub(crate) async fn shutdown(&mut self) {
        if let Err(e) = self.write_half.shutdown().await {
            trace!("error shutting down send socket: {}", e);
        }
    }
}

/// Opens the outbound connection to a neighbor, announces the local
/// listening port and registers the socket as the neighbor's send socket.
///
/// Registration re-checks under the state lock that the transport is still
/// live and the neighbor still registered - a `shutdown` or
/// `remove_neighbor` that raced the connect wins, and the fresh socket is
/// dropped instead of leaking a map entry.
pub(crate) async fn connect_to_neighbor<P: Packer>(
    shared: &Arc<SharedTransport<P>>,
    neighbor: &Neighbor,
) -> Result<(), TransportError> {
    let local_port = shared
        .state
        .read()
        .await
        .local_addr
        .map(|a| a.port())
        .ok_or_else(|| TransportError::ConnectFailed("transport is not running".to_owned()))?;

    let stream = TcpStream::connect((neighbor.host(), neighbor.port()))
        .await
        .map_err(|e| TransportError::ConnectFailed(e.to_string()))?;
    let (read_half, mut write_half) = stream.into_split();

    let mut buf = BytesMut::with_capacity(PortAnnouncement::SERIALIZED_LEN);
    PortAnnouncement { port: local_port }.ser(&mut buf);
    write_half
        .write_all(&buf)
        .await
        .map_err(|e| TransportError::ConnectFailed(e.to_string()))?;

    let superseded = {
        let mut state = shared.state.write().await;
        if !state.run_state.is_active() || !state.contains_neighbor(neighbor) {
            debug!("{:?} went away while connecting, dropping fresh socket", neighbor);
            return Ok(());
        }

        let socket_id = state.next_socket_id();
        let watcher = tokio::spawn(run_send_watcher(
            shared.clone(),
            neighbor.clone(),
            socket_id,
            read_half,
        ));
        let superseded = state.send_sockets.insert(
            neighbor.clone(),
            SendEntry {
                id: socket_id,
                socket: Arc::new(Mutex::new(SendSocket::new(write_half))),
                watcher,
            },
        );
        state.needs_reconnect.remove(neighbor);
        superseded
    };
    if let Some(entry) = superseded {
        debug!("superseding previous send socket for {:?}", neighbor);
        teardown_send_entry(entry).await;
    }

    debug!("connected to {:?}", neighbor);
    Ok(())
}

/// Connect attempt whose failure is converted into a reconnection entry
/// instead of an error. This is the `add_neighbor` / `run` treatment of
/// connect failures.
pub(crate) async fn connect_or_mark_reconnect<P: Packer>(
    shared: &Arc<SharedTransport<P>>,
    neighbor: &Neighbor,
) {
    if let Err(e) = connect_to_neighbor(shared, neighbor).await {
        debug!("connect to {:?} failed, scheduling reconnect: {}", neighbor, e);

        let mut state = shared.state.write().await;
        if state.run_state.is_active()
            && state.contains_neighbor(neighbor)
            && !state.send_sockets.contains_key(neighbor)
        {
            state.needs_reconnect.insert(neighbor.clone());
        }
    }
}

/// Closes a send socket taken out of the map. Never fails; teardown errors
/// mean the connection is dead already.
pub(crate) async fn teardown_send_entry(entry: SendEntry) {
    entry.watcher.abort();
    entry.socket.lock().await.shutdown().await;
}

/// The peer never sends application data on our outbound connection;
/// reading it is how its close and its errors become visible. Runs until the
/// socket dies, then removes the map entry it belongs to.
async fn run_send_watcher<P: Packer>(
    shared: Arc<SharedTransport<P>>,
    neighbor: Neighbor,
    socket_id: u64,
    mut read_half: OwnedReadHalf,
) {
    let mut buf = [0u8; 256];
    let failure = loop {
        match read_half.read(&mut buf).await {
            Ok(0) => break None,
            Ok(_) => trace!("ignoring stray bytes on the send connection to {:?}", neighbor),
            Err(e) => break Some(e),
        }
    };

    match &failure {
        None => debug!("send connection to {:?} closed by peer", neighbor),
        Some(e) => warn!("send connection to {:?} broke: {}", neighbor, e),
    }

    {
        let mut state = shared.state.write().await;
        if state.send_sockets.get(&neighbor).is_some_and(|e| e.id == socket_id) {
            state.send_sockets.remove(&neighbor);
        }
    }

    if let Some(e) = failure {
        shared
            .notifier
            .publish(TransportEvent::Error(TransportError::Socket(e.to_string())));
    }
}
