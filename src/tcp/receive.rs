use std::net::SocketAddr;
use std::sync::Arc;

use bytes::BytesMut;
use tokio::io::AsyncReadExt;
use tokio::net::{TcpListener, TcpStream};
use tokio::time::timeout;
use tracing::{debug, info, instrument, warn};

use crate::error::TransportError;
use crate::events::TransportEvent;
use crate::neighbor::Neighbor;
use crate::packer::Packer;
use crate::tcp::framer::PacketFramer;
use crate::tcp::handshake::PortAnnouncement;
use crate::tcp::send_socket::connect_or_mark_reconnect;
use crate::tcp::transport::{ReceiveEntry, SharedTransport};

pub(crate) async fn run_accept_loop<P: Packer>(
    shared: Arc<SharedTransport<P>>,
    listener: TcpListener,
) {
    loop {
        match listener.accept().await {
            Ok((stream, remote_addr)) => {
                let shared = shared.clone();
                tokio::spawn(async move {
                    handle_inbound(shared, stream, remote_addr).await;
                });
            }
            Err(e) => {
                warn!("error accepting connection: {}", e);
                shared
                    .notifier
                    .publish(TransportEvent::Error(TransportError::Socket(e.to_string())));
            }
        }
    }
}

/// Runs an accepted connection through the handshake and, if the remote turns
/// out to be a neighbor we may receive from, hands it to the framed read
/// loop. All rejection paths drop the socket without emitting anything.
#[instrument(name = "inbound_connection", skip_all, fields(remote = %remote_addr))]
async fn handle_inbound<P: Packer>(
    shared: Arc<SharedTransport<P>>,
    mut stream: TcpStream,
    remote_addr: SocketAddr,
) {
    debug!("accepted inbound connection");

    // Exactly 10 bytes: anything the remote coalesced after the handshake
    //  stays in the stream for the framed read loop.
    let mut raw = [0u8; PortAnnouncement::SERIALIZED_LEN];
    let announcement =
        match timeout(shared.config.handshake_timeout, stream.read_exact(&mut raw)).await {
            Err(_) => {
                debug!(
                    "no handshake within {:?}, dropping connection",
                    shared.config.handshake_timeout
                );
                return;
            }
            Ok(Err(e)) => {
                debug!("connection lost during handshake: {}", e);
                return;
            }
            Ok(Ok(_)) => match PortAnnouncement::deser(&raw) {
                Ok(announcement) => announcement,
                Err(e) => {
                    debug!("dropping connection: {}", e);
                    return;
                }
            },
        };

    let remote_host = remote_addr.ip().to_string();
    let Some(neighbor) = resolve_neighbor(&shared, &remote_host, announcement.port).await else {
        debug!("no neighbor claims {}, dropping connection", remote_host);
        return;
    };

    if !neighbor.gateway_can_receive_from() {
        debug!("receiving from {:?} is disabled, dropping connection", neighbor);
        return;
    }

    let mut state = shared.state.write().await;
    if !state.run_state.is_active() || !state.contains_neighbor(&neighbor) {
        return;
    }
    let socket_id = state.next_socket_id();
    let task = tokio::spawn(run_receive_loop(
        shared.clone(),
        neighbor.clone(),
        remote_addr,
        stream,
        socket_id,
    ));
    if let Some(old) = state
        .receive_sockets
        .insert(neighbor.clone(), ReceiveEntry { id: socket_id, task })
    {
        debug!("superseding previous receive socket for {:?}", neighbor);
        old.task.abort();
    }
}

/// Maps a remote address to the neighbor claiming it, synthesizing and
/// registering a new neighbor when configured to admit unknown peers. A
/// synthesized neighbor gets the full `add_neighbor` treatment: discovery
/// event, immediate outbound connect attempt, reconnection on failure.
async fn resolve_neighbor<P: Packer>(
    shared: &Arc<SharedTransport<P>>,
    remote_host: &str,
    remote_port: u16,
) -> Option<Neighbor> {
    {
        let state = shared.state.read().await;
        if let Some(n) = state.neighbors.iter().find(|n| n.match_addr(remote_host)) {
            return Some(n.clone());
        }
    }

    if !shared.config.receive_unknown_neighbors {
        return None;
    }

    let neighbor = Neighbor::tcp(remote_host.to_owned(), remote_port);
    {
        let mut state = shared.state.write().await;
        // the table may have changed while the lock was released
        if let Some(n) = state.neighbors.iter().find(|n| n.match_addr(remote_host)) {
            return Some(n.clone());
        }
        if !state.run_state.is_active() {
            return None;
        }
        state.neighbors.push(neighbor.clone());
    }

    info!("discovered new neighbor {:?}", neighbor);
    shared
        .notifier
        .publish(TransportEvent::NeighborDiscovered(neighbor.clone()));
    connect_or_mark_reconnect(shared, &neighbor).await;

    Some(neighbor)
}

/// Owns an identified inbound connection until it closes: frames the byte
/// stream into packets, decodes them and publishes Receive events. Removes
/// its own map entry on the way out unless a newer socket superseded it.
async fn run_receive_loop<P: Packer>(
    shared: Arc<SharedTransport<P>>,
    neighbor: Neighbor,
    remote_addr: SocketAddr,
    mut stream: TcpStream,
    socket_id: u64,
) {
    let mut framer = PacketFramer::new(shared.packer.packet_size());
    let mut read_buf = BytesMut::with_capacity(64 * 1024);

    loop {
        read_buf.clear();
        match stream.read_buf(&mut read_buf).await {
            Ok(0) => {
                debug!("receive connection from {:?} closed by peer", neighbor);
                break;
            }
            Ok(_) => {
                framer.feed(&read_buf);
                while let Some(block) = framer.next_block() {
                    match shared.packer.unpack(&block) {
                        Ok(data) => shared.notifier.publish(TransportEvent::Receive {
                            data,
                            neighbor: neighbor.clone(),
                            remote_addr,
                        }),
                        Err(e) => {
                            warn!("received an undecodable packet from {:?} - skipping: {}", neighbor, e)
                        }
                    }
                }
            }
            Err(e) => {
                warn!("receive connection from {:?} broke: {}", neighbor, e);
                shared
                    .notifier
                    .publish(TransportEvent::Error(TransportError::Socket(e.to_string())));
                break;
            }
        }
    }

    let mut state = shared.state.write().await;
    if state
        .receive_sockets
        .get(&neighbor)
        .is_some_and(|e| e.id == socket_id)
    {
        state.receive_sockets.remove(&neighbor);
    }
}
