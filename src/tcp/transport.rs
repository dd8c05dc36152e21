use std::fmt::{Debug, Formatter};
use std::net::SocketAddr;
use std::sync::Arc;

use rustc_hash::{FxHashMap, FxHashSet};
use tokio::net::TcpListener;
use tokio::sync::broadcast;
use tokio::sync::{Mutex, RwLock};
use tokio::task::JoinHandle;
use tracing::{debug, info};

use crate::error::TransportError;
use crate::events::{EventNotifier, TransportEvent};
use crate::neighbor::{Neighbor, NeighborKind};
use crate::packer::Packer;
use crate::tcp::config::TcpTransportConfig;
use crate::tcp::receive::run_accept_loop;
use crate::tcp::reconnect::run_reconnect_loop;
use crate::tcp::send_socket::{
    connect_or_mark_reconnect, teardown_send_entry, SendSocket,
};

/// The TCP transport of the gateway: a listener for inbound connections, one
/// outbound connection per reachable neighbor, and the reconnection loop
/// that heals the outbound side.
///
/// All public operations are safe to call concurrently; the transport's
/// tables are guarded by a single lock that is never held across socket I/O.
pub struct TcpTransport<P: Packer> {
    shared: Arc<SharedTransport<P>>,
}

impl<P: Packer> Debug for TcpTransport<P> {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "TcpTransport")
    }
}

pub(crate) struct SharedTransport<P: Packer> {
    pub(crate) config: TcpTransportConfig,
    pub(crate) packer: P,
    pub(crate) notifier: EventNotifier<P::Data>,
    pub(crate) state: RwLock<TransportState>,
}

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub(crate) enum RunState {
    Idle,
    Starting,
    Running,
    ShuttingDown,
}

impl RunState {
    /// Live enough for sockets to be registered: bring-up counts, teardown
    /// does not.
    pub(crate) fn is_active(&self) -> bool {
        matches!(self, RunState::Starting | RunState::Running)
    }
}

pub(crate) struct SendEntry {
    pub(crate) id: u64,
    pub(crate) socket: Arc<Mutex<SendSocket>>,
    pub(crate) watcher: JoinHandle<()>,
}

pub(crate) struct ReceiveEntry {
    pub(crate) id: u64,
    pub(crate) task: JoinHandle<()>,
}

pub(crate) struct TransportState {
    pub(crate) run_state: RunState,
    /// The address the listener is actually bound to while running; its port
    /// is what outbound handshakes announce.
    pub(crate) local_addr: Option<SocketAddr>,
    /// Insertion-ordered: `get_neighbor` returns the first match.
    pub(crate) neighbors: Vec<Neighbor>,
    pub(crate) send_sockets: FxHashMap<Neighbor, SendEntry>,
    pub(crate) receive_sockets: FxHashMap<Neighbor, ReceiveEntry>,
    pub(crate) needs_reconnect: FxHashSet<Neighbor>,
    accept_task: Option<JoinHandle<()>>,
    reconnect_task: Option<JoinHandle<()>>,
    socket_id_counter: u64,
}

impl TransportState {
    fn new() -> TransportState {
        TransportState {
            run_state: RunState::Idle,
            local_addr: None,
            neighbors: Vec::new(),
            send_sockets: Default::default(),
            receive_sockets: Default::default(),
            needs_reconnect: Default::default(),
            accept_task: None,
            reconnect_task: None,
            socket_id_counter: 0,
        }
    }

    pub(crate) fn contains_neighbor(&self, neighbor: &Neighbor) -> bool {
        self.neighbors.iter().any(|n| n == neighbor)
    }

    /// Socket registrations are tagged so a socket's cleanup can tell whether
    /// the map entry still belongs to it or a successor took its place.
    pub(crate) fn next_socket_id(&mut self) -> u64 {
        self.socket_id_counter += 1;
        self.socket_id_counter
    }
}

impl<P: Packer> TcpTransport<P> {
    pub fn new(config: TcpTransportConfig, packer: P) -> TcpTransport<P> {
        TcpTransport {
            shared: Arc::new(SharedTransport {
                config,
                packer,
                notifier: EventNotifier::new(),
                state: RwLock::new(TransportState::new()),
            }),
        }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<TransportEvent<P::Data>> {
        self.shared.notifier.subscribe()
    }

    /// Can this transport carry traffic for the given neighbor?
    pub fn supports(&self, neighbor: &Neighbor) -> bool {
        neighbor.kind() == NeighborKind::Tcp
    }

    pub async fn is_running(&self) -> bool {
        self.shared.state.read().await.run_state == RunState::Running
    }

    /// The listener's actual bound address while running.
    pub async fn local_addr(&self) -> Option<SocketAddr> {
        self.shared.state.read().await.local_addr
    }

    /// Is there currently an open outbound connection to this neighbor?
    pub async fn is_connected_to(&self, neighbor: &Neighbor) -> bool {
        self.shared.state.read().await.send_sockets.contains_key(neighbor)
    }

    /// The first registered neighbor claiming the given address, in
    /// registration order.
    pub async fn get_neighbor(&self, addr: &str) -> Option<Neighbor> {
        self.shared
            .state
            .read()
            .await
            .neighbors
            .iter()
            .find(|n| n.match_addr(addr))
            .cloned()
    }

    pub async fn neighbors(&self) -> Vec<Neighbor> {
        self.shared.state.read().await.neighbors.clone()
    }

    /// Registers a neighbor. While running, an outbound connect is attempted
    /// right away; its failure marks the neighbor for reconnection instead of
    /// failing the call. `is_connected_to` is the way to observe the outcome.
    pub async fn add_neighbor(&self, neighbor: Neighbor) -> Result<(), TransportError> {
        let attempt_connect = {
            let mut state = self.shared.state.write().await;
            if state.contains_neighbor(&neighbor) {
                return Err(TransportError::AlreadyExists);
            }
            state.neighbors.push(neighbor.clone());
            state.run_state.is_active()
        };

        if attempt_connect {
            connect_or_mark_reconnect(&self.shared, &neighbor).await;
        }
        Ok(())
    }

    /// Unregisters a neighbor and closes both of its sockets. The receive
    /// socket is silenced and dropped, the send socket is shut down
    /// gracefully.
    pub async fn remove_neighbor(&self, neighbor: &Neighbor) -> Result<(), TransportError> {
        let (send_entry, receive_entry) = {
            let mut state = self.shared.state.write().await;
            let Some(idx) = state.neighbors.iter().position(|n| n == neighbor) else {
                return Err(TransportError::NotFound);
            };
            state.neighbors.remove(idx);
            state.needs_reconnect.remove(neighbor);
            (
                state.send_sockets.remove(neighbor),
                state.receive_sockets.remove(neighbor),
            )
        };

        if let Some(entry) = receive_entry {
            entry.task.abort();
        }
        if let Some(entry) = send_entry {
            teardown_send_entry(entry).await;
        }

        debug!("removed neighbor {:?}", neighbor);
        Ok(())
    }

    /// Binds the listener, connects to all registered neighbors and arms the
    /// reconnection loop. Connect failures mark neighbors for reconnection;
    /// only a listener that cannot bind fails the call.
    pub async fn run(&self) -> Result<(), TransportError> {
        {
            let mut state = self.shared.state.write().await;
            if state.run_state != RunState::Idle {
                return Err(TransportError::AlreadyRunning);
            }
            state.run_state = RunState::Starting;
        }

        let bind_addr = SocketAddr::new(self.shared.config.bind_host, self.shared.config.port);
        let listener = match TcpListener::bind(bind_addr).await {
            Ok(listener) => listener,
            Err(e) => {
                self.shared.state.write().await.run_state = RunState::Idle;
                return Err(TransportError::ListenFailed(e.to_string()));
            }
        };
        let local_addr = match listener.local_addr() {
            Ok(addr) => addr,
            Err(e) => {
                self.shared.state.write().await.run_state = RunState::Idle;
                return Err(TransportError::ListenFailed(e.to_string()));
            }
        };
        info!("listening on {}", local_addr);

        let initial_neighbors = {
            let mut state = self.shared.state.write().await;
            state.local_addr = Some(local_addr);
            state.accept_task = Some(tokio::spawn(run_accept_loop(
                self.shared.clone(),
                listener,
            )));
            state.neighbors.clone()
        };

        let mut attempts = Vec::new();
        for neighbor in initial_neighbors {
            let shared = self.shared.clone();
            attempts.push(tokio::spawn(async move {
                connect_or_mark_reconnect(&shared, &neighbor).await;
            }));
        }
        for attempt in attempts {
            let _ = attempt.await;
        }

        {
            let mut state = self.shared.state.write().await;
            state.reconnect_task = Some(tokio::spawn(run_reconnect_loop(self.shared.clone())));
            state.run_state = RunState::Running;
        }
        Ok(())
    }

    /// Stops accepting, closes the listener, tears down all connections and
    /// disarms the reconnection loop. After this the transport is back in its
    /// initial state and can be run again.
    pub async fn shutdown(&self) -> Result<(), TransportError> {
        let (accept_task, reconnect_task, send_entries, receive_entries) = {
            let mut state = self.shared.state.write().await;
            if state.run_state != RunState::Running {
                return Err(TransportError::NotRunning);
            }
            state.run_state = RunState::ShuttingDown;
            state.needs_reconnect.clear();
            (
                state.accept_task.take(),
                state.reconnect_task.take(),
                state.send_sockets.drain().map(|(_, e)| e).collect::<Vec<_>>(),
                state
                    .receive_sockets
                    .drain()
                    .map(|(_, e)| e)
                    .collect::<Vec<_>>(),
            )
        };

        // no new connections: detach the accept loop, which owns and thereby
        //  closes the listener
        if let Some(task) = accept_task {
            task.abort();
            let _ = task.await;
        }

        // tear down all outbound connections concurrently
        let mut teardowns = Vec::new();
        for entry in send_entries {
            teardowns.push(tokio::spawn(teardown_send_entry(entry)));
        }
        for teardown in teardowns {
            let _ = teardown.await;
        }

        for entry in receive_entries {
            entry.task.abort();
        }
        if let Some(task) = reconnect_task {
            task.abort();
        }

        {
            let mut state = self.shared.state.write().await;
            state.run_state = RunState::Idle;
            state.local_addr = None;
        }
        info!("transport shut down");
        Ok(())
    }

    /// Packs the data and writes the packet to the neighbor's send socket,
    /// resolving once the bytes are flushed to the OS. Writes to one neighbor
    /// go out in call order.
    pub async fn send(&self, data: &P::Data, neighbor: &Neighbor) -> Result<(), TransportError> {
        if !neighbor.gateway_can_send_to() {
            return Err(TransportError::SendForbidden);
        }

        let (socket_id, socket) = {
            let state = self.shared.state.read().await;
            let entry = state
                .send_sockets
                .get(neighbor)
                .ok_or(TransportError::NotConnected)?;
            (entry.id, entry.socket.clone())
        };

        let packet = self.shared.packer.pack(data);
        debug_assert_eq!(packet.len(), self.shared.packer.packet_size());

        if let Err(e) = socket.lock().await.send_packet(&packet).await {
            debug!("sending to {:?} failed: {}", neighbor, e);
            let entry = {
                let mut state = self.shared.state.write().await;
                if state.send_sockets.get(neighbor).is_some_and(|en| en.id == socket_id) {
                    state.send_sockets.remove(neighbor)
                } else {
                    None
                }
            };
            if let Some(entry) = entry {
                entry.watcher.abort();
            }
            return Err(TransportError::Socket(e.to_string()));
        }
        Ok(())
    }
}
