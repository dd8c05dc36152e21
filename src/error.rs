use thiserror::Error;

/// Everything that can go wrong in the transport, as matchable kinds.
///
/// Only the lifecycle and table errors surface to callers of the public
/// operations; connect failures during `add_neighbor` / `run` are converted
/// into reconnection entries, and socket trouble on established connections
/// is published on the event channel instead. Causes are carried as strings
/// so the type stays `Clone` for the broadcast channel.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TransportError {
    #[error("transport is already running")]
    AlreadyRunning,

    #[error("transport is not running")]
    NotRunning,

    #[error("neighbor is already registered")]
    AlreadyExists,

    #[error("neighbor is not registered")]
    NotFound,

    #[error("no open connection to neighbor")]
    NotConnected,

    #[error("sending to this neighbor is disabled")]
    SendForbidden,

    #[error("connect failed: {0}")]
    ConnectFailed(String),

    #[error("binding the listener failed: {0}")]
    ListenFailed(String),

    #[error("handshake timed out")]
    HandshakeTimeout,

    #[error("invalid handshake {0:?}")]
    HandshakeInvalid(String),

    #[error("socket error: {0}")]
    Socket(String),
}
