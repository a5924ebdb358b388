use std::net::SocketAddr;
use std::time::Duration;

/// Errors that can occur in the transport layer.
#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    /// The listener could not be bound.
    #[error("failed to bind {addr}: {source}")]
    Bind {
        addr: String,
        #[source]
        source: std::io::Error,
    },

    /// The TCP accept itself failed.
    #[error("accept failed: {0}")]
    Accept(#[source] std::io::Error),

    /// The upgrade request was refused by the handshake policy.
    #[error("upgrade from {addr} refused with status {status}")]
    Rejected { addr: SocketAddr, status: u16 },

    /// The socket did not complete its upgrade in time.
    #[error("upgrade from {addr} not completed within {timeout:?}")]
    HandshakeTimeout { addr: SocketAddr, timeout: Duration },

    /// The WebSocket handshake, a send, or a receive failed.
    #[cfg(feature = "websocket")]
    #[error("websocket error: {0}")]
    WebSocket(#[from] tokio_tungstenite::tungstenite::Error),
}
