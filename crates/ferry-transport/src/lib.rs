//! Byte-level connections for Ferry.
//!
//! The server only ever sees [`Transport`] (a listener), [`Upgrade`] (an
//! accepted socket that has not finished its handshake) and [`Connection`]
//! (one client, bytes in and out). [`WebSocketTransport`] is the one
//! implementation; it also enforces a [`HandshakePolicy`] so that only the
//! configured path and browser origin get upgraded.
//!
//! ```text
//! accept() → PendingConnection → upgrade() → WebSocketConnection
//! ```
//!
//! # Feature Flags
//!
//! - `websocket` (default): WebSocket transport via `tokio-tungstenite`

#![allow(async_fn_in_trait)]

mod error;
#[cfg(feature = "websocket")]
mod websocket;

pub use error::TransportError;
#[cfg(feature = "websocket")]
pub use websocket::{
    DEFAULT_HANDSHAKE_TIMEOUT, HandshakePolicy, PendingConnection, WebSocketConnection,
    WebSocketTransport,
};

use std::fmt;
use std::time::Duration;

/// Process-unique identifier for an accepted connection.
///
/// Never reused, so it doubles as the peer identity the relay hands out.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ConnectionId(u64);

impl ConnectionId {
    pub fn new(id: u64) -> Self {
        Self(id)
    }

    /// Returns the underlying `u64` value.
    pub fn into_inner(self) -> u64 {
        self.0
    }
}

impl fmt::Display for ConnectionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "conn-{}", self.0)
    }
}

/// A listener for incoming sockets.
pub trait Transport: Send + Sync + 'static {
    /// An accepted socket whose protocol handshake is still to be run.
    type Pending: Upgrade<Connection = Self::Connection, Error = Self::Error>;
    /// The connection type produced by an upgrade.
    type Connection: Connection;
    /// The error type for transport operations.
    type Error: std::error::Error + Send + Sync;

    /// Waits for the next socket.
    ///
    /// Only the TCP accept happens here. The handshake runs in
    /// [`Upgrade::upgrade`], off the accept loop, so a client that never
    /// finishes it holds up nobody else.
    async fn accept(&mut self) -> Result<Self::Pending, Self::Error>;
}

/// Second half of accepting: turns a raw socket into a [`Connection`].
pub trait Upgrade: Send + 'static {
    type Connection: Connection;
    type Error: std::error::Error + Send + Sync;

    /// Runs the handshake. Fails if it is refused or does not finish in time.
    async fn upgrade(self) -> Result<Self::Connection, Self::Error>;
}

/// One client connection carrying opaque frames.
///
/// Implementations must allow `send` to make progress while another task
/// is parked in `recv`.
pub trait Connection: Send + Sync + 'static {
    /// The error type for connection operations.
    type Error: std::error::Error + Send + Sync;

    /// Writes one frame.
    async fn send(&self, data: &[u8]) -> Result<(), Self::Error>;

    /// Reads the next data frame, skipping control frames.
    ///
    /// Every frame read, control frames included, resets
    /// [`idle_for`](Self::idle_for). Returns `Ok(None)` once the peer has
    /// closed the connection.
    async fn recv(&self) -> Result<Option<Vec<u8>>, Self::Error>;

    /// Starts a close handshake.
    async fn close(&self) -> Result<(), Self::Error>;

    /// Sends a WebSocket ping. A healthy peer answers it, which shows up as
    /// activity on the read side.
    async fn ping(&self) -> Result<(), Self::Error>;

    /// Time since the last frame of any kind arrived from the peer.
    ///
    /// Frames are only observed while a task is inside `recv`.
    fn idle_for(&self) -> Duration;

    fn id(&self) -> ConnectionId;
}
