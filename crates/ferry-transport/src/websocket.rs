//! WebSocket transport implementation using `tokio-tungstenite`.

use std::net::SocketAddr;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use futures_util::stream::{SplitSink, SplitStream};
use futures_util::{SinkExt, StreamExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::Mutex;
use tokio::time::Instant;
use tokio_tungstenite::WebSocketStream;
use tokio_tungstenite::tungstenite::handshake::server::{
    ErrorResponse, Request, Response,
};
use tokio_tungstenite::tungstenite::http::{StatusCode, header};
use tokio_tungstenite::tungstenite::{self, Message};

use crate::{Connection, ConnectionId, Transport, TransportError, Upgrade};

/// Counter for generating unique connection IDs.
static NEXT_CONNECTION_ID: AtomicU64 = AtomicU64::new(1);

/// How long an accepted socket may take to complete its upgrade.
pub const DEFAULT_HANDSHAKE_TIMEOUT: Duration = Duration::from_secs(10);

type WsStream = WebSocketStream<TcpStream>;

/// Rules applied to every HTTP upgrade request before it becomes a
/// WebSocket connection.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct HandshakePolicy {
    /// Required request path. `None` accepts any path.
    pub path: Option<String>,

    /// Browser origin allowed to connect. `None` or `"*"` accepts any.
    /// Requests without an `Origin` header are always accepted.
    pub allowed_origin: Option<String>,
}

impl HandshakePolicy {
    /// Returns the status to refuse the request with, or `None` to accept.
    pub fn evaluate(&self, path: &str, origin: Option<&str>) -> Option<StatusCode> {
        if let Some(expected) = &self.path {
            if path != expected.as_str() {
                return Some(StatusCode::NOT_FOUND);
            }
        }

        match (self.allowed_origin.as_deref(), origin) {
            (None, _) | (Some("*"), _) | (_, None) => None,
            (Some(allowed), Some(origin)) if allowed == origin => None,
            _ => Some(StatusCode::FORBIDDEN),
        }
    }

    fn check(&self, request: &Request) -> Result<(), ErrorResponse> {
        let origin = request
            .headers()
            .get(header::ORIGIN)
            .and_then(|v| v.to_str().ok());

        match self.evaluate(request.uri().path(), origin) {
            None => Ok(()),
            Some(status) => {
                tracing::debug!(
                    path = request.uri().path(),
                    origin = origin.unwrap_or("-"),
                    %status,
                    "refusing WebSocket upgrade"
                );
                let mut refusal = ErrorResponse::new(Some(
                    status.canonical_reason().unwrap_or("refused").to_string(),
                ));
                *refusal.status_mut() = status;
                Err(refusal)
            }
        }
    }
}

/// A WebSocket-based [`Transport`] that listens for incoming connections.
pub struct WebSocketTransport {
    listener: TcpListener,
    policy: HandshakePolicy,
    handshake_timeout: Duration,
}

impl WebSocketTransport {
    /// Binds a new WebSocket transport that accepts every upgrade request.
    pub async fn bind(addr: &str) -> Result<Self, TransportError> {
        Self::bind_with(addr, HandshakePolicy::default()).await
    }

    /// Binds a new WebSocket transport that enforces `policy` on upgrades.
    pub async fn bind_with(
        addr: &str,
        policy: HandshakePolicy,
    ) -> Result<Self, TransportError> {
        let listener = TcpListener::bind(addr).await.map_err(|source| {
            TransportError::Bind {
                addr: addr.to_string(),
                source,
            }
        })?;
        tracing::info!(addr, ?policy, "WebSocket transport listening");
        Ok(Self {
            listener,
            policy,
            handshake_timeout: DEFAULT_HANDSHAKE_TIMEOUT,
        })
    }

    /// Sets how long an accepted socket may take to send a valid upgrade.
    pub fn with_handshake_timeout(mut self, timeout: Duration) -> Self {
        self.handshake_timeout = timeout;
        self
    }

    /// Returns the address the listener is bound to.
    pub fn local_addr(&self) -> std::io::Result<SocketAddr> {
        self.listener.local_addr()
    }
}

impl Transport for WebSocketTransport {
    type Pending = PendingConnection;
    type Connection = WebSocketConnection;
    type Error = TransportError;

    async fn accept(&mut self) -> Result<Self::Pending, Self::Error> {
        let (stream, addr) = self
            .listener
            .accept()
            .await
            .map_err(TransportError::Accept)?;
        tracing::trace!(%addr, "accepted TCP connection");

        Ok(PendingConnection {
            stream,
            addr,
            policy: self.policy.clone(),
            timeout: self.handshake_timeout,
        })
    }
}

/// A TCP socket that has been accepted but not yet upgraded.
///
/// Call [`Upgrade::upgrade`] from the task that will own the connection.
pub struct PendingConnection {
    stream: TcpStream,
    addr: SocketAddr,
    policy: HandshakePolicy,
    timeout: Duration,
}

impl PendingConnection {
    /// Returns the remote address of the socket.
    pub fn peer_addr(&self) -> SocketAddr {
        self.addr
    }
}

impl Upgrade for PendingConnection {
    type Connection = WebSocketConnection;
    type Error = TransportError;

    async fn upgrade(self) -> Result<Self::Connection, Self::Error> {
        let Self {
            stream,
            addr,
            policy,
            timeout,
        } = self;

        let handshake = tokio_tungstenite::accept_hdr_async(
            stream,
            move |request: &Request, response: Response| {
                policy.check(request).map(|()| response)
            },
        );
        let ws = tokio::time::timeout(timeout, handshake)
            .await
            .map_err(|_| TransportError::HandshakeTimeout { addr, timeout })?
            .map_err(|e| match e {
                tungstenite::Error::Http(refusal) => TransportError::Rejected {
                    addr,
                    status: refusal.status().as_u16(),
                },
                other => TransportError::WebSocket(other),
            })?;

        let id = ConnectionId::new(
            NEXT_CONNECTION_ID.fetch_add(1, Ordering::Relaxed),
        );
        tracing::debug!(%id, %addr, "accepted WebSocket connection");

        let (sink, stream) = ws.split();
        Ok(WebSocketConnection {
            id,
            addr,
            sink: Mutex::new(sink),
            stream: Mutex::new(stream),
            opened: Instant::now(),
            last_seen_ms: AtomicU64::new(0),
        })
    }
}

/// A single WebSocket connection.
///
/// The socket is split so that a task parked in [`Connection::recv`] does
/// not hold up outbound sends from another task.
pub struct WebSocketConnection {
    id: ConnectionId,
    addr: SocketAddr,
    sink: Mutex<SplitSink<WsStream, Message>>,
    stream: Mutex<SplitStream<WsStream>>,
    opened: Instant,
    /// Milliseconds after `opened` at which the last frame arrived.
    last_seen_ms: AtomicU64,
}

impl WebSocketConnection {
    /// Returns the remote address of the peer.
    pub fn peer_addr(&self) -> SocketAddr {
        self.addr
    }

    fn mark_seen(&self) {
        let now = u64::try_from(self.opened.elapsed().as_millis()).unwrap_or(u64::MAX);
        self.last_seen_ms.store(now, Ordering::Relaxed);
    }
}

impl Connection for WebSocketConnection {
    type Error = TransportError;

    async fn send(&self, data: &[u8]) -> Result<(), Self::Error> {
        let msg = Message::Binary(data.to_vec().into());
        self.sink.lock().await.send(msg).await?;
        Ok(())
    }

    async fn recv(&self) -> Result<Option<Vec<u8>>, Self::Error> {
        let mut stream = self.stream.lock().await;
        loop {
            let frame = stream.next().await;
            if let Some(Ok(_)) = &frame {
                self.mark_seen();
            }
            match frame {
                Some(Ok(Message::Binary(data))) => {
                    return Ok(Some(data.into()));
                }
                Some(Ok(Message::Text(text))) => {
                    return Ok(Some(text.as_bytes().to_vec()));
                }
                Some(Ok(Message::Close(_))) | None => return Ok(None),
                Some(Ok(_)) => continue, // ping/pong/raw frame
                Some(Err(e)) => return Err(e.into()),
            }
        }
    }

    async fn close(&self) -> Result<(), Self::Error> {
        self.sink.lock().await.close().await?;
        Ok(())
    }

    async fn ping(&self) -> Result<(), Self::Error> {
        self.sink
            .lock()
            .await
            .send(Message::Ping(Vec::new().into()))
            .await?;
        Ok(())
    }

    fn idle_for(&self) -> Duration {
        let last_seen = Duration::from_millis(self.last_seen_ms.load(Ordering::Relaxed));
        self.opened.elapsed().saturating_sub(last_seen)
    }

    fn id(&self) -> ConnectionId {
        self.id
    }
}
