//! `FerryServer` builder and accept loop.
//!
//! Ties the layers together: transport → protocol → relay.

use std::sync::Arc;
use std::time::Duration;

use ferry_protocol::{Codec, JsonCodec};
use ferry_relay::{Relay, RelayConfig};
use ferry_transport::{Transport, TransportError, WebSocketTransport};
use tokio::sync::Mutex;

use crate::handler::handle_connection;
use crate::{FerryError, Keepalive, ServerConfig};

/// Shared server state passed to each connection handler task.
///
/// The relay sits behind one mutex: every room operation and its fan-out
/// happen while holding it.
pub(crate) struct ServerState<C: Codec> {
    pub(crate) relay: Mutex<Relay>,
    pub(crate) codec: C,
    pub(crate) keepalive: Option<Keepalive>,
}

/// Builder for configuring and starting a Ferry server.
///
/// # Example
///
/// ```rust,no_run
/// use ferry::FerryServer;
///
/// # async fn run() -> Result<(), ferry::FerryError> {
/// let server = FerryServer::builder()
///     .bind("0.0.0.0:3001")
///     .allowed_origin("https://files.example.com")
///     .build()
///     .await?;
/// server.run().await
/// # }
/// ```
pub struct FerryServerBuilder {
    config: ServerConfig,
}

impl FerryServerBuilder {
    /// Creates a new builder with default settings.
    pub fn new() -> Self {
        Self {
            config: ServerConfig::default(),
        }
    }

    /// Starts from an existing configuration, e.g. [`ServerConfig::from_env`].
    pub fn from_config(config: ServerConfig) -> Self {
        Self { config }
    }

    /// Sets the address to bind the server to.
    pub fn bind(mut self, addr: &str) -> Self {
        self.config.bind_addr = addr.to_string();
        self
    }

    /// Sets the required WebSocket path.
    pub fn path(mut self, path: &str) -> Self {
        self.config.path = Some(path.to_string());
        self
    }

    /// Accepts upgrades on any path.
    pub fn any_path(mut self) -> Self {
        self.config.path = None;
        self
    }

    /// Sets the browser origin allowed to connect.
    pub fn allowed_origin(mut self, origin: &str) -> Self {
        self.config.allowed_origin = Some(origin.to_string());
        self
    }

    /// Pings every `interval` and closes connections from which nothing
    /// arrives for `timeout`.
    pub fn keepalive(mut self, interval: Duration, timeout: Duration) -> Self {
        self.config.keepalive = Some(Keepalive { interval, timeout });
        self
    }

    /// Never pings and never closes a connection for being quiet.
    pub fn without_keepalive(mut self) -> Self {
        self.config.keepalive = None;
        self
    }

    /// Sets how long an accepted socket may take to finish its upgrade.
    pub fn handshake_timeout(mut self, timeout: Duration) -> Self {
        self.config.handshake_timeout = timeout;
        self
    }

    /// Sets the room registry configuration.
    pub fn relay_config(mut self, relay: RelayConfig) -> Self {
        self.config.relay = relay;
        self
    }

    /// Binds the listener. Uses `JsonCodec` and `WebSocketTransport`.
    pub async fn build(self) -> Result<FerryServer<JsonCodec>, FerryError> {
        let transport = WebSocketTransport::bind_with(
            &self.config.bind_addr,
            self.config.handshake_policy(),
        )
        .await?
        .with_handshake_timeout(self.config.handshake_timeout);

        let state = Arc::new(ServerState {
            relay: Mutex::new(Relay::new(self.config.relay.clone())),
            codec: JsonCodec,
            keepalive: self.config.keepalive,
        });

        Ok(FerryServer { transport, state })
    }
}

impl Default for FerryServerBuilder {
    fn default() -> Self {
        Self::new()
    }
}

/// A bound Ferry relay server.
///
/// Call [`run()`](Self::run) to start accepting connections.
pub struct FerryServer<C: Codec> {
    transport: WebSocketTransport,
    state: Arc<ServerState<C>>,
}

impl FerryServer<JsonCodec> {
    /// Creates a new builder.
    pub fn builder() -> FerryServerBuilder {
        FerryServerBuilder::new()
    }
}

impl<C> FerryServer<C>
where
    C: Codec + Clone,
{
    /// Returns the local address the server is bound to.
    pub fn local_addr(&self) -> std::io::Result<std::net::SocketAddr> {
        self.transport.local_addr()
    }

    /// Runs the accept loop until the process is terminated.
    ///
    /// Each accepted socket gets its own task, which also runs the
    /// WebSocket upgrade. If a room TTL is configured, an idle-room sweep
    /// runs alongside.
    pub async fn run(mut self) -> Result<(), FerryError> {
        tracing::info!(addr = ?self.local_addr().ok(), "Ferry server running");

        spawn_sweeper(Arc::clone(&self.state)).await;

        loop {
            match self.transport.accept().await {
                Ok(pending) => {
                    let state = Arc::clone(&self.state);
                    tokio::spawn(async move {
                        match handle_connection(pending, state).await {
                            Ok(()) => {}
                            Err(FerryError::Transport(
                                e @ (TransportError::Rejected { .. }
                                | TransportError::HandshakeTimeout { .. }),
                            )) => {
                                tracing::debug!(error = %e, "upgrade refused");
                            }
                            Err(e) => {
                                tracing::debug!(error = %e, "connection ended with error");
                            }
                        }
                    });
                }
                Err(e) => {
                    tracing::error!(error = %e, "accept failed");
                }
            }
        }
    }
}

/// Starts the idle-room sweep if the relay has a TTL.
async fn spawn_sweeper<C: Codec>(state: Arc<ServerState<C>>) {
    let config = state.relay.lock().await.config().clone();
    let Some(ttl) = config.room_ttl else {
        return;
    };
    tracing::info!(?ttl, interval = ?config.sweep_interval, "idle room sweep enabled");

    tokio::spawn(async move {
        let mut interval = tokio::time::interval(config.sweep_interval);
        interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
        loop {
            interval.tick().await;
            let expired = state.relay.lock().await.sweep();
            if expired > 0 {
                tracing::info!(expired, "idle rooms cancelled");
            }
        }
    });
}
