//! Per-connection handler: upgrade, register, read events, fan out, clean up.
//!
//! Each accepted socket gets its own Tokio task running
//! [`handle_connection`], plus a writer task that drains the peer's outbox
//! onto the socket. The flow is:
//!   1. Finish the WebSocket upgrade (bounded by the handshake timeout)
//!   2. Register the peer's outbox with the relay
//!   3. Loop: receive frame → decode → `Relay::handle`
//!   4. On close, error, or keepalive timeout: report `Disconnected`

use std::sync::Arc;
use std::time::Duration;

use ferry_protocol::{ClientEvent, Codec, PeerId};
use ferry_relay::{Inbound, PeerReceiver};
use ferry_transport::{Connection, PendingConnection, Upgrade, WebSocketConnection};
use tokio::time::{Instant, Interval, MissedTickBehavior};

use crate::FerryError;
use crate::server::ServerState;

/// Drop guard that reports the peer as disconnected when the handler exits.
///
/// Runs even if the handler panics. `Drop` is synchronous, so the async
/// lock is taken in a fire-and-forget task.
struct DisconnectGuard<C: Codec> {
    peer: PeerId,
    state: Arc<ServerState<C>>,
}

impl<C: Codec> Drop for DisconnectGuard<C> {
    fn drop(&mut self) {
        let peer = self.peer;
        let state = Arc::clone(&self.state);
        tokio::spawn(async move {
            state.relay.lock().await.handle(peer, Inbound::Disconnected);
        });
    }
}

/// Handles a single connection from accepted socket to close.
///
/// Returns an error if the upgrade fails or the socket breaks; a clean
/// close or a keepalive timeout is `Ok`.
pub(crate) async fn handle_connection<C>(
    pending: PendingConnection,
    state: Arc<ServerState<C>>,
) -> Result<(), FerryError>
where
    C: Codec + Clone,
{
    let conn = Arc::new(pending.upgrade().await?);
    let peer = PeerId::from(conn.id());
    tracing::debug!(%peer, addr = %conn.peer_addr(), "handling new connection");

    let inbox = state.relay.lock().await.connect(peer);
    let _guard = DisconnectGuard {
        peer,
        state: Arc::clone(&state),
    };

    tokio::spawn(write_outbound(
        Arc::clone(&conn),
        inbox,
        state.codec.clone(),
        peer,
        state.keepalive.map(|keepalive| keepalive.interval),
    ));

    loop {
        let received = match state.keepalive {
            Some(keepalive) => tokio::select! {
                received = conn.recv() => received,
                () = silence(&conn, keepalive.timeout) => {
                    tracing::info!(%peer, timeout = ?keepalive.timeout, "no sign of life, closing connection");
                    break;
                }
            },
            None => conn.recv().await,
        };

        let Some(data) = received? else {
            tracing::debug!(%peer, "connection closed cleanly");
            break;
        };

        let inbound = match state.codec.decode::<ClientEvent>(&data) {
            Ok(event) => {
                tracing::trace!(%peer, room_id = %event.room_id(), "event received");
                Inbound::Client(event)
            }
            Err(e) => Inbound::Malformed(e.to_string()),
        };

        state.relay.lock().await.handle(peer, inbound);
    }

    // _guard drops here → relay disconnect fires, outbox closes,
    // writer task drains what is left and exits.
    Ok(())
}

/// Resolves once nothing has arrived on `conn` for `timeout`.
///
/// Must be polled alongside a pending `recv`, which is what observes
/// incoming frames.
async fn silence(conn: &WebSocketConnection, timeout: Duration) {
    loop {
        let idle = conn.idle_for();
        if idle >= timeout {
            return;
        }
        tokio::time::sleep(timeout - idle).await;
    }
}

/// Writes every event queued for `peer` to its socket, in order, and pings
/// the peer every `ping_every` if set.
///
/// Ends when the outbox is closed (peer unregistered or evicted) or the
/// socket refuses a write.
async fn write_outbound<C: Codec>(
    conn: Arc<WebSocketConnection>,
    mut inbox: PeerReceiver,
    codec: C,
    peer: PeerId,
    ping_every: Option<Duration>,
) {
    let mut pings = ping_every.map(|every| {
        let mut interval = tokio::time::interval_at(Instant::now() + every, every);
        interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
        interval
    });

    loop {
        tokio::select! {
            event = inbox.recv() => {
                let Some(event) = event else { break };
                let bytes = match codec.encode(&event) {
                    Ok(bytes) => bytes,
                    Err(e) => {
                        tracing::error!(%peer, error = %e, "failed to encode event");
                        continue;
                    }
                };
                if let Err(e) = conn.send(&bytes).await {
                    tracing::debug!(%peer, error = %e, "send failed, stopping writer");
                    break;
                }
            }
            () = next_ping(&mut pings) => {
                if let Err(e) = conn.ping().await {
                    tracing::debug!(%peer, error = %e, "ping failed, stopping writer");
                    break;
                }
            }
        }
    }

    let _ = conn.close().await;
}

async fn next_ping(pings: &mut Option<Interval>) {
    match pings {
        Some(interval) => {
            interval.tick().await;
        }
        None => std::future::pending().await,
    }
}
