//! The relay: one entry point for every inbound event.
//!
//! [`Relay::handle`] runs the registry operation for an event, maps the
//! outcome to what the requester should hear (a `room-error` for a failed
//! join, nothing for an unauthorized chunk), and pushes the resulting
//! events onto the peers' outboxes. The server keeps one `Relay` behind a
//! single mutex, so every event and its fan-out are applied atomically.

use ferry_protocol::{ClientEvent, PeerId, ServerEvent};

use tokio::sync::mpsc;

use crate::{Outbound, PeerDirectory, PeerReceiver, RelayConfig, RelayError, RoomRegistry};

/// Message sent to a requester whose frame could not be decoded.
const INVALID_MESSAGE: &str = "Invalid message";

/// Everything the connection layer can report about a peer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Inbound {
    /// A decoded client event.
    Client(ClientEvent),
    /// A frame that could not be decoded; carries the decode error.
    Malformed(String),
    /// The connection closed, cleanly or not.
    Disconnected,
}

impl From<ClientEvent> for Inbound {
    fn from(event: ClientEvent) -> Self {
        Self::Client(event)
    }
}

/// Room registry plus the outboxes of every connected peer.
#[derive(Debug, Default)]
pub struct Relay {
    registry: RoomRegistry,
    peers: PeerDirectory,
    config: RelayConfig,
}

impl Relay {
    pub fn new(config: RelayConfig) -> Self {
        Self {
            registry: RoomRegistry::new(),
            peers: PeerDirectory::new(),
            config,
        }
    }

    pub fn config(&self) -> &RelayConfig {
        &self.config
    }

    pub fn registry(&self) -> &RoomRegistry {
        &self.registry
    }

    pub fn peers(&self) -> &PeerDirectory {
        &self.peers
    }

    /// Registers a newly accepted peer and returns the receiving end of
    /// its outbox, sized by [`RelayConfig::outbox_capacity`].
    pub fn connect(&mut self, peer: PeerId) -> PeerReceiver {
        let (sender, receiver) = mpsc::channel(self.config.outbox_capacity.max(1));
        tracing::debug!(%peer, "peer connected");
        self.peers.register(peer, sender);
        receiver
    }

    /// Applies one inbound event from `peer` and delivers the fan-out.
    pub fn handle(&mut self, peer: PeerId, inbound: Inbound) {
        let outbound = match inbound {
            Inbound::Client(event) => self.apply(peer, event),
            Inbound::Malformed(reason) => {
                tracing::debug!(%peer, %reason, "malformed message");
                vec![Outbound::new(
                    peer,
                    ServerEvent::RoomError(INVALID_MESSAGE.to_string()),
                )]
            }
            Inbound::Disconnected => {
                let cancelled = self.registry.disconnect(peer);
                self.peers.dispatch(cancelled);
                self.peers.unregister(peer);
                tracing::debug!(%peer, "peer disconnected");
                return;
            }
        };
        self.peers.dispatch(outbound);
    }

    /// Cancels idle rooms if a TTL is configured. Returns how many rooms
    /// were removed.
    pub fn sweep(&mut self) -> usize {
        let Some(ttl) = self.config.room_ttl else {
            return 0;
        };
        let before = self.registry.room_count();
        let cancelled = self.registry.expire_idle(ttl);
        self.peers.dispatch(cancelled);
        before - self.registry.room_count()
    }

    fn apply(&mut self, peer: PeerId, event: ClientEvent) -> Vec<Outbound> {
        match event {
            ClientEvent::CreateRoom { room_id, metadata } => {
                self.registry.create(room_id, metadata, peer)
            }
            ClientEvent::JoinRoom(room_id) => {
                match self.registry.join(&room_id, peer) {
                    Ok(out) => out,
                    Err(e) => {
                        tracing::debug!(%peer, error = %e, "join refused");
                        vec![Outbound::new(peer, ServerEvent::RoomError(e.to_string()))]
                    }
                }
            }
            ClientEvent::FileChunk {
                chunk,
                room_id,
                chunk_index,
                total_chunks,
            } => self
                .registry
                .relay_chunk(&room_id, peer, chunk, chunk_index, total_chunks)
                .unwrap_or_else(|e| dropped(peer, "file-chunk", e)),
            ClientEvent::TransferComplete(room_id) => self
                .registry
                .complete_transfer(&room_id, peer)
                .unwrap_or_else(|e| dropped(peer, "transfer-complete", e)),
        }
    }
}

fn dropped(peer: PeerId, event: &str, error: RelayError) -> Vec<Outbound> {
    tracing::debug!(%peer, event, error = %error, "dropping unauthorized request");
    Vec::new()
}
