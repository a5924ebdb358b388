//! Outbound channels for connected peers.

use std::collections::HashMap;

use ferry_protocol::{PeerId, ServerEvent};
use tokio::sync::mpsc;
use tokio::sync::mpsc::error::TrySendError;

use crate::Outbound;

/// Channel sender for delivering events to one peer's connection task.
pub type PeerSender = mpsc::Sender<ServerEvent>;
/// The receiving half, drained by the peer's writer task.
pub type PeerReceiver = mpsc::Receiver<ServerEvent>;

/// Maps each connected peer to its outbox.
///
/// Delivery never waits. Events for peers that are gone are dropped. A peer
/// whose outbox is full has fallen too far behind the sender: it is
/// evicted, which closes its outbox and, through its writer task, its
/// socket.
#[derive(Debug, Default)]
pub struct PeerDirectory {
    peers: HashMap<PeerId, PeerSender>,
}

impl PeerDirectory {
    pub fn new() -> Self {
        Self {
            peers: HashMap::new(),
        }
    }

    /// Registers a peer's outbox, replacing any previous one.
    pub fn register(&mut self, peer: PeerId, sender: PeerSender) {
        self.peers.insert(peer, sender);
    }

    /// Drops a peer's outbox. Its writer task sees the channel close.
    pub fn unregister(&mut self, peer: PeerId) -> bool {
        self.peers.remove(&peer).is_some()
    }

    pub fn is_connected(&self, peer: PeerId) -> bool {
        self.peers.contains_key(&peer)
    }

    pub fn len(&self) -> usize {
        self.peers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.peers.is_empty()
    }

    /// Sends one event to one peer. Returns `false` if it was dropped.
    pub fn send_to(&mut self, peer: PeerId, event: ServerEvent) -> bool {
        let Some(sender) = self.peers.get(&peer) else {
            return false;
        };
        match sender.try_send(event) {
            Ok(()) => true,
            Err(TrySendError::Full(_)) => {
                tracing::warn!(
                    %peer,
                    capacity = sender.max_capacity(),
                    "outbox full, evicting slow peer"
                );
                self.peers.remove(&peer);
                false
            }
            Err(TrySendError::Closed(_)) => false,
        }
    }

    /// Delivers a batch in order. Returns how many events were enqueued.
    pub fn dispatch(&mut self, outbound: Vec<Outbound>) -> usize {
        let mut delivered = 0;
        for Outbound { to, event } in outbound {
            if self.send_to(to, event) {
                delivered += 1;
            } else {
                tracing::trace!(peer = %to, "dropping event for unknown peer");
            }
        }
        delivered
    }
}
