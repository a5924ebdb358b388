//! A single transfer room.

use ferry_protocol::{FileMetadata, PeerId};
use tokio::time::Instant;

/// Coordination state of one file transfer: one sender, one file, any
/// number of recipients.
///
/// `sender` and `metadata` are fixed at creation. `recipients` keeps join
/// order and may hold the same peer twice if it joined twice.
#[derive(Debug, Clone)]
pub struct Room {
    sender: PeerId,
    metadata: FileMetadata,
    recipients: Vec<PeerId>,
    last_activity: Instant,
}

impl Room {
    pub(crate) fn new(sender: PeerId, metadata: FileMetadata) -> Self {
        Self {
            sender,
            metadata,
            recipients: Vec::new(),
            last_activity: Instant::now(),
        }
    }

    /// The peer that created the room.
    pub fn sender(&self) -> PeerId {
        self.sender
    }

    pub fn metadata(&self) -> &FileMetadata {
        &self.metadata
    }

    /// Recipients in join order.
    pub fn recipients(&self) -> &[PeerId] {
        &self.recipients
    }

    /// When the room last saw a create, join, or chunk.
    pub fn last_activity(&self) -> Instant {
        self.last_activity
    }

    pub fn is_sender(&self, peer: PeerId) -> bool {
        self.sender == peer
    }

    pub(crate) fn add_recipient(&mut self, peer: PeerId) {
        self.recipients.push(peer);
    }

    pub(crate) fn touch(&mut self) {
        self.last_activity = Instant::now();
    }

    /// The room's broadcast group: sender first, then recipients, each
    /// peer at most once.
    pub fn members(&self) -> Vec<PeerId> {
        let mut members = Vec::with_capacity(self.recipients.len() + 1);
        members.push(self.sender);
        for peer in &self.recipients {
            if !members.contains(peer) {
                members.push(*peer);
            }
        }
        members
    }

    /// The broadcast group minus the sender.
    pub fn audience(&self) -> Vec<PeerId> {
        self.members()
            .into_iter()
            .filter(|peer| *peer != self.sender)
            .collect()
    }
}
