//! Room registry: the transfer state machine.
//!
//! Every operation mutates the room map and returns the events it wants
//! delivered, already resolved to concrete peers. The registry never does
//! I/O itself, so a caller holding it behind one lock gets each operation
//! and its fan-out applied atomically.

use std::collections::HashMap;
use std::time::Duration;

use ferry_protocol::{FileMetadata, PeerId, RoomId, ServerEvent};

use crate::{RelayError, Room};

/// Reason broadcast when a sender's connection goes away.
pub(crate) const SENDER_DISCONNECTED: &str = "Sender disconnected";
/// Reason broadcast when a room is overwritten by a new `create-room`.
pub(crate) const ROOM_REPLACED: &str = "Room replaced";
/// Reason broadcast when the idle sweep removes a room.
pub(crate) const ROOM_EXPIRED: &str = "Room expired";

/// One event addressed to one peer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Outbound {
    pub to: PeerId,
    pub event: ServerEvent,
}

impl Outbound {
    pub fn new(to: PeerId, event: ServerEvent) -> Self {
        Self { to, event }
    }
}

fn fan_out(peers: &[PeerId], event: &ServerEvent) -> Vec<Outbound> {
    peers
        .iter()
        .map(|peer| Outbound::new(*peer, event.clone()))
        .collect()
}

/// All active rooms, keyed by identifier.
///
/// A room is present exactly while its transfer is live; removal is the
/// only terminal state.
#[derive(Debug, Default)]
pub struct RoomRegistry {
    rooms: HashMap<RoomId, Room>,
}

impl RoomRegistry {
    /// Creates an empty registry.
    pub fn new() -> Self {
        Self {
            rooms: HashMap::new(),
        }
    }

    /// Opens a room with `requester` as its sender.
    ///
    /// Always succeeds. An existing room under the same identifier is
    /// replaced; its group (minus the new creator) is told the transfer was
    /// cancelled so nobody is left waiting on a room that no longer exists.
    pub fn create(
        &mut self,
        room_id: RoomId,
        metadata: FileMetadata,
        requester: PeerId,
    ) -> Vec<Outbound> {
        let mut out = Vec::new();

        let room = Room::new(requester, metadata);
        if let Some(old) = self.rooms.insert(room_id.clone(), room) {
            let orphans: Vec<PeerId> = old
                .members()
                .into_iter()
                .filter(|peer| *peer != requester)
                .collect();
            tracing::info!(
                %room_id,
                old_sender = %old.sender(),
                orphans = orphans.len(),
                "room replaced"
            );
            out.extend(fan_out(
                &orphans,
                &ServerEvent::TransferCancelled(ROOM_REPLACED.to_string()),
            ));
        }

        tracing::info!(%room_id, sender = %requester, "room created");
        out.push(Outbound::new(
            requester,
            ServerEvent::RoomCreated { room_id },
        ));
        out
    }

    /// Admits `requester` as a recipient.
    ///
    /// The joiner's `ready-to-receive` always precedes the sender's
    /// `recipient-joined` in the returned list.
    pub fn join(
        &mut self,
        room_id: &RoomId,
        requester: PeerId,
    ) -> Result<Vec<Outbound>, RelayError> {
        let room = self
            .rooms
            .get_mut(room_id)
            .ok_or_else(|| RelayError::NotFound(room_id.clone()))?;

        let ready = Outbound::new(
            requester,
            ServerEvent::ReadyToReceive {
                metadata: room.metadata().clone(),
            },
        );
        room.add_recipient(requester);
        room.touch();
        let joined = Outbound::new(
            room.sender(),
            ServerEvent::RecipientJoined {
                recipient_id: requester,
                room_id: room_id.clone(),
            },
        );

        tracing::info!(
            %room_id,
            recipient = %requester,
            recipients = room.recipients().len(),
            "recipient joined"
        );
        Ok(vec![ready, joined])
    }

    /// Fans a chunk out to every recipient of the room.
    ///
    /// Only the room's sender may do this. Chunk index and count are passed
    /// through untouched.
    pub fn relay_chunk(
        &mut self,
        room_id: &RoomId,
        requester: PeerId,
        chunk: Vec<u8>,
        chunk_index: u64,
        total_chunks: u64,
    ) -> Result<Vec<Outbound>, RelayError> {
        let room = self.sender_room_mut(room_id, requester)?;
        room.touch();

        let event = ServerEvent::ReceiveChunk {
            chunk,
            chunk_index,
            total_chunks,
        };
        Ok(fan_out(&room.audience(), &event))
    }

    /// Ends the transfer normally and removes the room.
    pub fn complete_transfer(
        &mut self,
        room_id: &RoomId,
        requester: PeerId,
    ) -> Result<Vec<Outbound>, RelayError> {
        self.sender_room_mut(room_id, requester)?;
        let Some(room) = self.rooms.remove(room_id) else {
            return Err(RelayError::NotFound(room_id.clone()));
        };

        tracing::info!(%room_id, "transfer complete");
        Ok(fan_out(&room.audience(), &ServerEvent::TransferComplete))
    }

    /// Cancels and removes every room `peer` was sending.
    ///
    /// Rooms where `peer` is only a recipient are left alone.
    pub fn disconnect(&mut self, peer: PeerId) -> Vec<Outbound> {
        let mut owned: Vec<RoomId> = self
            .rooms
            .iter()
            .filter(|(_, room)| room.is_sender(peer))
            .map(|(room_id, _)| room_id.clone())
            .collect();
        owned.sort();

        let event = ServerEvent::TransferCancelled(SENDER_DISCONNECTED.to_string());
        let mut out = Vec::new();
        for room_id in owned {
            if let Some(room) = self.rooms.remove(&room_id) {
                tracing::info!(%room_id, sender = %peer, "sender disconnected, transfer cancelled");
                out.extend(fan_out(&room.audience(), &event));
            }
        }
        out
    }

    /// Cancels and removes rooms with no activity for at least `ttl`.
    pub fn expire_idle(&mut self, ttl: Duration) -> Vec<Outbound> {
        let mut stale: Vec<RoomId> = self
            .rooms
            .iter()
            .filter(|(_, room)| room.last_activity().elapsed() >= ttl)
            .map(|(room_id, _)| room_id.clone())
            .collect();
        stale.sort();

        let event = ServerEvent::TransferCancelled(ROOM_EXPIRED.to_string());
        let mut out = Vec::new();
        for room_id in stale {
            if let Some(room) = self.rooms.remove(&room_id) {
                tracing::info!(%room_id, "idle room expired");
                out.extend(fan_out(&room.members(), &event));
            }
        }
        out
    }

    /// Returns the room under `room_id`, if active.
    pub fn get(&self, room_id: &RoomId) -> Option<&Room> {
        self.rooms.get(room_id)
    }

    pub fn contains(&self, room_id: &RoomId) -> bool {
        self.rooms.contains_key(room_id)
    }

    /// Returns the number of active rooms.
    pub fn room_count(&self) -> usize {
        self.rooms.len()
    }

    /// Lists active room identifiers in sorted order.
    pub fn room_ids(&self) -> Vec<RoomId> {
        let mut ids: Vec<RoomId> = self.rooms.keys().cloned().collect();
        ids.sort();
        ids
    }

    fn sender_room_mut(
        &mut self,
        room_id: &RoomId,
        requester: PeerId,
    ) -> Result<&mut Room, RelayError> {
        let room = self
            .rooms
            .get_mut(room_id)
            .ok_or_else(|| RelayError::NotFound(room_id.clone()))?;
        if !room.is_sender(requester) {
            return Err(RelayError::NotSender {
                room_id: room_id.clone(),
                peer: requester,
            });
        }
        Ok(room)
    }
}
