//! Error types for the relay layer.

use ferry_protocol::{PeerId, RoomId};

/// Why a room operation was not applied.
///
/// None of these are faults: they are the expected outcomes of racing
/// clients and stale messages. The [`Relay`](crate::Relay) decides whether
/// the requester hears about them.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum RelayError {
    /// The room does not exist (never created, completed, or cancelled).
    #[error("room {0} not found or expired")]
    NotFound(RoomId),

    /// Only the room's sender may push chunks or complete the transfer.
    #[error("{peer} is not the sender of room {room_id}")]
    NotSender { room_id: RoomId, peer: PeerId },
}
