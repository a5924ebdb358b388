//! Event and identity types that travel on the wire.

use std::fmt;

use ferry_transport::ConnectionId;
use serde::{Deserialize, Serialize};

// ---------------------------------------------------------------------------
// Identity types
// ---------------------------------------------------------------------------

/// Identifier of a transfer room.
///
/// Chosen by the sending client and opaque to the server. Serialized as a
/// plain JSON string.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RoomId(pub String);

impl RoomId {
    /// Returns the identifier as a string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<&str> for RoomId {
    fn from(id: &str) -> Self {
        Self(id.to_string())
    }
}

impl From<String> for RoomId {
    fn from(id: String) -> Self {
        Self(id)
    }
}

impl fmt::Display for RoomId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Identity of one live connection as seen by clients.
///
/// Derived from the transport's [`ConnectionId`]; serialized as a plain
/// number so the sender can tell recipients apart.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PeerId(pub u64);

impl From<ConnectionId> for PeerId {
    fn from(id: ConnectionId) -> Self {
        Self(id.into_inner())
    }
}

impl fmt::Display for PeerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "peer-{}", self.0)
    }
}

// ---------------------------------------------------------------------------
// File metadata
// ---------------------------------------------------------------------------

/// Description of the file being offered in a room.
///
/// Fixed at room creation and handed verbatim to every recipient that joins.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FileMetadata {
    pub file_name: String,
    /// Size in bytes.
    pub file_size: u64,
    /// MIME type, e.g. `text/plain`.
    pub file_type: String,
    pub total_chunks: u64,
}

// ---------------------------------------------------------------------------
// Events
// ---------------------------------------------------------------------------

/// Events a client sends to the relay.
///
/// Connection close is not an event on the wire; the server synthesizes it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(
    tag = "event",
    content = "data",
    rename_all = "kebab-case",
    rename_all_fields = "camelCase"
)]
pub enum ClientEvent {
    /// Open a room for a file this client is about to send.
    CreateRoom {
        room_id: RoomId,
        metadata: FileMetadata,
    },

    /// Ask to receive the file offered in a room.
    JoinRoom(RoomId),

    /// One slice of the file, pushed by the room's sender.
    FileChunk {
        chunk: Vec<u8>,
        room_id: RoomId,
        chunk_index: u64,
        total_chunks: u64,
    },

    /// The sender has pushed every chunk.
    TransferComplete(RoomId),
}

impl ClientEvent {
    /// Returns the room this event targets.
    pub fn room_id(&self) -> &RoomId {
        match self {
            Self::CreateRoom { room_id, .. }
            | Self::FileChunk { room_id, .. }
            | Self::JoinRoom(room_id)
            | Self::TransferComplete(room_id) => room_id,
        }
    }
}

/// Events the relay sends to clients.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(
    tag = "event",
    content = "data",
    rename_all = "kebab-case",
    rename_all_fields = "camelCase"
)]
pub enum ServerEvent {
    /// To the creator: the room is open.
    RoomCreated { room_id: RoomId },

    /// To the requester: the request could not be served.
    RoomError(String),

    /// To a joining recipient: what is about to arrive.
    ReadyToReceive { metadata: FileMetadata },

    /// To the sender: a recipient joined and has the metadata.
    RecipientJoined { recipient_id: PeerId, room_id: RoomId },

    /// To recipients: one relayed chunk.
    ReceiveChunk {
        chunk: Vec<u8>,
        chunk_index: u64,
        total_chunks: u64,
    },

    /// To recipients: the sender finished.
    TransferComplete,

    /// To the room: the transfer ended abnormally.
    TransferCancelled(String),
}
