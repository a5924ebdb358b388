//! Room lifecycle and chunk relay for Ferry.
//!
//! A sender opens a room describing a file, recipients join it, and the
//! sender's chunks are fanned out to them. Nothing is stored: a room lives
//! in memory from `create-room` until the sender completes, disconnects,
//! replaces it, or (optionally) lets it go idle.
//!
//! # Key types
//!
//! - [`RoomRegistry`]: the room state machine; pure, returns [`Outbound`]s
//! - [`Relay`]: registry plus connected peers; the single event handler
//! - [`PeerDirectory`]: per-peer outbound channels
//! - [`RelayConfig`]: idle-room expiry settings
//!
//! ```text
//! CREATED → (join)* → ACTIVE → (complete | sender gone | replaced | expired) → removed
//! ```

mod config;
mod directory;
mod error;
mod registry;
mod relay;
mod room;

pub use config::{DEFAULT_OUTBOX_CAPACITY, RelayConfig};
pub use directory::{PeerDirectory, PeerReceiver, PeerSender};
pub use error::RelayError;
pub use registry::{Outbound, RoomRegistry};
pub use relay::{Inbound, Relay};
pub use room::Room;
