//! Wire protocol for Ferry.
//!
//! This crate defines what travels between browser clients and the relay:
//!
//! - **Types** ([`ClientEvent`], [`ServerEvent`], [`FileMetadata`], ids):
//!   the named events and their payloads.
//! - **Codec** ([`Codec`] trait, [`JsonCodec`]): how events become bytes.
//! - **Errors** ([`ProtocolError`]): what can go wrong on the way.
//!
//! Every event is an envelope of the form
//! `{"event": "<kebab-case-name>", "data": <payload>}` with camelCase
//! payload fields.
//!
//! ```text
//! Transport (bytes) → Protocol (events) → Relay (rooms)
//! ```

mod codec;
mod error;
mod types;

pub use codec::Codec;
#[cfg(feature = "json")]
pub use codec::JsonCodec;
pub use error::ProtocolError;
pub use types::{ClientEvent, FileMetadata, PeerId, RoomId, ServerEvent};
