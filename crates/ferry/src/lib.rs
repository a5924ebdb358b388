//! # Ferry
//!
//! Signaling and chunk relay server for browser-to-browser file transfers.
//!
//! A sender opens a room describing a file, recipients join it, and the
//! sender's chunks are relayed to them over WebSockets. The server never
//! stores the file; it only tracks who is sending to whom.
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use ferry::prelude::*;
//!
//! # async fn run() -> Result<(), FerryError> {
//! let config = ServerConfig::from_env()?;
//! let server = FerryServerBuilder::from_config(config).build().await?;
//! server.run().await
//! # }
//! ```

mod config;
mod error;
mod handler;
mod server;

pub use config::{Keepalive, ServerConfig};
pub use error::FerryError;
pub use server::{FerryServer, FerryServerBuilder};

/// Everything needed to run a server or talk to one from Rust.
pub mod prelude {
    pub use crate::{FerryError, FerryServer, FerryServerBuilder, Keepalive, ServerConfig};
    pub use ferry_protocol::{
        ClientEvent, Codec, FileMetadata, JsonCodec, PeerId, RoomId, ServerEvent,
    };
    pub use ferry_relay::RelayConfig;
}
