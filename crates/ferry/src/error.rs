//! Unified error type for the Ferry server.

use ferry_transport::TransportError;

/// Errors that stop a server from starting or end a connection early.
///
/// Decode failures and refused room operations never show up here: the
/// relay answers those on the wire and the connection carries on.
#[derive(Debug, thiserror::Error)]
pub enum FerryError {
    /// A transport-level error: bind, accept, refused or stalled upgrade,
    /// or socket I/O.
    #[error(transparent)]
    Transport(#[from] TransportError),

    /// A configuration value could not be used.
    #[error("invalid config {key}: {reason}")]
    Config { key: String, reason: String },
}
