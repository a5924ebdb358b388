//! Relay configuration.

use std::time::Duration;

/// Settings for the room registry.
///
/// Rooms never expire by default: a room lives until its sender completes
/// the transfer or disconnects. Setting `room_ttl` turns on a periodic
/// sweep that cancels rooms with no activity for that long.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RelayConfig {
    /// Idle time after which a room is cancelled. `None` disables expiry.
    pub room_ttl: Option<Duration>,

    /// How often the sweep runs when `room_ttl` is set.
    pub sweep_interval: Duration,

    /// Events that may wait in one peer's outbox. A peer that falls
    /// further behind is disconnected.
    pub outbox_capacity: usize,
}

/// Default for [`RelayConfig::outbox_capacity`].
pub const DEFAULT_OUTBOX_CAPACITY: usize = 1024;

impl Default for RelayConfig {
    fn default() -> Self {
        Self {
            room_ttl: None,
            sweep_interval: Duration::from_secs(30),
            outbox_capacity: DEFAULT_OUTBOX_CAPACITY,
        }
    }
}

impl RelayConfig {
    /// Returns a config that expires rooms idle for `ttl`.
    ///
    /// The sweep runs at a quarter of the TTL, between 1 and 30 seconds.
    pub fn with_room_ttl(ttl: Duration) -> Self {
        let sweep_interval = (ttl / 4)
            .clamp(Duration::from_secs(1), Duration::from_secs(30));
        Self {
            room_ttl: Some(ttl),
            sweep_interval,
            ..Self::default()
        }
    }
}
