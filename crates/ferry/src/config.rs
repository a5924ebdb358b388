//! Server configuration, from code or from the environment.

use std::time::Duration;

use ferry_relay::RelayConfig;
use ferry_transport::{DEFAULT_HANDSHAKE_TIMEOUT, HandshakePolicy};

use crate::FerryError;

/// Liveness checking for idle connections.
///
/// The server pings every `interval`. A connection from which no frame at
/// all (data, pong, anything) arrives for `timeout` is closed. Browsers
/// answer pings on their own, so a client that is only listening stays
/// connected.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Keepalive {
    pub interval: Duration,
    pub timeout: Duration,
}

impl Default for Keepalive {
    fn default() -> Self {
        Self {
            interval: Duration::from_secs(25),
            timeout: Duration::from_secs(60),
        }
    }
}

const DEFAULT_HOST: &str = "0.0.0.0";
const DEFAULT_PORT: u16 = 3001;
const DEFAULT_PATH: &str = "/socket";
const DEFAULT_ORIGIN: &str = "http://localhost:3000";

/// Everything needed to start a [`FerryServer`](crate::FerryServer).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServerConfig {
    /// Address to listen on, `host:port`.
    pub bind_addr: String,

    /// WebSocket upgrade path. `None` accepts any path.
    pub path: Option<String>,

    /// Browser origin allowed to connect. `None` or `"*"` accepts any.
    pub allowed_origin: Option<String>,

    /// How long an accepted socket may take to finish its upgrade.
    pub handshake_timeout: Duration,

    /// Ping-based liveness checking. `None` keeps silent connections open
    /// forever.
    pub keepalive: Option<Keepalive>,

    /// Room registry settings.
    pub relay: RelayConfig,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_addr: format!("{DEFAULT_HOST}:{DEFAULT_PORT}"),
            path: Some(DEFAULT_PATH.to_string()),
            allowed_origin: Some(DEFAULT_ORIGIN.to_string()),
            handshake_timeout: DEFAULT_HANDSHAKE_TIMEOUT,
            keepalive: Some(Keepalive::default()),
            relay: RelayConfig::default(),
        }
    }
}

impl ServerConfig {
    /// Reads the configuration from process environment variables.
    ///
    /// | Variable | Default |
    /// |---|---|
    /// | `HOST` | `0.0.0.0` |
    /// | `PORT` | `3001` |
    /// | `FRONTEND_URL` | `http://localhost:3000` |
    /// | `FERRY_PATH` | `/socket` |
    /// | `FERRY_HANDSHAKE_TIMEOUT_SECS` | `10` |
    /// | `FERRY_PING_INTERVAL_SECS` | `25` (`0` disables keepalive) |
    /// | `FERRY_PING_TIMEOUT_SECS` | `60` |
    /// | `FERRY_ROOM_TTL_SECS` | unset (rooms never expire) |
    /// | `FERRY_OUTBOX_CAPACITY` | `1024` events |
    pub fn from_env() -> Result<Self, FerryError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Like [`from_env`](Self::from_env) but reads through `lookup`.
    pub fn from_lookup(
        lookup: impl Fn(&str) -> Option<String>,
    ) -> Result<Self, FerryError> {
        let host = lookup("HOST").unwrap_or_else(|| DEFAULT_HOST.to_string());
        let port: u16 = parse(&lookup, "PORT")?.unwrap_or(DEFAULT_PORT);

        let allowed_origin =
            lookup("FRONTEND_URL").unwrap_or_else(|| DEFAULT_ORIGIN.to_string());
        let path = lookup("FERRY_PATH").unwrap_or_else(|| DEFAULT_PATH.to_string());

        let handshake_timeout = match parse::<u64>(&lookup, "FERRY_HANDSHAKE_TIMEOUT_SECS")? {
            Some(0) => return Err(positive("FERRY_HANDSHAKE_TIMEOUT_SECS")),
            Some(secs) => Duration::from_secs(secs),
            None => DEFAULT_HANDSHAKE_TIMEOUT,
        };

        let defaults = Keepalive::default();
        let interval = parse::<u64>(&lookup, "FERRY_PING_INTERVAL_SECS")?
            .map_or(defaults.interval, Duration::from_secs);
        let timeout = parse::<u64>(&lookup, "FERRY_PING_TIMEOUT_SECS")?
            .map_or(defaults.timeout, Duration::from_secs);
        let keepalive = if interval.is_zero() {
            None
        } else if timeout <= interval {
            return Err(FerryError::Config {
                key: "FERRY_PING_TIMEOUT_SECS".into(),
                reason: "must be longer than the ping interval".into(),
            });
        } else {
            Some(Keepalive { interval, timeout })
        };

        let mut relay = match parse::<u64>(&lookup, "FERRY_ROOM_TTL_SECS")? {
            Some(0) => return Err(positive("FERRY_ROOM_TTL_SECS")),
            Some(secs) => RelayConfig::with_room_ttl(Duration::from_secs(secs)),
            None => RelayConfig::default(),
        };
        match parse::<usize>(&lookup, "FERRY_OUTBOX_CAPACITY")? {
            Some(0) => return Err(positive("FERRY_OUTBOX_CAPACITY")),
            Some(capacity) => relay.outbox_capacity = capacity,
            None => {}
        }

        Ok(Self {
            bind_addr: format!("{host}:{port}"),
            path: non_empty(path),
            allowed_origin: non_empty(allowed_origin),
            handshake_timeout,
            keepalive,
            relay,
        })
    }

    /// The handshake rules the transport enforces for this config.
    pub fn handshake_policy(&self) -> HandshakePolicy {
        HandshakePolicy {
            path: self.path.clone(),
            allowed_origin: self.allowed_origin.clone(),
        }
    }
}

fn positive(key: &str) -> FerryError {
    FerryError::Config {
        key: key.to_string(),
        reason: "must be greater than zero".into(),
    }
}

fn parse<T>(
    lookup: &impl Fn(&str) -> Option<String>,
    key: &str,
) -> Result<Option<T>, FerryError>
where
    T: std::str::FromStr,
    T::Err: std::fmt::Display,
{
    match lookup(key) {
        None => Ok(None),
        Some(raw) => raw.trim().parse().map(Some).map_err(|e: T::Err| {
            FerryError::Config {
                key: key.to_string(),
                reason: format!("{raw:?}: {e}"),
            }
        }),
    }
}

fn non_empty(value: String) -> Option<String> {
    if value.is_empty() { None } else { Some(value) }
}
