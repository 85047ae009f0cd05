//! Relay configuration.

use crate::error::{RelayError, RelayResult};
use std::net::{IpAddr, SocketAddr};
use std::path::PathBuf;

/// Default bind host.
pub const DEFAULT_HOST: &str = "0.0.0.0";
/// Default listening port.
pub const DEFAULT_PORT: u16 = 4001;
/// Default snapshot file.
pub const DEFAULT_SNAPSHOT: &str = "database.json";

/// Configuration for the relay server.
#[derive(Debug, Clone)]
pub struct RelayConfig {
    /// Address to bind to.
    pub bind_addr: SocketAddr,
    /// Snapshot file of the authoritative store.
    pub snapshot_path: PathBuf,
    /// Maximum concurrent connections.
    pub max_connections: usize,
    /// Frames queued per connection before it is considered too slow and
    /// disconnected.
    pub outbound_buffer: usize,
}

impl RelayConfig {
    /// Creates a configuration with default limits.
    pub fn new(bind_addr: SocketAddr, snapshot_path: impl Into<PathBuf>) -> Self {
        Self {
            bind_addr,
            snapshot_path: snapshot_path.into(),
            max_connections: 1000,
            outbound_buffer: 1024,
        }
    }

    /// Reads `HOST`, `PORT` and `LEAPSYNC_SNAPSHOT` from the environment.
    ///
    /// # Errors
    ///
    /// Returns an error if `HOST` or `PORT` cannot be parsed.
    pub fn from_env() -> RelayResult<Self> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Like [`from_env`](Self::from_env), reading variables through `lookup`.
    ///
    /// # Errors
    ///
    /// Returns an error if `HOST` or `PORT` cannot be parsed.
    pub fn from_lookup<F>(lookup: F) -> RelayResult<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let host = lookup("HOST").unwrap_or_else(|| DEFAULT_HOST.to_string());
        let host: IpAddr = host
            .parse()
            .map_err(|_| RelayError::Config(format!("invalid HOST: {host}")))?;

        let port = match lookup("PORT") {
            Some(port) => port
                .parse()
                .map_err(|_| RelayError::Config(format!("invalid PORT: {port}")))?,
            None => DEFAULT_PORT,
        };

        let snapshot = lookup("LEAPSYNC_SNAPSHOT").unwrap_or_else(|| DEFAULT_SNAPSHOT.to_string());
        Ok(Self::new(SocketAddr::new(host, port), snapshot))
    }

    /// Sets the bind address.
    pub fn with_bind_addr(mut self, addr: SocketAddr) -> Self {
        self.bind_addr = addr;
        self
    }

    /// Sets the snapshot file.
    pub fn with_snapshot_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.snapshot_path = path.into();
        self
    }

    /// Sets the maximum concurrent connections.
    pub fn with_max_connections(mut self, max: usize) -> Self {
        self.max_connections = max;
        self
    }

    /// Sets the per-connection outbound queue length.
    pub fn with_outbound_buffer(mut self, frames: usize) -> Self {
        self.outbound_buffer = frames.max(1);
        self
    }
}

impl Default for RelayConfig {
    fn default() -> Self {
        Self::new(
            SocketAddr::new(IpAddr::from([0, 0, 0, 0]), DEFAULT_PORT),
            DEFAULT_SNAPSHOT,
        )
    }
}
