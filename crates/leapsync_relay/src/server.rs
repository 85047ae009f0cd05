//! WebSocket front end of the relay.

use crate::config::RelayConfig;
use crate::error::{RelayError, RelayResult};
use crate::handler::{Connection, Relay};
use crate::store::AuthoritativeStore;
use futures_util::{SinkExt, StreamExt};
use leapsync_storage::FileSnapshotStore;
use std::future::Future;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::{TcpListener, TcpStream};
use tokio_tungstenite::{accept_async, tungstenite::Message};

/// Serves a [`Relay`] to WebSocket clients.
///
/// Each accepted socket becomes one relay connection. Text frames are
/// decoded as client messages; queued relay messages are encoded and
/// written back as text frames.
///
/// # Example
///
/// ```no_run
/// use leapsync_relay::{RelayConfig, RelayServer};
///
/// # async fn run() -> leapsync_relay::RelayResult<()> {
/// let config = RelayConfig::default().with_snapshot_path("database.json");
/// let server = RelayServer::open(config)?;
/// server.run_until(async {
///     let _ = tokio::signal::ctrl_c().await;
/// }).await
/// # }
/// ```
pub struct RelayServer {
    config: RelayConfig,
    relay: Arc<Relay>,
}

impl RelayServer {
    /// Opens the snapshot file named in `config` and builds the relay.
    ///
    /// # Errors
    ///
    /// Returns an error if the snapshot file cannot be created or loaded.
    pub fn open(config: RelayConfig) -> RelayResult<Self> {
        let backend = FileSnapshotStore::open(&config.snapshot_path)?;
        let store = AuthoritativeStore::open(backend)?;
        let relay = Relay::new(store).with_outbound_buffer(config.outbound_buffer);
        Ok(Self::with_relay(config, Arc::new(relay)))
    }

    /// Serves an existing relay.
    pub fn with_relay(config: RelayConfig, relay: Arc<Relay>) -> Self {
        Self { config, relay }
    }

    /// Returns the served relay.
    pub fn relay(&self) -> &Arc<Relay> {
        &self.relay
    }

    /// Binds the configured address and serves forever.
    ///
    /// # Errors
    ///
    /// Returns an error if the address cannot be bound or accepting fails.
    pub async fn run(self) -> RelayResult<()> {
        self.run_until(std::future::pending()).await
    }

    /// Binds the configured address and serves until `shutdown` completes.
    ///
    /// # Errors
    ///
    /// Returns an error if the address cannot be bound or accepting fails.
    pub async fn run_until(self, shutdown: impl Future<Output = ()>) -> RelayResult<()> {
        let listener = TcpListener::bind(self.config.bind_addr).await?;
        self.serve(listener, shutdown).await
    }

    /// Serves connections accepted on `listener` until `shutdown` completes.
    ///
    /// # Errors
    ///
    /// Returns an error if accepting fails.
    pub async fn serve(self, listener: TcpListener, shutdown: impl Future<Output = ()>) -> RelayResult<()> {
        tracing::info!(
            addr = %listener.local_addr()?,
            snapshot = %self.config.snapshot_path.display(),
            "relay listening"
        );
        tokio::pin!(shutdown);

        loop {
            let (stream, peer) = tokio::select! {
                accepted = listener.accept() => accepted?,
                () = &mut shutdown => {
                    tracing::info!("relay shutting down");
                    return Ok(());
                }
            };

            if self.relay.connection_count() >= self.config.max_connections {
                let err = RelayError::ConnectionLimit(self.config.max_connections);
                tracing::warn!(peer = %peer, error = %err, "refusing connection");
                continue;
            }

            let relay = Arc::clone(&self.relay);
            tokio::spawn(async move {
                if let Err(err) = serve_connection(relay, stream, peer).await {
                    tracing::debug!(peer = %peer, error = %err, "connection ended with error");
                }
            });
        }
    }
}

async fn serve_connection(relay: Arc<Relay>, stream: TcpStream, peer: SocketAddr) -> RelayResult<()> {
    let socket = accept_async(stream).await?;
    let connection = relay.connect();
    let id = connection.id;
    tracing::info!(peer = %peer, connection = id, "client connected");

    let result = pump(&relay, connection, socket).await;

    relay.disconnect(id);
    tracing::info!(peer = %peer, connection = id, "client disconnected");
    result
}

async fn pump(
    relay: &Arc<Relay>,
    connection: Connection,
    socket: tokio_tungstenite::WebSocketStream<TcpStream>,
) -> RelayResult<()> {
    let Connection { id, mut receiver } = connection;
    let (mut write, mut read) = socket.split();

    loop {
        tokio::select! {
            inbound = read.next() => match inbound {
                Some(Ok(Message::Text(text))) => {
                    // Handling may persist the snapshot, which is blocking file I/O.
                    let relay = Arc::clone(relay);
                    tokio::task::spawn_blocking(move || relay.handle_frame(id, text.as_str())).await?;
                }
                Some(Ok(Message::Close(_))) | None => return Ok(()),
                Some(Ok(_)) => {}
                Some(Err(err)) => return Err(err.into()),
            },
            outbound = receiver.recv() => match outbound {
                Some(message) => {
                    let frame = message.encode()?;
                    write.send(Message::text(frame)).await?;
                }
                // The relay dropped this connection.
                None => {
                    let _ = write.close().await;
                    return Ok(());
                }
            },
        }
    }
}
