//! Relay fixtures.

use crate::transport::MemoryTransport;
use leapsync_client::{ClientConfig, Replica, RetryConfig, SessionHandle, SyncSession};
use leapsync_relay::{AuthoritativeStore, Relay, RelayConfig, RelayServer};
use leapsync_storage::{FileSnapshotStore, InMemorySnapshotStore};
use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tempfile::TempDir;
use tokio::net::TcpListener;
use tokio::sync::oneshot;

/// Retry settings that keep tests fast.
pub fn fast_retry() -> RetryConfig {
    RetryConfig::new()
        .with_initial_delay(Duration::from_millis(10))
        .with_max_delay(Duration::from_millis(50))
        .with_jitter(false)
}

/// A relay for tests, with automatic cleanup.
pub struct TestRelay {
    /// The relay instance.
    pub relay: Arc<Relay>,
    transport: MemoryTransport,
    /// The temporary directory (kept alive to prevent cleanup).
    _temp_dir: Option<TempDir>,
}

impl TestRelay {
    /// Creates a relay on an in-memory snapshot store.
    pub fn memory() -> Self {
        let store = AuthoritativeStore::open(InMemorySnapshotStore::new())
            .expect("Failed to open in-memory store");
        Self::from_relay(Relay::new(store), None)
    }

    /// Creates a relay persisting to a snapshot file in a temp directory.
    pub fn file() -> Self {
        let temp_dir = TempDir::new().expect("Failed to create temp directory");
        let backend = FileSnapshotStore::open(&temp_dir.path().join("database.json"))
            .expect("Failed to create snapshot file");
        let store = AuthoritativeStore::open(backend).expect("Failed to open snapshot");
        Self::from_relay(Relay::new(store), Some(temp_dir))
    }

    fn from_relay(relay: Relay, temp_dir: Option<TempDir>) -> Self {
        let relay = Arc::new(relay);
        Self {
            transport: MemoryTransport::new(Arc::clone(&relay)),
            relay,
            _temp_dir: temp_dir,
        }
    }

    /// Returns the snapshot file path if file-based, None if in-memory.
    pub fn snapshot_path(&self) -> Option<PathBuf> {
        self._temp_dir.as_ref().map(|d| d.path().join("database.json"))
    }

    /// Returns the shared in-process transport.
    pub fn transport(&self) -> MemoryTransport {
        self.transport.clone()
    }

    /// Creates a replica and spawns its session over the in-process
    /// transport.
    pub fn replica(&self) -> (Replica, SessionHandle) {
        let replica = Replica::new();
        let session = self.attach(&replica);
        (replica, session)
    }

    /// Spawns a session for an existing replica.
    pub fn attach(&self, replica: &Replica) -> SessionHandle {
        SyncSession::new(replica.clone(), self.transport(), fast_retry()).spawn()
    }

    /// Serves the relay over WebSocket on a random local port.
    pub async fn serve(&self) -> ServedRelay {
        let listener = TcpListener::bind("127.0.0.1:0")
            .await
            .expect("Failed to bind local port");
        let addr = listener.local_addr().expect("Failed to read local address");

        let server = RelayServer::with_relay(
            RelayConfig::default().with_bind_addr(addr),
            Arc::clone(&self.relay),
        );
        let (stop, stopped) = oneshot::channel();
        tokio::spawn(server.serve(listener, async {
            let _ = stopped.await;
        }));

        ServedRelay {
            addr,
            _stop: stop,
        }
    }
}

/// A relay served over WebSocket. Stops serving when dropped.
pub struct ServedRelay {
    /// Listening address.
    pub addr: SocketAddr,
    _stop: oneshot::Sender<()>,
}

impl ServedRelay {
    /// Returns the `ws://` URL of the relay.
    pub fn url(&self) -> String {
        format!("ws://{}", self.addr)
    }

    /// Returns a client configuration for this relay with fast retries.
    pub fn client_config(&self) -> ClientConfig {
        ClientConfig::new(self.url()).with_retry(fast_retry())
    }
}
