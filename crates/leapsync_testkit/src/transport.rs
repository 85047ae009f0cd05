//! In-process transport wired to a [`Relay`].

use leapsync_client::{Channel, SyncError, SyncResult, Transport};
use leapsync_protocol::{ClientMessage, RelayMessage};
use leapsync_relay::{ConnectionId, Relay};
use parking_lot::Mutex;
use std::collections::HashSet;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::sync::mpsc;

#[derive(Default)]
struct Control {
    unavailable: AtomicBool,
    open: Mutex<HashSet<ConnectionId>>,
}

/// A transport that connects replicas to an in-process relay.
///
/// Every message still goes through the JSON wire encoding, so frames are
/// exercised exactly as over WebSocket. Clones share their switches.
#[derive(Clone)]
pub struct MemoryTransport {
    relay: Arc<Relay>,
    control: Arc<Control>,
}

impl MemoryTransport {
    /// Creates a transport to `relay`.
    pub fn new(relay: Arc<Relay>) -> Self {
        Self {
            relay,
            control: Arc::new(Control::default()),
        }
    }

    /// Makes new connection attempts fail (or succeed again).
    pub fn set_available(&self, available: bool) {
        self.control.unavailable.store(!available, Ordering::SeqCst);
    }

    /// Cuts every open connection made through this transport.
    pub fn drop_connections(&self) {
        let open: Vec<_> = self.control.open.lock().drain().collect();
        for id in open {
            self.relay.disconnect(id);
        }
    }

    /// Number of open connections made through this transport.
    pub fn open_connections(&self) -> usize {
        self.control.open.lock().len()
    }
}

impl Transport for MemoryTransport {
    async fn connect(&mut self) -> SyncResult<Channel> {
        if self.control.unavailable.load(Ordering::SeqCst) {
            return Err(SyncError::transport_retryable("relay unavailable"));
        }

        let connection = self.relay.connect();
        let id = connection.id;
        let mut from_relay = connection.receiver;
        self.control.open.lock().insert(id);

        let (outbound, mut outbound_rx) = mpsc::unbounded_channel::<ClientMessage>();
        let (inbound_tx, inbound) = mpsc::unbounded_channel();

        let relay = Arc::clone(&self.relay);
        let control = Arc::clone(&self.control);
        tokio::spawn(async move {
            while let Some(message) = outbound_rx.recv().await {
                let Ok(frame) = message.encode() else { continue };
                relay.handle_frame(id, &frame);
            }
            control.open.lock().remove(&id);
            relay.disconnect(id);
        });

        tokio::spawn(async move {
            while let Some(message) = from_relay.recv().await {
                let decoded = message
                    .encode()
                    .and_then(|frame| RelayMessage::decode(&frame));
                match decoded {
                    Ok(message) => {
                        if inbound_tx.send(message).is_err() {
                            break;
                        }
                    }
                    Err(err) => tracing::error!(error = %err, "relay message failed to round-trip"),
                }
            }
        });

        Ok(Channel { outbound, inbound })
    }
}
