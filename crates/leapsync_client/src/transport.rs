//! Transport layer abstraction for sync sessions.

use crate::error::{SyncError, SyncResult};
use futures_util::{SinkExt, StreamExt};
use leapsync_protocol::{ClientMessage, RelayMessage};
use std::future::Future;
use tokio::sync::mpsc;
use tokio_tungstenite::{connect_async, tungstenite::Message};

/// An open, ordered, bidirectional message channel to the relay.
///
/// The connection is considered closed once `inbound` yields `None`.
/// Dropping `outbound` (and `inbound`) closes it from this side.
#[derive(Debug)]
pub struct Channel {
    /// Messages to the relay.
    pub outbound: mpsc::UnboundedSender<ClientMessage>,
    /// Messages from the relay, in relay send order.
    pub inbound: mpsc::UnboundedReceiver<RelayMessage>,
}

/// Opens channels to the relay.
///
/// This trait abstracts the network layer, allowing for different
/// implementations (WebSocket, in-process for testing).
pub trait Transport: Send + 'static {
    /// Opens a new channel.
    ///
    /// # Errors
    ///
    /// Returns a transport error if the relay is unreachable. Retryable
    /// errors make the session back off and try again.
    fn connect(&mut self) -> impl Future<Output = SyncResult<Channel>> + Send;
}

/// A transport speaking JSON text frames over WebSocket.
#[derive(Debug, Clone)]
pub struct WebSocketTransport {
    url: String,
}

impl WebSocketTransport {
    /// Creates a transport for `url`, e.g. `ws://127.0.0.1:4001`.
    pub fn new(url: impl Into<String>) -> Self {
        Self { url: url.into() }
    }

    /// Returns the relay URL.
    pub fn url(&self) -> &str {
        &self.url
    }
}

impl Transport for WebSocketTransport {
    async fn connect(&mut self) -> SyncResult<Channel> {
        let (socket, _) = connect_async(self.url.as_str())
            .await
            .map_err(|err| SyncError::transport_retryable(format!("{}: {err}", self.url)))?;
        let (mut write, mut read) = socket.split();

        let (outbound, mut outbound_rx) = mpsc::unbounded_channel::<ClientMessage>();
        let (inbound_tx, inbound) = mpsc::unbounded_channel();

        tokio::spawn(async move {
            while let Some(message) = outbound_rx.recv().await {
                let frame = match message.encode() {
                    Ok(frame) => frame,
                    Err(err) => {
                        tracing::error!(event = message.event(), error = %err, "failed to encode message");
                        continue;
                    }
                };
                if let Err(err) = write.send(Message::text(frame)).await {
                    tracing::debug!(error = %err, "websocket send failed");
                    return;
                }
            }
            let _ = write.close().await;
        });

        tokio::spawn(async move {
            while let Some(frame) = read.next().await {
                let text = match frame {
                    Ok(Message::Text(text)) => text,
                    Ok(Message::Close(_)) => break,
                    Ok(_) => continue,
                    Err(err) => {
                        tracing::debug!(error = %err, "websocket receive failed");
                        break;
                    }
                };
                match RelayMessage::decode(text.as_str()) {
                    Ok(message) => {
                        if inbound_tx.send(message).is_err() {
                            break;
                        }
                    }
                    Err(err) => tracing::warn!(error = %err, "ignoring undecodable relay frame"),
                }
            }
        });

        tracing::debug!(url = %self.url, "websocket connected");
        Ok(Channel { outbound, inbound })
    }
}
