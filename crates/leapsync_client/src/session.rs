//! The sync session: connection lifecycle of one replica.

use crate::config::{ClientConfig, RetryConfig};
use crate::error::{SyncError, SyncResult};
use crate::replica::Replica;
use crate::state::{ConnectionState, ControlEvent};
use crate::transport::{Channel, Transport, WebSocketTransport};
use leapsync_protocol::{ClientMessage, RelayMessage};
use tokio::sync::oneshot;
use tokio::task::JoinHandle;

/// How one connection ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Ended {
    Shutdown,
    Reload,
    Dropped { was_live: bool },
}

/// Keeps a [`Replica`] connected to the relay.
///
/// The session connects, sends `init`, hydrates the replica from the
/// snapshot reply and then shuttles messages until the connection drops.
/// It then reconnects with exponential backoff and hydrates from scratch.
/// A `reload` from the relay discards local state and reconnects
/// immediately.
pub struct SyncSession<T: Transport> {
    replica: Replica,
    transport: T,
    retry: RetryConfig,
}

impl<T: Transport> SyncSession<T> {
    /// Creates a session for `replica` over `transport`.
    pub fn new(replica: Replica, transport: T, retry: RetryConfig) -> Self {
        Self {
            replica,
            transport,
            retry,
        }
    }

    /// Runs the session on a new task.
    pub fn spawn(self) -> SessionHandle {
        let replica = self.replica.clone();
        let (stop, stopped) = oneshot::channel();
        let task = tokio::spawn(self.run(stopped));
        SessionHandle {
            replica,
            stop: Some(stop),
            task,
        }
    }

    /// Runs the session until `shutdown` fires (or its sender is dropped).
    ///
    /// # Errors
    ///
    /// Returns an error if reconnect attempts are exhausted or the transport
    /// reports a non-retryable error.
    pub async fn run(mut self, mut shutdown: oneshot::Receiver<()>) -> SyncResult<()> {
        let mut attempt: u32 = 0;

        loop {
            if !self.retry.allows_attempt(attempt) {
                self.replica.set_state(ConnectionState::Disconnected);
                tracing::error!(attempts = attempt, "giving up on relay");
                return Err(SyncError::RetriesExhausted { attempts: attempt });
            }

            let delay = self.retry.delay_for_attempt(attempt);
            if !delay.is_zero() {
                tracing::debug!(attempt, delay_ms = delay.as_millis() as u64, "waiting to reconnect");
                tokio::select! {
                    () = tokio::time::sleep(delay) => {}
                    _ = &mut shutdown => return Ok(()),
                }
            }

            self.replica.set_state(ConnectionState::Connecting);
            let connected = tokio::select! {
                connected = self.transport.connect() => connected,
                _ = &mut shutdown => {
                    self.replica.set_state(ConnectionState::Disconnected);
                    return Ok(());
                }
            };

            let channel = match connected {
                Ok(channel) => channel,
                Err(err) => {
                    self.replica.set_state(ConnectionState::Disconnected);
                    if !err.is_retryable() {
                        tracing::error!(error = %err, "cannot connect to relay");
                        return Err(err);
                    }
                    tracing::warn!(attempt, error = %err, "relay unavailable");
                    attempt = attempt.saturating_add(1);
                    continue;
                }
            };

            match self.drive(channel, &mut shutdown).await {
                Ended::Shutdown => {
                    self.replica.detach(ConnectionState::Disconnected);
                    return Ok(());
                }
                Ended::Reload => {
                    tracing::info!("relay requested reload; re-hydrating");
                    self.replica.discard();
                    attempt = 0;
                }
                Ended::Dropped { was_live } => {
                    tracing::warn!(was_live, "connection to relay lost");
                    self.replica.detach(ConnectionState::Disconnected);
                    attempt = if was_live { 1 } else { attempt.saturating_add(1) };
                }
            }
        }
    }

    async fn drive(&mut self, channel: Channel, shutdown: &mut oneshot::Receiver<()>) -> Ended {
        let Channel {
            outbound,
            mut inbound,
        } = channel;

        self.replica.set_state(ConnectionState::AwaitingHydrate);
        if outbound.send(ClientMessage::Init).is_err() {
            return Ended::Dropped { was_live: false };
        }
        // Handed to the replica once hydrated.
        let mut outbound = Some(outbound);

        loop {
            let message = tokio::select! {
                message = inbound.recv() => message,
                _ = &mut *shutdown => return Ended::Shutdown,
            };
            let Some(message) = message else {
                return Ended::Dropped {
                    was_live: outbound.is_none(),
                };
            };

            match message {
                RelayMessage::Init { snapshot } => match outbound.take() {
                    Some(sender) => {
                        tracing::info!(entities = snapshot.len(), "hydrated from relay");
                        self.replica.attach(sender, snapshot);
                    }
                    None => self.replica.restore_snapshot(snapshot),
                },
                RelayMessage::Change(change) => self.replica.apply_remote(&change),
                RelayMessage::Ack => self.replica.acknowledge(),
                RelayMessage::Seed => {
                    tracing::info!("relay asked for seed data");
                    self.replica.emit(ControlEvent::Seed);
                }
                RelayMessage::Reload => {
                    self.replica.emit(ControlEvent::Reload);
                    return Ended::Reload;
                }
            }
        }
    }
}

impl SyncSession<WebSocketTransport> {
    /// Creates a WebSocket session from `config`.
    pub fn websocket(replica: Replica, config: &ClientConfig) -> Self {
        Self::new(
            replica,
            WebSocketTransport::new(config.relay_url.clone()),
            config.retry.clone(),
        )
    }
}

/// Handle to a spawned [`SyncSession`].
///
/// Dropping the handle stops the session.
#[derive(Debug)]
pub struct SessionHandle {
    replica: Replica,
    stop: Option<oneshot::Sender<()>>,
    task: JoinHandle<SyncResult<()>>,
}

impl SessionHandle {
    /// Returns the replica kept in sync.
    pub fn replica(&self) -> &Replica {
        &self.replica
    }

    /// Returns true once the session has stopped on its own.
    pub fn is_finished(&self) -> bool {
        self.task.is_finished()
    }

    /// Stops the session and waits for it to finish.
    ///
    /// # Errors
    ///
    /// Returns the error the session stopped with, if it stopped on its own.
    pub async fn shutdown(mut self) -> SyncResult<()> {
        if let Some(stop) = self.stop.take() {
            let _ = stop.send(());
        }
        self.join().await
    }

    /// Waits for the session to stop on its own.
    ///
    /// # Errors
    ///
    /// Returns the error the session stopped with.
    pub async fn join(self) -> SyncResult<()> {
        let Self { stop, task, .. } = self;
        let result = task.await;
        drop(stop);
        result.map_err(|err| SyncError::SessionFailed(err.to_string()))?
    }
}

impl Replica {
    /// Connects this replica to the relay described by `config`.
    ///
    /// Must be called within a Tokio runtime.
    pub fn connect(&self, config: &ClientConfig) -> SessionHandle {
        SyncSession::websocket(self.clone(), config).spawn()
    }
}
