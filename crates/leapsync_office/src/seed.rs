//! Baseline data and the reset/reseed cycle.

use crate::error::{OfficeError, OfficeResult};
use crate::fragments::{self, ROOT_ORGANIZATION};
use leapsync_client::{ControlEvent, Replica, SyncResult};
use serde_json::json;
use tokio::sync::broadcast::error::RecvError;
use tokio::sync::broadcast::Receiver;
use tokio::task::JoinHandle;

/// Name given to the organization by the baseline.
pub const DEFAULT_ORGANIZATION_NAME: &str = "Leap Office";

/// Writes the baseline data set: `Organization:ROOT` named
/// [`DEFAULT_ORGANIZATION_NAME`].
///
/// # Errors
///
/// Returns an error if the write is rejected by the replica.
pub fn seed_baseline(replica: &Replica) -> SyncResult<()> {
    replica.write(
        &fragments::organization_name(),
        ROOT_ORGANIZATION,
        &json!({ "id": ROOT_ORGANIZATION, "name": DEFAULT_ORGANIZATION_NAME }),
    )?;
    Ok(())
}

fn answer_seed(replica: &Replica) -> SyncResult<()> {
    seed_baseline(replica)?;
    // Sent after the seed writes on the same connection, so the relay has
    // applied them by the time it broadcasts reload.
    replica.signal_seed_done()
}

async fn next_event(events: &mut Receiver<ControlEvent>) -> Option<ControlEvent> {
    loop {
        match events.recv().await {
            Ok(event) => return Some(event),
            Err(RecvError::Lagged(skipped)) => {
                tracing::warn!(skipped, "control events lagged");
            }
            Err(RecvError::Closed) => return None,
        }
    }
}

/// Answers `seed` requests on a replica with the baseline data set.
///
/// Runs on a background task until stopped or dropped.
#[derive(Debug)]
pub struct Seeder {
    task: JoinHandle<()>,
}

impl Seeder {
    /// Starts answering `seed` requests received by `replica`.
    ///
    /// Must be called within a Tokio runtime.
    pub fn spawn(replica: Replica) -> Self {
        let mut events = replica.control_events();
        let task = tokio::spawn(async move {
            while let Some(event) = next_event(&mut events).await {
                if event != ControlEvent::Seed {
                    continue;
                }
                match answer_seed(&replica) {
                    Ok(()) => tracing::info!("seeded baseline"),
                    Err(err) => tracing::warn!(error = %err, "failed to seed baseline"),
                }
            }
        });
        Self { task }
    }

    /// Stops answering.
    pub fn stop(self) {
        self.task.abort();
    }
}

impl Drop for Seeder {
    fn drop(&mut self) {
        self.task.abort();
    }
}

/// Wipes the relay and seeds it with the baseline through `replica`.
///
/// Sends `reset`, waits for the relay's `seed` request, writes the baseline,
/// sends `seed-done` and waits for the resulting `reload`.
///
/// # Errors
///
/// Returns an error if the replica is not live or the session ends first.
pub async fn reset_and_reseed(replica: &Replica) -> OfficeResult<()> {
    let mut events = replica.control_events();
    replica.request_reset()?;
    tracing::info!("requested reset");

    let mut seeded = false;
    while let Some(event) = next_event(&mut events).await {
        match event {
            ControlEvent::Seed if !seeded => {
                answer_seed(replica)?;
                seeded = true;
            }
            ControlEvent::Seed => {}
            ControlEvent::Reload if seeded => {
                tracing::info!("reseed complete");
                return Ok(());
            }
            ControlEvent::Reload => {
                tracing::warn!("reload before seeding; another client finished a reseed");
            }
        }
    }
    Err(OfficeError::SessionEnded)
}
