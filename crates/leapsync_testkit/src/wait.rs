//! Async wait helpers with timeouts.

use leapsync_client::{ConnectionState, Replica, Subscription};
use serde_json::Value;
use std::future::Future;
use std::time::Duration;

/// Default timeout for wait helpers.
pub const WAIT_TIMEOUT: Duration = Duration::from_secs(5);

/// Polls `condition` until it holds.
///
/// # Panics
///
/// Panics if it does not hold within [`WAIT_TIMEOUT`].
pub async fn eventually<F>(what: &str, mut condition: F)
where
    F: FnMut() -> bool,
{
    let deadline = tokio::time::Instant::now() + WAIT_TIMEOUT;
    while !condition() {
        assert!(
            tokio::time::Instant::now() < deadline,
            "timed out waiting for {what}"
        );
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
}

/// Awaits `future` within [`WAIT_TIMEOUT`].
///
/// # Panics
///
/// Panics on timeout.
pub async fn within<F: Future>(what: &str, future: F) -> F::Output {
    match tokio::time::timeout(WAIT_TIMEOUT, future).await {
        Ok(output) => output,
        Err(_) => panic!("timed out waiting for {what}"),
    }
}

/// Waits until `replica` reaches `state`.
pub async fn wait_state(replica: &Replica, state: ConnectionState) {
    let mut states = replica.watch_connection_state();
    within("connection state", states.wait_for(|s| *s == state))
        .await
        .expect("replica dropped");
}

/// Waits until `replica` is hydrated and live.
pub async fn wait_live(replica: &Replica) {
    wait_state(replica, ConnectionState::Live).await;
}

/// Waits until `subscription` is complete and returns its value.
pub async fn wait_ready(subscription: &mut Subscription) -> Value {
    within("complete fragment", async {
        loop {
            if let Some(value) = subscription.value() {
                return value;
            }
            assert!(subscription.changed().await, "cache dropped");
        }
    })
    .await
}
