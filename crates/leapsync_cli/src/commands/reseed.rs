//! Reseed command implementation.

use leapsync_client::{ClientConfig, Replica, RetryConfig};
use leapsync_office::reset_and_reseed;
use std::time::Duration;
use tokio::time::timeout;

/// Connects to the relay at `url`, wipes it and seeds the baseline.
pub fn run(url: &str, timeout_secs: u64) -> Result<(), Box<dyn std::error::Error>> {
    let limit = Duration::from_secs(timeout_secs);
    let config = ClientConfig::new(url).with_retry(RetryConfig::new().with_max_attempts(5));

    let runtime = tokio::runtime::Runtime::new()?;
    runtime.block_on(async {
        let replica = Replica::new();
        let session = replica.connect(&config);

        let mut state = replica.watch_connection_state();
        timeout(limit, state.wait_for(|s| s.is_live()))
            .await
            .map_err(|_| format!("relay at {url} not reachable within {timeout_secs}s"))??;
        tracing::info!(url, "connected");

        timeout(limit, reset_and_reseed(&replica))
            .await
            .map_err(|_| format!("reseed did not finish within {timeout_secs}s"))??;

        session.shutdown().await?;
        println!("Relay at {url} reseeded");
        Ok::<(), Box<dyn std::error::Error>>(())
    })?;

    Ok(())
}
