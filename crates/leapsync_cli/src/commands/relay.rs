//! Relay command implementation.

use leapsync_relay::{RelayConfig, RelayServer};
use std::net::{IpAddr, SocketAddr};
use std::path::PathBuf;

/// Runs the relay until Ctrl-C.
pub fn run(
    host: IpAddr,
    port: u16,
    snapshot: PathBuf,
    max_connections: Option<usize>,
) -> Result<(), Box<dyn std::error::Error>> {
    let mut config = RelayConfig::new(SocketAddr::new(host, port), snapshot);
    if let Some(max) = max_connections {
        config = config.with_max_connections(max);
    }

    let runtime = tokio::runtime::Runtime::new()?;
    runtime.block_on(async {
        let server = RelayServer::open(config)?;
        server
            .run_until(async {
                if let Err(err) = tokio::signal::ctrl_c().await {
                    tracing::error!(error = %err, "cannot listen for Ctrl-C");
                    std::future::pending::<()>().await;
                }
            })
            .await
    })?;

    Ok(())
}
