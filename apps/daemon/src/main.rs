//! Distributed file daemon entry point.

use std::sync::Arc;

use dfs_asset::{LoopbackNetwork, StaticTrustList};
use dfs_daemon::{Config, DistributedFileService, Peers, config};
use tracing_subscriber::EnvFilter;

fn main() -> anyhow::Result<()> {
    let path = config::config_path();
    let config = Config::load(&path)?;

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&config.log_level)),
        )
        .init();

    tracing::info!(
        version = env!("CARGO_PKG_VERSION"),
        path = %path.display(),
        "starting distributed file daemon"
    );

    let rt = tokio::runtime::Runtime::new()?;
    rt.block_on(run(config))?;

    tracing::info!("daemon shut down cleanly");
    Ok(())
}

/// Runs a standalone device until SIGINT.
///
/// Without a peer link the asset transport is an in-process loopback and
/// remote sources fail with a transport error.
async fn run(config: Config) -> anyhow::Result<()> {
    let network = LoopbackNetwork::new();
    let transport = network.join(config.network_id.clone(), config.recv_root());
    let trust = Arc::new(StaticTrustList::new());

    let service = DistributedFileService::start(config, transport, trust, Peers::default())?;
    tracing::info!("daemon ready");

    tokio::signal::ctrl_c().await?;
    tracing::info!("SIGINT received, shutting down");
    service.shutdown().await;
    Ok(())
}
