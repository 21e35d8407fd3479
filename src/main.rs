// review-sync binary: load config, start the server, wait for ctrl-c.

use std::sync::Arc;

use anyhow::{Context, Result};
use tokio_util::sync::CancellationToken;
use tracing::info;

use review_sync_engine::config::ServiceConfig;
use review_sync_engine::logging::init_tracing;
use review_sync_engine::server::{AppState, ReviewServer};
use review_sync_engine::store::drive::DriveStore;

#[tokio::main]
async fn main() -> Result<()> {
    init_tracing();

    let config = ServiceConfig::load()?;
    let store = DriveStore::from_config(&config).context("failed to build store client")?;
    let state = AppState::new(Arc::new(store), &config);

    let shutdown = CancellationToken::new();
    let sweeper = state.cache.spawn_sweeper(shutdown.clone());

    let server = ReviewServer::start(&config.listen_addr, state).await?;
    info!(
        "review-sync ready on port {} (ttl={}s, max downloads={})",
        server.port(),
        config.cache_ttl_secs,
        config.max_concurrent_downloads
    );

    tokio::signal::ctrl_c()
        .await
        .context("failed to listen for shutdown signal")?;
    info!("shutdown requested");

    shutdown.cancel();
    server.shutdown().await;
    let _ = sweeper.await;
    Ok(())
}
