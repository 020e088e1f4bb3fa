//! swcache host entry point.
//!
//! Boots the interception layer, installs and activates the configured cache
//! generation, then serves JSON-lines events on stdio.
//! Logging goes to stderr to avoid interfering with the protocol on stdout.

use std::sync::Arc;

use anyhow::Result;
use tokio::io::BufReader;
use tracing_subscriber::EnvFilter;

use swcache_client::{FetchClient, FetchConfig};
use swcache_core::{AppConfig, CacheDb};

mod error;
mod host;
mod lifecycle;
mod wire;

use lifecycle::LifecycleController;

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .json()
        .init();

    let config = AppConfig::load()?;
    tracing::info!(origin = %config.origin, generation = %config.cache_name, db = %config.db_path.display(), "starting swcache");

    let db = Arc::new(CacheDb::open(&config.db_path).await?);
    let transport = Arc::new(FetchClient::new(FetchConfig::from_app_config(&config)?)?);
    let controller = Arc::new(LifecycleController::from_config(&config, db, transport)?);

    controller.install().await?;
    controller.activate().await?;

    match controller.queue().pending().await {
        Ok(pending) if !pending.is_empty() => tracing::info!(count = pending.len(), "queued actions awaiting sync"),
        Ok(_) => {}
        Err(e) => tracing::warn!(error = %e, "could not read action queue"),
    }

    let served = host::serve(controller.clone(), BufReader::new(tokio::io::stdin()), tokio::io::stdout()).await;

    controller.retire().await;
    tracing::info!("swcache stopped");

    served?;
    Ok(())
}
