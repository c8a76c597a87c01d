//! Email-domain validation hook server.
//!
//! Configuration comes from `CAMPUS_EVENTS_CONFIG` (default `config.toml`)
//! plus the usual environment overrides. Set `CAMPUS_EVENTS_FIXTURE` to
//! answer from a JSON fixture instead of the hosted data service.

use std::path::PathBuf;
use std::sync::Arc;

use campus_events::{
    config,
    error::Result,
    hook,
    storage::{AffiliationDirectory, MemoryStore, RestStore},
};
use tracing::info;
use tracing_subscriber::{EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with(tracing_subscriber::fmt::layer().json())
        .init();

    let path = config::env_var("CAMPUS_EVENTS_CONFIG")
        .map(PathBuf::from)
        .unwrap_or_else(|| PathBuf::from("config.toml"));
    let config = config::load_all(&path)?;

    let directory: Arc<dyn AffiliationDirectory> = match config::env_var("CAMPUS_EVENTS_FIXTURE") {
        Some(fixture) => {
            info!(%fixture, "answering from fixture");
            Arc::new(MemoryStore::load(&fixture).await?)
        }
        None => Arc::new(RestStore::new(&config.data)?),
    };

    info!("campus-hook starting");
    hook::serve(&config.hook, directory).await
}
