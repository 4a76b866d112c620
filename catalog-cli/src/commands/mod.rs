pub mod fetch;
pub mod peer;
pub mod search;
pub mod server;

use std::future::Future;
use std::path::PathBuf;

use anyhow::{Context, Result};

use catalog_core::PeerConfig;

pub(crate) fn home() -> Result<PathBuf> {
    dirs::home_dir().context("could not determine home directory")
}

/// Peer settings from `~/.catalog/peer.yaml`, with `--registry` applied.
pub(crate) fn peer_config(home: &std::path::Path, registry: Option<String>) -> Result<PeerConfig> {
    let mut config = PeerConfig::load_at(home).context("failed to load peer config")?;
    if let Some(registry) = registry {
        config.registry = registry;
    }
    Ok(config)
}

/// Run one async operation on a throwaway single-threaded runtime.
pub(crate) fn block_on<F: Future>(future: F) -> Result<F::Output> {
    let runtime = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .context("failed to start async runtime")?;
    Ok(runtime.block_on(future))
}
