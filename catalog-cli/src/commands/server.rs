//! `catalog server`: run the registry in the foreground or query it.

use anyhow::{Context, Result};
use clap::Subcommand;

use catalog_core::{ServerConfig, StoreBackend};
use catalog_server::{start_blocking, RemoteCatalog};

use super::{block_on, home, peer_config};

#[derive(Subcommand, Debug)]
pub enum ServerCommand {
    /// Run the registry in the foreground until Ctrl-C.
    Start {
        /// Listen address, e.g. 0.0.0.0:7070.
        #[arg(long)]
        listen: Option<String>,

        /// Keep listings in memory only.
        #[arg(long)]
        memory: bool,
    },
    /// Query a running registry.
    Status {
        /// Registry address; defaults to the peer config's registry.
        #[arg(long)]
        registry: Option<String>,
    },
}

pub fn run(command: ServerCommand) -> Result<()> {
    let home = home()?;

    match command {
        ServerCommand::Start { listen, memory } => {
            let mut config = ServerConfig::load_at(&home).context("failed to load server config")?;
            if let Some(listen) = listen {
                config.listen = listen;
            }
            if memory {
                config.store = StoreBackend::Memory;
            }
            start_blocking(config, &home).context("registry exited with error")?;
        }
        ServerCommand::Status { registry } => {
            let config = peer_config(&home, registry)?;
            let catalog = RemoteCatalog::new(&config.registry, config.rpc_timeout());
            let payload = match block_on(catalog.status())? {
                Ok(status) => status,
                Err(err) if err.is_transient() => serde_json::json!({
                    "running": false,
                    "registry": config.registry,
                    "error": err.to_string(),
                }),
                Err(err) => return Err(err).context("failed to query registry status"),
            };
            println!(
                "{}",
                serde_json::to_string_pretty(&payload)
                    .context("failed to render registry status JSON")?
            );
        }
    }

    Ok(())
}
