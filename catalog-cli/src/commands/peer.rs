//! `catalog peer run`: share a directory until Ctrl-C.

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::{Args, Subcommand};

use super::{block_on, home, peer_config};

#[derive(Subcommand, Debug)]
pub enum PeerCommand {
    /// Register the share directory and serve downloads until Ctrl-C.
    Run(PeerRunArgs),
}

#[derive(Args, Debug)]
pub struct PeerRunArgs {
    /// Registry address.
    #[arg(long)]
    pub registry: Option<String>,

    /// Directory whose files are offered.
    #[arg(long)]
    pub share: Option<PathBuf>,

    /// Address other peers should connect to.
    #[arg(long)]
    pub advertise: Option<String>,

    /// Transfer port; 0 picks a free one.
    #[arg(long)]
    pub port: Option<u16>,
}

pub fn run(command: PeerCommand) -> Result<()> {
    let PeerCommand::Run(args) = command;
    let home = home()?;

    let mut config = peer_config(&home, args.registry)?;
    if let Some(share) = args.share {
        config.share_dir = Some(share);
    }
    if let Some(advertise) = args.advertise {
        config.advertise_address = advertise;
    }
    if let Some(port) = args.port {
        let host = config
            .transfer_listen
            .rsplit_once(':')
            .map(|(host, _)| host.to_string())
            .unwrap_or_else(|| "0.0.0.0".to_string());
        config.transfer_listen = format!("{host}:{port}");
    }

    catalog_server::init_tracing();
    block_on(catalog_peer::run(config, home))?.context("peer exited with error")?;
    Ok(())
}
