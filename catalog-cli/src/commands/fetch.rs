//! `catalog fetch`: resolve a listing and download it from its owner.

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Args;
use colored::Colorize;

use catalog_core::EntryId;

use super::{block_on, home, peer_config};

#[derive(Args, Debug)]
pub struct FetchArgs {
    /// Listing id as printed by `catalog search`.
    pub id: u64,

    /// Registry address.
    #[arg(long)]
    pub registry: Option<String>,

    /// Download directory.
    #[arg(long)]
    pub out: Option<PathBuf>,
}

impl FetchArgs {
    pub fn run(self) -> Result<()> {
        let home = home()?;
        let mut config = peer_config(&home, self.registry)?;
        if let Some(out) = self.out {
            config.download_dir = Some(out);
        }

        let id = EntryId(self.id);
        let report = block_on(catalog_peer::fetch(&config, &home, id))?
            .with_context(|| format!("fetch of listing {id} failed"))?;

        if report.is_complete() {
            println!(
                "{} {} ({} bytes)",
                "✓".green(),
                report.path.display(),
                report.received
            );
        } else {
            println!(
                "{} {}: received {} of {} bytes",
                "!".yellow().bold(),
                report.path.display(),
                report.received,
                report.declared
            );
        }
        Ok(())
    }
}
