//! `catalog search`: list live files matching a query.

use anyhow::{Context, Result};
use clap::Args;
use colored::Colorize;
use tabled::{settings::Style, Table, Tabled};

use catalog_core::{CatalogApi, SearchHit};
use catalog_server::RemoteCatalog;

use super::{block_on, home, peer_config};

#[derive(Args, Debug)]
pub struct SearchArgs {
    /// Case-insensitive substring of the file name.
    pub query: String,

    /// Registry address.
    #[arg(long)]
    pub registry: Option<String>,

    /// Emit machine-readable JSON.
    #[arg(long)]
    pub json: bool,
}

#[derive(Tabled)]
struct HitRow {
    #[tabled(rename = "ID")]
    id: u64,
    #[tabled(rename = "File")]
    file_name: String,
}

impl SearchArgs {
    pub fn run(self) -> Result<()> {
        let config = peer_config(&home()?, self.registry)?;
        let catalog = RemoteCatalog::new(&config.registry, config.rpc_timeout());
        let hits = block_on(catalog.search(&self.query))?
            .with_context(|| format!("search for '{}' failed", self.query))?;

        if self.json {
            println!(
                "{}",
                serde_json::to_string_pretty(&hits).context("failed to render search JSON")?
            );
            return Ok(());
        }
        print_table(&self.query, hits);
        Ok(())
    }
}

fn print_table(query: &str, hits: Vec<SearchHit>) {
    if hits.is_empty() {
        println!("No files matched '{query}'.");
        return;
    }

    let count = hits.len();
    let rows: Vec<HitRow> = hits
        .into_iter()
        .map(|hit| HitRow {
            id: hit.id.0,
            file_name: hit.file_name,
        })
        .collect();
    let mut table = Table::new(rows);
    table.with(Style::rounded());
    println!("{table}");
    println!(
        "{} {}",
        count.to_string().bold(),
        "live file(s); download with `catalog fetch <ID>`".bright_black()
    );
}
