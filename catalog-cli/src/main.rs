//! Catalog: peer-to-peer file sharing with a liveness-checked registry.
//!
//! # Usage
//!
//! ```text
//! catalog server start [--listen <addr>] [--memory]
//! catalog server status [--registry <addr>]
//! catalog peer run [--registry <addr>] [--share <dir>] [--advertise <addr>] [--port <n>]
//! catalog search <query> [--registry <addr>] [--json]
//! catalog fetch <id> [--registry <addr>] [--out <dir>]
//! ```
//!
//! Settings come from `~/.catalog/server.yaml` and `~/.catalog/peer.yaml`;
//! flags override them.

mod commands;

use anyhow::Result;
use clap::{Parser, Subcommand};

use commands::{
    fetch::FetchArgs, peer::PeerCommand, search::SearchArgs, server::ServerCommand,
};

#[derive(Parser, Debug)]
#[command(
    name = "catalog",
    version,
    about = "Share files peer-to-peer through a central catalog registry",
    long_about = None,
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Run or query the catalog registry.
    Server {
        #[command(subcommand)]
        command: ServerCommand,
    },

    /// Run a sharing peer.
    Peer {
        #[command(subcommand)]
        command: PeerCommand,
    },

    /// Search live listings by case-insensitive substring.
    Search(SearchArgs),

    /// Download a listing by id from its owner.
    Fetch(FetchArgs),
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    match cli.command {
        Commands::Server { command } => commands::server::run(command),
        Commands::Peer { command } => commands::peer::run(command),
        Commands::Search(args) => args.run(),
        Commands::Fetch(args) => args.run(),
    }
}
