//! Trackcast - unified CLI entrypoint.
//!
//! Usage:
//!   trackcast start --config config/trackcast.toml
//!   trackcast subscribe --identity dash-1 --topic PKG-1
//!   trackcast notify --topic PKG-1 --status delivered

use anyhow::Result;
use clap::Parser;
use trackcast::cli::commands::{run_notify, run_start, run_subscribe};
use trackcast::cli::{Cli, Commands};

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    match cli.command {
        Commands::Start(args) => run_start(args).await,
        Commands::Subscribe(args) => run_subscribe(args).await,
        Commands::Notify(args) => run_notify(args).await,
    }
}
