//! Leadflow CLI: discover, enrich and contact leads from the terminal.
//!
//! Every command prints a JSON payload on success, or a single structured
//! error carrying the HTTP status a web layer would use.

mod commands;

use clap::Parser;
use color_eyre::eyre::Result;

use commands::Cli;

#[tokio::main]
async fn main() -> Result<()> {
    color_eyre::install()?;
    let cli = Cli::parse();
    commands::init_tracing(&cli);
    commands::run(cli).await
}
