//! SiteBuilder CLI. Generates and builds a one-page website per organization.
//!
//! Drafts copy, gates it on quality, styles it with generated design tokens
//! and hands the result to a static-site build tool.

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
