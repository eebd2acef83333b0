//! flexdocs CLI: municipal meeting PDFs onto Flex server mount points.
//!
//! Classifies scraped documents, matches them to catalog shows, uploads
//! them per city and builds one combined PDF per meeting.

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
