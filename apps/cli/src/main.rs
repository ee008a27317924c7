//! notemerge CLI: merge, deduplicate, and copy flashcard notes.
//!
//! Works on a local note collection; every command that changes notes does
//! so in a single transaction recorded in the operation log.

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
