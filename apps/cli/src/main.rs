//! SecQ CLI: answer security questionnaires from a curated knowledge base.
//!
//! Manages knowledge base entries and questions, and drives grounded answer
//! generation through OpenRouter.

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
