//! Binary crate for the `swell` command-line tool.
//!
//! This crate focuses on:
//! - Parsing CLI arguments and installing logging
//! - Running the HTTP server
//! - Interactive configuration
//! - Human-friendly output formatting

use clap::Parser;

mod cli;
mod output;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load .env file if present
    dotenvy::dotenv().ok();

    let cmd = cli::Cli::parse();
    cmd.run().await
}
