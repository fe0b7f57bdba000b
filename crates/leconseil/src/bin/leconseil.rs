//! leconseil binary entry point

use clap::Parser;
use leconseil::cli::Cli;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    Cli::parse().run().await
}
