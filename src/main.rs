//! Uupforge CLI - unattended Windows image builds from UUP dump
//!
//! Entry point for the uupforge command-line application.

use anyhow::Result;
use clap::Parser;
use tracing_subscriber::EnvFilter;

use uupforge::cli::output::status;
use uupforge::cli::Cli;

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // RUST_LOG wins over the verbosity flags
    let default_level = match (cli.quiet, cli.verbose) {
        (true, _) => "error",
        (false, 0) => "warn",
        (false, 1) => "info",
        (false, _) => "debug",
    };
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(format!("uupforge={default_level},warn")));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();

    if let Err(e) = cli.run().await {
        eprintln!("{} {e:#}", status::ERROR);
        std::process::exit(1);
    }
    Ok(())
}
