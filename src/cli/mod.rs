//! Command-line interface module
//!
//! This module handles argument parsing and output formatting.
//! It contains no business logic - that belongs in [`crate::core`].

pub mod commands;
pub mod output;

use anyhow::Result;
use clap::Parser;
use std::path::PathBuf;

use commands::Commands;
use output::OutputMode;

/// Uupforge - unattended Windows image builds from UUP dump
///
/// Keeps a local catalog of UUP dump builds, picks the newest build for each
/// configured rule and packages it into an ISO when it changed.
#[derive(Parser, Debug)]
#[command(name = "uupforge")]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
pub struct Cli {
    /// Enable verbose output (-v for info, -vv for debug)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Suppress all output except errors
    #[arg(short, long, global = true)]
    pub quiet: bool,

    /// Output in JSON format for scripting
    #[arg(long, global = true)]
    pub json: bool,

    /// Configuration file (default: ./uupforge.toml, then the user config)
    #[arg(short, long, global = true, env = "UUPFORGE_CONFIG")]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Option<Commands>,
}

/// Global options every command sees
#[derive(Debug, Clone, Default)]
pub struct Context {
    pub config: Option<PathBuf>,
    pub output: OutputMode,
}

impl Cli {
    /// Execute the CLI command
    pub async fn run(self) -> Result<()> {
        let ctx = Context {
            config: self.config,
            output: OutputMode::new(self.quiet, self.json),
        };
        if let Some(cmd) = self.command {
            cmd.run(&ctx).await
        } else {
            use clap::CommandFactory;
            let mut cmd = Self::command();
            cmd.print_help()?;
            Ok(())
        }
    }
}
