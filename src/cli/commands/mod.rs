//! CLI command implementations
//!
//! Each command is implemented in its own submodule.

pub mod check;
pub mod probe;
pub mod run;
pub mod scrape;
pub mod select;
pub mod state;

use anyhow::{Context as _, Result};
use clap::Subcommand;

use crate::cli::Context;
use crate::core::config::AppConfig;
use crate::infra::dirs::UupforgeDirs;
use crate::infra::http::create_client;

/// Available CLI commands
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Refresh catalog partitions from UUP dump
    Scrape {
        /// Scrape only this category (repeatable; default: every channel)
        #[arg(long)]
        category: Vec<String>,

        /// Merge into existing partitions instead of replacing them
        #[arg(long)]
        incremental: bool,
    },

    /// Show the build each rule currently selects
    Select {
        /// Only this rule
        #[arg(short, long)]
        rule: Option<String>,

        /// List every matching build, newest first
        #[arg(long)]
        all: bool,
    },

    /// Resolve download parameters for a rule's current build
    Probe {
        /// Rule name
        rule: String,
    },

    /// Build every rule whose selected build changed
    Run {
        /// Only these rules (repeatable)
        #[arg(short, long)]
        rule: Vec<String>,

        /// Packaging timeout in seconds
        #[arg(long)]
        timeout: Option<u64>,
    },

    /// Show the build-state ledger
    State,

    /// Validate the configuration and every rule
    Check,
}

impl Commands {
    /// Execute the command
    pub async fn run(self, ctx: &Context) -> Result<()> {
        match self {
            Self::Scrape { category, incremental } => scrape::execute(ctx, &category, incremental).await,
            Self::Select { rule, all } => select::execute(ctx, rule.as_deref(), all),
            Self::Probe { rule } => probe::execute(ctx, &rule).await,
            Self::Run { rule, timeout } => run::execute(ctx, &rule, timeout).await,
            Self::State => state::execute(ctx),
            Self::Check => check::execute(ctx),
        }
    }
}

/// Configuration and directories shared by the commands
pub(crate) struct Workspace {
    pub config: AppConfig,
    pub dirs: UupforgeDirs,
}

impl Workspace {
    pub fn load(ctx: &Context) -> Result<Self> {
        let dirs = UupforgeDirs::new();
        let config = AppConfig::discover(ctx.config.as_deref(), &dirs).context("Failed to load configuration")?;
        Ok(Self { config, dirs })
    }

    pub fn client(&self) -> reqwest::Client {
        create_client(self.config.user_agent(), self.config.request_timeout())
    }
}
