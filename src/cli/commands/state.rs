//! State command implementation
//!
//! Implements `uupforge state` to print the build-state ledger.

use anyhow::{Context as _, Result};

use super::Workspace;
use crate::cli::Context;
use crate::core::ledger::{BuildStatus, FileLedgerStore, LedgerStore};

/// Execute the state command
pub fn execute(ctx: &Context) -> Result<()> {
    let ws = Workspace::load(ctx)?;
    let ledger = FileLedgerStore::new(ws.config.ledger_path(&ws.dirs));
    let entries = ledger
        .entries()
        .with_context(|| format!("Failed to read ledger at {}", ledger.path().display()))?;

    if ctx.output.json {
        return ctx.output.print_json(&entries);
    }
    if entries.is_empty() {
        println!("No builds recorded yet ({})", ledger.path().display());
        return Ok(());
    }

    let width = entries.keys().map(String::len).max().unwrap_or(0).max("RULE".len());
    println!("{:<width$}  {:<8}  {:<20}  BUILD", "RULE", "STATUS", "DATE");
    for (rule, entry) in &entries {
        let status = match entry.status {
            BuildStatus::Success => "success",
            BuildStatus::Failed => "failed",
        };
        println!(
            "{rule:<width$}  {status:<8}  {:<20}  {}",
            entry.last_build_date, entry.last_build_id
        );
    }
    Ok(())
}
