//! Run command implementation
//!
//! Implements `uupforge run`: match, probe and package every rule whose
//! selected build is newer than the ledger's record.

use anyhow::{bail, Result};
use chrono::Utc;
use std::time::Duration;

use super::Workspace;
use crate::cli::output::status;
use crate::cli::Context;
use crate::core::ledger::FileLedgerStore;
use crate::core::orchestrator::Orchestrator;
use crate::core::rule::validate_rules;
use crate::core::summary::{RuleStatus, RunSummary};
use crate::infra::catalog_store::FileCatalogStore;
use crate::infra::packager::{ScriptPackager, ScriptRunner};
use crate::infra::transport::HttpProbeTransport;

/// Execute the run command
pub async fn execute(ctx: &Context, only: &[String], timeout: Option<u64>) -> Result<()> {
    let ws = Workspace::load(ctx)?;
    let config = &ws.config;

    let mut rules = validate_rules(&config.rules);
    if !only.is_empty() {
        if let Some(unknown) = only.iter().find(|n| !rules.iter().any(|r| r.name() == n.as_str())) {
            bail!("No rule named '{unknown}' in the configuration");
        }
        rules.retain(|r| only.iter().any(|n| n == r.name()));
    }
    if rules.is_empty() {
        bail!("No rules configured");
    }

    let packaging_timeout = timeout.map_or_else(|| config.packaging_timeout(), Duration::from_secs);
    let runner = match config.monitor_script() {
        Some(script) => ScriptRunner::Monitor {
            shell: config.shell().to_string(),
            script,
        },
        None => ScriptRunner::Direct,
    };

    let client = ws.client();
    let catalog = FileCatalogStore::new(config.catalog_dir(&ws.dirs));
    let transport = HttpProbeTransport::new(client.clone(), config.base_url());
    let packager = ScriptPackager::new(
        client,
        config.base_url(),
        config.work_dir(&ws.dirs),
        config.output_dir(&ws.dirs),
        runner,
        packaging_timeout.as_secs(),
    );
    let ledger = FileLedgerStore::new(config.ledger_path(&ws.dirs));
    let orchestrator = Orchestrator::new(&catalog, &transport, &packager, &ledger, packaging_timeout);

    tracing::info!("Running {} rules, ledger at {}", rules.len(), ledger.path().display());

    let mut summary = RunSummary::new(Utc::now());
    for rule in &rules {
        let spinner = ctx.output.spinner(&format!("{}...", rule.name()));
        let report = orchestrator.run_rule(rule).await;
        spinner.finish_and_clear();
        if !ctx.output.json {
            let prefix = match report.status {
                RuleStatus::Succeeded => status::SUCCESS,
                RuleStatus::SkippedUpToDate | RuleStatus::SkippedNoMatch => status::INFO,
                RuleStatus::Failed => status::ERROR,
            };
            ctx.output.line(format!("{prefix} {} {}", report.rule, report.status));
        }
        summary.push(report);
    }

    if ctx.output.json {
        ctx.output.print_json(&summary)?;
    } else if !ctx.output.quiet {
        print!("\n{}", summary.render_text());
    }

    if summary.has_failures() {
        bail!("{} of {} rules failed", summary.count(RuleStatus::Failed), summary.rules.len());
    }
    Ok(())
}
