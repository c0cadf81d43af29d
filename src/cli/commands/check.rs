//! Check command implementation
//!
//! Implements `uupforge check` to validate the configuration and every
//! rule without touching the network.

use anyhow::{bail, Context as _, Result};
use serde::Serialize;

use crate::cli::output::status;
use crate::cli::Context;
use crate::core::config::AppConfig;
use crate::core::rule::{validate_rules, ConfiguredRule};
use crate::infra::catalog_store::FileCatalogStore;
use crate::infra::dirs::UupforgeDirs;

#[derive(Debug, Serialize)]
struct RuleCheck {
    rule: String,
    valid: bool,
    error: Option<String>,
    warnings: Vec<String>,
}

#[derive(Debug, Serialize)]
struct CheckReport {
    config: String,
    rules: Vec<RuleCheck>,
    warnings: Vec<String>,
}

/// Execute the check command
pub fn execute(ctx: &Context) -> Result<()> {
    let dirs = UupforgeDirs::new();
    let Some(path) = AppConfig::locate(ctx.config.as_deref(), &dirs)? else {
        bail!(
            "No configuration found. Create uupforge.toml or {}",
            dirs.user_config_path().display()
        );
    };
    let config =
        AppConfig::load(&path).with_context(|| format!("Failed to parse {}", path.display()))?;
    tracing::info!("Checking {}", path.display());

    let mut warnings = Vec::new();
    if let Some(monitor) = config.monitor_script() {
        if !monitor.is_file() {
            warnings.push(format!("Monitor script not found: {}", monitor.display()));
        }
    }
    let store = FileCatalogStore::new(config.catalog_dir(&dirs));
    let catalog_empty = store.categories().unwrap_or_default().is_empty();
    if catalog_empty {
        warnings.push(format!("Catalog at {} is empty; run 'uupforge scrape'", store.dir().display()));
    }

    let rules: Vec<RuleCheck> = validate_rules(&config.rules)
        .into_iter()
        .map(|rule| match rule {
            ConfiguredRule::Valid(rule) => {
                let mut warnings = Vec::new();
                if !catalog_empty && !store.partition_path(&rule.category).exists() {
                    warnings.push(format!("category '{}' is not in the catalog", rule.category));
                }
                RuleCheck {
                    rule: rule.name,
                    valid: true,
                    error: None,
                    warnings,
                }
            }
            ConfiguredRule::Invalid { name, error } => RuleCheck {
                rule: name,
                valid: false,
                error: Some(error.to_string()),
                warnings: Vec::new(),
            },
        })
        .collect();

    let invalid = rules.iter().filter(|r| !r.valid).count();
    let report = CheckReport {
        config: path.display().to_string(),
        rules,
        warnings,
    };

    if ctx.output.json {
        ctx.output.print_json(&report)?;
    } else {
        println!("Checking {}\n", report.config);
        for r in &report.rules {
            match &r.error {
                None => println!("{} {}", status::SUCCESS, r.rule),
                Some(error) => println!("{} {error}", status::ERROR),
            }
            for w in &r.warnings {
                println!("  {} {w}", status::WARNING);
            }
        }
        for w in &report.warnings {
            println!("{} {w}", status::WARNING);
        }
    }

    if report.rules.is_empty() {
        bail!("No rules configured");
    }
    if invalid > 0 {
        bail!("{invalid} of {} rules are invalid", report.rules.len());
    }
    Ok(())
}
