//! Select command implementation
//!
//! Implements `uupforge select` to show which build each rule picks from
//! the local catalog, without touching the network or the ledger.

use anyhow::{bail, Result};
use serde::Serialize;

use super::Workspace;
use crate::cli::output::status;
use crate::cli::Context;
use crate::core::catalog::{CatalogEntry, CatalogSource};
use crate::core::matcher::rank_candidates;
use crate::core::rule::{validate_rules, ConfiguredRule};
use crate::infra::catalog_store::FileCatalogStore;

#[derive(Debug, Serialize)]
struct Selection {
    rule: String,
    category: Option<String>,
    selected: Option<CatalogEntry>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    candidates: Vec<CatalogEntry>,
    error: Option<String>,
}

/// Execute the select command
pub fn execute(ctx: &Context, only: Option<&str>, all: bool) -> Result<()> {
    let ws = Workspace::load(ctx)?;
    let store = FileCatalogStore::new(ws.config.catalog_dir(&ws.dirs));

    let rules: Vec<ConfiguredRule> = validate_rules(&ws.config.rules)
        .into_iter()
        .filter(|r| only.is_none_or(|name| r.name() == name))
        .collect();
    if rules.is_empty() {
        match only {
            Some(name) => bail!("No rule named '{name}' in the configuration"),
            None => bail!("No rules configured"),
        }
    }

    let selections: Vec<Selection> = rules.iter().map(|r| select_one(&store, r, all)).collect();

    if ctx.output.json {
        return ctx.output.print_json(&selections);
    }
    for s in &selections {
        match (&s.error, &s.selected) {
            (Some(error), _) => println!("{} {}: {error}", status::ERROR, s.rule),
            (None, Some(entry)) => {
                println!("{} {}: {} ({})", status::SUCCESS, s.rule, entry.title, entry.id);
                if let Some(added) = &entry.added_at {
                    println!("    added {added}");
                }
            }
            (None, None) => println!("{} {}: no matching build", status::WARNING, s.rule),
        }
        for (i, candidate) in s.candidates.iter().enumerate() {
            println!(
                "    {:>3}. {} {} [{}]",
                i + 1,
                candidate.added_at.as_deref().unwrap_or("-"),
                candidate.title,
                candidate.id
            );
        }
    }
    Ok(())
}

fn select_one(store: &FileCatalogStore, rule: &ConfiguredRule, all: bool) -> Selection {
    let mut selection = Selection {
        rule: rule.name().to_string(),
        category: None,
        selected: None,
        candidates: Vec::new(),
        error: None,
    };
    let rule = match rule {
        ConfiguredRule::Valid(rule) => rule,
        ConfiguredRule::Invalid { error, .. } => {
            selection.error = Some(error.to_string());
            return selection;
        }
    };
    selection.category = Some(rule.category.clone());

    let partition = match store.load(&rule.category) {
        Ok(partition) => partition,
        Err(e) => {
            selection.error = Some(e.to_string());
            return selection;
        }
    };
    let ranked = rank_candidates(rule, &partition);
    selection.selected = ranked.first().map(|e| (*e).clone());
    if all {
        selection.candidates = ranked.into_iter().cloned().collect();
    }
    selection
}
