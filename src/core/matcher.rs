//! Rule matching
//!
//! Picks one build per rule from a catalog partition: filter by
//! architecture and title, then latest wins.

use std::cmp::Ordering;

use crate::core::catalog::{CatalogEntry, CatalogPartition};
use crate::core::rule::SelectionRule;

/// Whether an entry passes the rule's architecture and title filters.
///
/// No other entry field participates in matching.
pub fn entry_matches(rule: &SelectionRule, entry: &CatalogEntry) -> bool {
    entry.matches_arch(rule.arch.as_str()) && rule.title_pattern.matches(&entry.title)
}

/// Latest-first ordering: newest `addedAt` first, unparsable timestamps
/// last, ties broken by id ascending.
fn latest_first(a: &CatalogEntry, b: &CatalogEntry) -> Ordering {
    match (a.added_instant(), b.added_instant()) {
        (Some(x), Some(y)) => y.cmp(&x),
        (Some(_), None) => Ordering::Less,
        (None, Some(_)) => Ordering::Greater,
        (None, None) => Ordering::Equal,
    }
    .then_with(|| a.id.cmp(&b.id))
}

/// All entries matching the rule, best candidate first
pub fn rank_candidates<'a>(
    rule: &SelectionRule,
    partition: &'a CatalogPartition,
) -> Vec<&'a CatalogEntry> {
    let mut candidates: Vec<&CatalogEntry> = partition
        .versions
        .iter()
        .filter(|entry| entry_matches(rule, entry))
        .collect();
    candidates.sort_by(|a, b| latest_first(a, b));
    candidates
}

/// The build a rule selects, if any entry matches
pub fn select_build<'a>(
    rule: &SelectionRule,
    partition: &'a CatalogPartition,
) -> Option<&'a CatalogEntry> {
    let selected = partition
        .versions
        .iter()
        .filter(|entry| entry_matches(rule, entry))
        .min_by(|a, b| latest_first(a, b));

    match selected {
        Some(entry) => tracing::debug!("Rule '{}' selects {} ({})", rule.name, entry.id, entry.title),
        None => tracing::debug!(
            "Rule '{}' matches nothing in '{}' ({} entries)",
            rule.name,
            partition.category,
            partition.versions.len()
        ),
    }
    selected
}
