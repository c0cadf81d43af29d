//! Uupforge - rule-driven Windows image builds on top of UUP dump
//!
//! Keeps a local catalog of the builds UUP dump lists, selects the newest
//! build for each configured rule, resolves its download form and packages
//! it into an ISO, recording each success in a build-state ledger so an
//! unchanged catalog builds nothing.
//!
//! # Architecture
//!
//! - [`cli`] - Command-line interface parsing and output formatting
//! - [`core`] - Catalog model, rules, matching, probing, ledger and orchestration
//! - [`infra`] - Infrastructure layer (HTTP, HTML scraping, filesystem, processes)
//! - [`config`] - Constants and service URLs
//! - [`error`] - Error types and handling

pub mod cli;
pub mod config;
pub mod core;
pub mod error;
pub mod infra;

#[cfg(test)]
pub mod test_utils;
