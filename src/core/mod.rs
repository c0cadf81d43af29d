//! Core business logic module
//!
//! Domain types and the decisions made on them. Network, process and most
//! filesystem work lives in [`crate::infra`] behind the traits defined here.
//!
//! # Submodules
//!
//! - [`catalog`] - Catalog partitions and entries
//! - [`rule`] - Selection rules and their validation
//! - [`matcher`] - Latest-wins build selection
//! - [`prober`] - Three-stage download parameter resolution
//! - [`ledger`] - Build-state ledger
//! - [`orchestrator`] - Per-rule run loop
//! - [`summary`] - Run summary reporting
//! - [`config`] - `uupforge.toml` loading

pub mod catalog;
pub mod config;
pub mod ledger;
pub mod matcher;
pub mod orchestrator;
pub mod prober;
pub mod rule;
pub mod summary;
