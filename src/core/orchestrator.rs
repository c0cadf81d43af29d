//! Run orchestration
//!
//! Drives every configured rule through match, ledger check, probe and
//! packaging, one rule at a time. Each rule ends in exactly one
//! [`RuleStatus`]; only a successful build touches the ledger.

use async_trait::async_trait;
use chrono::Utc;
use serde::Serialize;
use std::path::PathBuf;
use std::time::{Duration, Instant};

use crate::core::catalog::{CatalogEntry, CatalogSource};
use crate::core::ledger::{LedgerEntry, LedgerStore};
use crate::core::matcher::select_build;
use crate::core::prober::{ParameterProber, ProbeTransport, ResolvedParameters};
use crate::core::rule::{ConfiguredRule, SelectionRule};
use crate::core::summary::{RuleReport, RuleStatus, RunSummary};
use crate::error::{CatalogError, PackagingError};

/// Everything the packager needs for one build
#[derive(Debug, Clone, Serialize)]
pub struct PackagingRequest {
    pub rule: String,
    pub build: CatalogEntry,
    pub params: ResolvedParameters,
}

/// A produced disk image
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Artifact {
    /// File name of the image
    pub name: String,
    /// Final location
    pub path: PathBuf,
}

/// Turns resolved parameters into a disk image
#[async_trait]
pub trait Packager: Send + Sync {
    async fn package(&self, request: &PackagingRequest) -> Result<Artifact, PackagingError>;
}

/// Wires the collaborators for one run
pub struct Orchestrator<'a> {
    catalog: &'a dyn CatalogSource,
    transport: &'a dyn ProbeTransport,
    packager: &'a dyn Packager,
    ledger: &'a dyn LedgerStore,
    packaging_timeout: Duration,
}

impl<'a> Orchestrator<'a> {
    pub fn new(
        catalog: &'a dyn CatalogSource,
        transport: &'a dyn ProbeTransport,
        packager: &'a dyn Packager,
        ledger: &'a dyn LedgerStore,
        packaging_timeout: Duration,
    ) -> Self {
        Self {
            catalog,
            transport,
            packager,
            ledger,
            packaging_timeout,
        }
    }

    /// Process every rule in declaration order
    pub async fn run(&self, rules: &[ConfiguredRule]) -> RunSummary {
        let mut summary = RunSummary::new(Utc::now());
        for rule in rules {
            summary.push(self.run_rule(rule).await);
        }
        summary
    }

    /// Process one rule to its terminal status
    pub async fn run_rule(&self, rule: &ConfiguredRule) -> RuleReport {
        let started = Instant::now();
        let mut report = match rule {
            ConfiguredRule::Valid(rule) => self.build_rule(rule).await,
            ConfiguredRule::Invalid { name, error } => {
                tracing::error!("Rule '{name}' is invalid: {error}");
                RuleReport::new(name.clone(), RuleStatus::Failed).with_reason(error.to_string())
            }
        };
        report.duration = started.elapsed();
        report
    }

    async fn build_rule(&self, rule: &SelectionRule) -> RuleReport {
        let partition = match self.catalog.load(&rule.category) {
            Ok(partition) => partition,
            Err(CatalogError::NotFound { category }) => {
                tracing::info!("Rule '{}': category '{category}' is not in the catalog", rule.name);
                return RuleReport::new(&rule.name, RuleStatus::SkippedNoMatch)
                    .with_reason(format!("category '{category}' not in catalog"));
            }
            Err(e) => {
                tracing::error!("Rule '{}': {e}", rule.name);
                return RuleReport::new(&rule.name, RuleStatus::Failed).with_reason(e.to_string());
            }
        };

        let Some(build) = select_build(rule, &partition) else {
            tracing::info!("Rule '{}': no build matches in '{}'", rule.name, rule.category);
            return RuleReport::new(&rule.name, RuleStatus::SkippedNoMatch)
                .with_reason("no matching build");
        };
        let report = RuleReport::new(&rule.name, RuleStatus::Failed).with_build(&build.id, &build.title);

        match self.ledger.get(&rule.name) {
            Ok(Some(entry)) if entry.is_up_to_date(&build.id) => {
                tracing::info!("Rule '{}': build {} already packaged", rule.name, build.id);
                return RuleReport {
                    status: RuleStatus::SkippedUpToDate,
                    ..report
                };
            }
            Ok(_) => {}
            Err(e) => {
                tracing::error!("Rule '{}': {e}", rule.name);
                return report.with_reason(e.to_string());
            }
        }

        tracing::info!("Rule '{}': building {} ({})", rule.name, build.id, build.title);

        let params = match ParameterProber::new(self.transport).probe(rule, &build.id).await {
            Ok(params) => params,
            Err(e) => {
                tracing::error!("Rule '{}': {e}", rule.name);
                return report.with_reason(e.to_string());
            }
        };

        let request = PackagingRequest {
            rule: rule.name.clone(),
            build: build.clone(),
            params,
        };
        let artifact = match tokio::time::timeout(self.packaging_timeout, self.packager.package(&request)).await
        {
            Ok(Ok(artifact)) => artifact,
            Ok(Err(e)) => {
                tracing::error!("Rule '{}': {e}", rule.name);
                return report.with_reason(e.to_string());
            }
            Err(_) => {
                let e = PackagingError::TimedOut {
                    after: self.packaging_timeout,
                };
                tracing::error!("Rule '{}': {e}", rule.name);
                return report.with_reason(e.to_string());
            }
        };

        let report = report.with_artifact(&artifact.name);
        if let Err(e) = self
            .ledger
            .put(&rule.name, LedgerEntry::success(&build.id, Utc::now()))
        {
            tracing::error!("Rule '{}': built {} but {e}", rule.name, artifact.name);
            return report.with_reason(format!("image built but not recorded: {e}"));
        }

        tracing::info!("Rule '{}': produced {}", rule.name, artifact.path.display());
        RuleReport {
            status: RuleStatus::Succeeded,
            ..report
        }
    }
}
