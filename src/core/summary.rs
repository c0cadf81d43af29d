//! Run summary
//!
//! One report per configured rule, rendered as a text table or JSON.

use chrono::{DateTime, Utc};
use serde::Serialize;
use std::fmt;
use std::time::Duration;

/// Terminal status of one rule in a run
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RuleStatus {
    /// Category missing or nothing matched
    SkippedNoMatch,
    /// Selected build already packaged
    SkippedUpToDate,
    /// Packaged and recorded
    Succeeded,
    /// Invalid rule, probe failure, packaging failure or timeout
    Failed,
}

impl RuleStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::SkippedNoMatch => "SKIPPED_NO_MATCH",
            Self::SkippedUpToDate => "SKIPPED_UP_TO_DATE",
            Self::Succeeded => "SUCCEEDED",
            Self::Failed => "FAILED",
        }
    }
}

impl fmt::Display for RuleStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Outcome of one rule
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RuleReport {
    pub rule: String,
    pub status: RuleStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub build_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub build_title: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub artifact: Option<String>,
    /// Why the rule was skipped or failed
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
    #[serde(rename = "duration_ms", serialize_with = "serialize_millis")]
    pub duration: Duration,
}

fn serialize_millis<S: serde::Serializer>(d: &Duration, s: S) -> Result<S::Ok, S::Error> {
    s.serialize_u64(u64::try_from(d.as_millis()).unwrap_or(u64::MAX))
}

impl RuleReport {
    pub fn new(rule: impl Into<String>, status: RuleStatus) -> Self {
        Self {
            rule: rule.into(),
            status,
            build_id: None,
            build_title: None,
            artifact: None,
            reason: None,
            duration: Duration::ZERO,
        }
    }

    #[must_use]
    pub fn with_build(mut self, id: &str, title: &str) -> Self {
        self.build_id = Some(id.to_string());
        self.build_title = Some(title.to_string());
        self
    }

    #[must_use]
    pub fn with_reason(mut self, reason: impl Into<String>) -> Self {
        self.reason = Some(reason.into());
        self
    }

    #[must_use]
    pub fn with_artifact(mut self, name: impl Into<String>) -> Self {
        self.artifact = Some(name.into());
        self
    }
}

/// Reports for every configured rule, in declaration order
#[derive(Debug, Clone, Serialize)]
pub struct RunSummary {
    pub started_at: DateTime<Utc>,
    pub rules: Vec<RuleReport>,
}

impl RunSummary {
    pub fn new(started_at: DateTime<Utc>) -> Self {
        Self {
            started_at,
            rules: Vec::new(),
        }
    }

    pub fn push(&mut self, report: RuleReport) {
        self.rules.push(report);
    }

    pub fn count(&self, status: RuleStatus) -> usize {
        self.rules.iter().filter(|r| r.status == status).count()
    }

    pub fn has_failures(&self) -> bool {
        self.count(RuleStatus::Failed) > 0
    }

    /// Plain text table
    pub fn render_text(&self) -> String {
        let rule_width = self
            .rules
            .iter()
            .map(|r| r.rule.len())
            .max()
            .unwrap_or(0)
            .max("RULE".len());
        let status_width = "SKIPPED_UP_TO_DATE".len();

        let mut out = format!("{:<rule_width$}  {:<status_width$}  {:>8}  DETAIL\n", "RULE", "STATUS", "TIME");
        for r in &self.rules {
            let detail = match (r.status, &r.artifact, &r.reason, &r.build_id) {
                (RuleStatus::Succeeded, Some(artifact), _, _) => artifact.clone(),
                (_, _, Some(reason), _) => reason.clone(),
                (_, _, None, Some(id)) => id.clone(),
                _ => String::new(),
            };
            out.push_str(&format!(
                "{:<rule_width$}  {:<status_width$}  {:>7.1}s  {}\n",
                r.rule,
                r.status.as_str(),
                r.duration.as_secs_f64(),
                detail
            ));
        }
        out.push_str(&format!(
            "\n{} succeeded, {} up to date, {} no match, {} failed\n",
            self.count(RuleStatus::Succeeded),
            self.count(RuleStatus::SkippedUpToDate),
            self.count(RuleStatus::SkippedNoMatch),
            self.count(RuleStatus::Failed),
        ));
        out
    }
}
