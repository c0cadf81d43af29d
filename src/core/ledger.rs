//! Build-state ledger
//!
//! Records, per rule, the last build that was packaged successfully. The
//! file form (`build_state.json`) is one JSON object keyed by rule name:
//!
//! ```json
//! {
//!   "Win11_24H2_x64_Latest": {
//!     "lastBuildId": "0d3a5d10-...",
//!     "lastBuildDate": "2025-01-01T00:00:00Z",
//!     "status": "success"
//!   }
//! }
//! ```

use chrono::{DateTime, SecondsFormat, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use crate::error::LedgerError;
use crate::infra::filesystem;

/// Outcome recorded for a build
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BuildStatus {
    Success,
    Failed,
}

/// Ledger record for one rule
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LedgerEntry {
    /// Source id of the build
    pub last_build_id: String,
    /// When the build was recorded (RFC 3339)
    pub last_build_date: String,
    pub status: BuildStatus,
}

impl LedgerEntry {
    /// Successful build of `build_id` at `at`
    pub fn success(build_id: impl Into<String>, at: DateTime<Utc>) -> Self {
        Self {
            last_build_id: build_id.into(),
            last_build_date: at.to_rfc3339_opts(SecondsFormat::Secs, true),
            status: BuildStatus::Success,
        }
    }

    /// Whether this entry says `build_id` is already built
    pub fn is_up_to_date(&self, build_id: &str) -> bool {
        self.status == BuildStatus::Success && self.last_build_id == build_id
    }
}

/// Whole ledger, sorted by rule name
pub type LedgerMap = BTreeMap<String, LedgerEntry>;

/// Persistence for ledger entries
pub trait LedgerStore: Send + Sync {
    /// Entry for a rule, if one was recorded
    fn get(&self, rule: &str) -> Result<Option<LedgerEntry>, LedgerError>;

    /// Record an entry for a rule, replacing any previous one
    fn put(&self, rule: &str, entry: LedgerEntry) -> Result<(), LedgerError>;

    /// Every entry
    fn entries(&self) -> Result<LedgerMap, LedgerError>;
}

/// JSON file ledger.
///
/// Each `put` reads the file, replaces one key and writes the whole
/// document back through a temporary file and a rename. Single writer only.
#[derive(Debug, Clone)]
pub struct FileLedgerStore {
    path: PathBuf,
}

impl FileLedgerStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn load(&self) -> Result<LedgerMap, LedgerError> {
        if !self.path.exists() {
            return Ok(LedgerMap::new());
        }
        let content = filesystem::read_file(&self.path).map_err(|e| LedgerError::Read {
            path: self.path.clone(),
            error: e.to_string(),
        })?;
        if content.trim().is_empty() {
            return Ok(LedgerMap::new());
        }
        serde_json::from_str(&content).map_err(|e| LedgerError::Parse {
            path: self.path.clone(),
            error: e.to_string(),
        })
    }

    fn store(&self, map: &LedgerMap) -> Result<(), LedgerError> {
        let write_err = |error: String| LedgerError::Write {
            path: self.path.clone(),
            error,
        };
        let mut content = serde_json::to_string_pretty(map).map_err(|e| write_err(e.to_string()))?;
        content.push('\n');
        filesystem::write_file_atomic(&self.path, &content).map_err(|e| write_err(e.to_string()))
    }
}

impl LedgerStore for FileLedgerStore {
    fn get(&self, rule: &str) -> Result<Option<LedgerEntry>, LedgerError> {
        Ok(self.load()?.remove(rule))
    }

    fn put(&self, rule: &str, entry: LedgerEntry) -> Result<(), LedgerError> {
        let mut map = self.load()?;
        map.insert(rule.to_string(), entry);
        self.store(&map)?;
        tracing::debug!("Ledger updated for '{rule}' at {}", self.path.display());
        Ok(())
    }

    fn entries(&self) -> Result<LedgerMap, LedgerError> {
        self.load()
    }
}

/// In-memory ledger
#[derive(Debug, Default)]
pub struct MemoryLedgerStore {
    entries: Mutex<LedgerMap>,
}

impl MemoryLedgerStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Pre-populated ledger
    pub fn with_entries(entries: LedgerMap) -> Self {
        Self {
            entries: Mutex::new(entries),
        }
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, LedgerMap> {
        // A poisoned map is still a consistent BTreeMap
        self.entries
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
    }
}

impl LedgerStore for MemoryLedgerStore {
    fn get(&self, rule: &str) -> Result<Option<LedgerEntry>, LedgerError> {
        Ok(self.lock().get(rule).cloned())
    }

    fn put(&self, rule: &str, entry: LedgerEntry) -> Result<(), LedgerError> {
        self.lock().insert(rule.to_string(), entry);
        Ok(())
    }

    fn entries(&self) -> Result<LedgerMap, LedgerError> {
        Ok(self.lock().clone())
    }
}
