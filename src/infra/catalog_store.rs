//! Catalog files
//!
//! One JSON file per category under the catalog directory, plus the
//! `index.json` channel hierarchy written by the scraper.

use std::path::{Path, PathBuf};

use crate::config::defaults::CATALOG_INDEX_FILE;
use crate::core::catalog::{CatalogEntry, CatalogPartition, CatalogSource};
use crate::error::CatalogError;
use crate::infra::filesystem;
use crate::infra::scrape::CatalogIndex;

/// Catalog partitions stored as `<dir>/<category>.json`
#[derive(Debug, Clone)]
pub struct FileCatalogStore {
    dir: PathBuf,
}

/// Characters other than ASCII alphanumerics, `-`, `_` and `.` become `_`
pub fn file_stem_for(category: &str) -> String {
    let stem: String = category
        .trim()
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.') {
                c
            } else {
                '_'
            }
        })
        .collect();
    if stem.trim_matches('.').is_empty() {
        "_".to_string()
    } else {
        stem
    }
}

impl FileCatalogStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// File holding a category's partition
    pub fn partition_path(&self, category: &str) -> PathBuf {
        self.dir.join(format!("{}.json", file_stem_for(category)))
    }

    /// Replace a partition file wholesale
    pub fn save(&self, partition: &CatalogPartition) -> Result<PathBuf, CatalogError> {
        let path = self.partition_path(&partition.category);
        let write_err = |error: String| CatalogError::Write {
            path: path.clone(),
            error,
        };
        let content = serde_json::to_string_pretty(partition).map_err(|e| write_err(e.to_string()))?;
        filesystem::write_file_atomic(&path, &content).map_err(|e| write_err(e.to_string()))?;
        tracing::debug!(
            "Saved {} entries for '{}' to {}",
            partition.versions.len(),
            partition.category,
            path.display()
        );
        Ok(path)
    }

    /// Merge freshly scraped entries into the stored partition.
    ///
    /// A missing partition is created from `scraped`. Returns the number of
    /// entries that were not already present.
    pub fn merge(&self, scraped: CatalogPartition) -> Result<usize, CatalogError> {
        let mut stored = match self.load(&scraped.category) {
            Ok(existing) => existing,
            Err(CatalogError::NotFound { .. }) => {
                let added = scraped.versions.len();
                self.save(&scraped)?;
                return Ok(added);
            }
            Err(e) => return Err(e),
        };

        let new_entries: Vec<CatalogEntry> = scraped.versions;
        let added = stored.merge(new_entries);
        stored.pages = stored.pages.max(scraped.pages);
        if added > 0 {
            self.save(&stored)?;
        }
        Ok(added)
    }

    /// Categories with a stored partition, sorted
    pub fn categories(&self) -> Result<Vec<String>, CatalogError> {
        if !self.dir.exists() {
            return Ok(Vec::new());
        }
        let entries = std::fs::read_dir(&self.dir).map_err(|e| CatalogError::Read {
            path: self.dir.clone(),
            error: e.to_string(),
        })?;

        let mut categories: Vec<String> = entries
            .filter_map(Result::ok)
            .map(|e| e.path())
            .filter(|p| p.extension().is_some_and(|ext| ext == "json"))
            .filter_map(|p| p.file_stem().map(|s| s.to_string_lossy().into_owned()))
            .filter(|stem| format!("{stem}.json") != CATALOG_INDEX_FILE)
            .collect();
        categories.sort();
        Ok(categories)
    }

    /// Write the channel hierarchy to `index.json`
    pub fn save_index(&self, index: &CatalogIndex) -> Result<PathBuf, CatalogError> {
        let path = self.dir.join(CATALOG_INDEX_FILE);
        let write_err = |error: String| CatalogError::Write {
            path: path.clone(),
            error,
        };
        let content = serde_json::to_string_pretty(index).map_err(|e| write_err(e.to_string()))?;
        filesystem::write_file_atomic(&path, &content).map_err(|e| write_err(e.to_string()))?;
        Ok(path)
    }
}

impl CatalogSource for FileCatalogStore {
    fn load(&self, category: &str) -> Result<CatalogPartition, CatalogError> {
        let path = self.partition_path(category);
        if !path.exists() {
            return Err(CatalogError::NotFound {
                category: category.to_string(),
            });
        }

        let content = filesystem::read_file(&path).map_err(|e| CatalogError::Read {
            path: path.clone(),
            error: e.to_string(),
        })?;
        let mut partition: CatalogPartition =
            serde_json::from_str(&content).map_err(|e| CatalogError::Parse {
                path: path.clone(),
                error: e.to_string(),
            })?;

        let dropped = partition.normalize();
        if dropped > 0 {
            tracing::warn!("Dropped {dropped} unusable entries from {}", path.display());
        }
        Ok(partition)
    }
}
