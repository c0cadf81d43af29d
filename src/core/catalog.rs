//! Catalog data model
//!
//! A catalog partition is the scraped build list of one UUP dump category
//! (for example `w11-24h2`), stored as `<catalog_dir>/<category>.json`.
//! Partitions are replaced wholesale on every scrape; the incremental
//! variant merges new entries by build id.

use chrono::{DateTime, FixedOffset, NaiveDateTime, TimeZone, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::fmt;
use std::str::FromStr;

use crate::error::CatalogError;

/// CPU architecture of a build
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Architecture {
    X64,
    Arm64,
    X86,
    Amd64,
}

impl Architecture {
    /// Name as shown in the catalog
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::X64 => "x64",
            Self::Arm64 => "arm64",
            Self::X86 => "x86",
            Self::Amd64 => "amd64",
        }
    }
}

impl fmt::Display for Architecture {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Architecture {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "x64" => Ok(Self::X64),
            "arm64" => Ok(Self::Arm64),
            "x86" => Ok(Self::X86),
            "amd64" => Ok(Self::Amd64),
            other => Err(format!("unknown architecture '{other}'")),
        }
    }
}

/// One row of a category listing
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct CatalogEntry {
    /// Build title, e.g. "Windows 11, version 24H2 (26100.2605) amd64"
    pub title: String,

    /// Detail page (`selectlang.php?id=...`)
    pub href: String,

    /// Opaque build id, stable across scrapes
    #[serde(default)]
    pub id: String,

    /// Architecture text as listed
    #[serde(default)]
    pub arch: Option<String>,

    /// Listing timestamp, `YYYY-MM-DD HH:MM:SS <TZ>`
    #[serde(default)]
    pub added_at: Option<String>,
}

impl CatalogEntry {
    /// Whether the listed architecture equals `arch`, ignoring case
    pub fn matches_arch(&self, arch: &str) -> bool {
        self.arch
            .as_deref()
            .is_some_and(|a| a.trim().eq_ignore_ascii_case(arch))
    }

    /// Absolute instant the build was added, if the timestamp parses
    pub fn added_instant(&self) -> Option<DateTime<Utc>> {
        self.added_at.as_deref().and_then(parse_added_at)
    }
}

/// Parse a catalog timestamp such as `2025-12-09 19:01:31 UTC`.
///
/// The zone may be omitted (UTC), `UTC`/`GMT`/`Z`, or a numeric offset
/// (`+0800`, `+08:00`). Any other zone makes the timestamp unparsable.
pub fn parse_added_at(input: &str) -> Option<DateTime<Utc>> {
    let input = input.trim();
    let stamp = input.get(..19)?;
    let naive = NaiveDateTime::parse_from_str(stamp, "%Y-%m-%d %H:%M:%S").ok()?;
    let zone = input[19..].trim();

    match zone.to_ascii_uppercase().as_str() {
        "" | "UTC" | "GMT" | "Z" => Some(Utc.from_utc_datetime(&naive)),
        _ => {
            let offset = parse_offset(zone)?;
            offset
                .from_local_datetime(&naive)
                .single()
                .map(|dt| dt.with_timezone(&Utc))
        }
    }
}

/// Parse `+HHMM` / `+HH:MM` / `-HHMM` / `-HH:MM`
fn parse_offset(zone: &str) -> Option<FixedOffset> {
    let (sign, rest) = match zone.as_bytes().first()? {
        b'+' => (1, &zone[1..]),
        b'-' => (-1, &zone[1..]),
        _ => return None,
    };
    let digits: String = rest.chars().filter(|c| *c != ':').collect();
    if digits.len() != 4 || !digits.chars().all(|c| c.is_ascii_digit()) {
        return None;
    }
    let hours: i32 = digits[..2].parse().ok()?;
    let minutes: i32 = digits[2..].parse().ok()?;
    FixedOffset::east_opt(sign * (hours * 3600 + minutes * 60))
}

/// Extract the `id` query parameter from a detail link.
///
/// Relative links (`./selectlang.php?id=...`) are accepted.
pub fn source_id_from_href(href: &str) -> Option<String> {
    let parsed = url::Url::parse(href).or_else(|_| {
        url::Url::parse("https://uupdump.invalid/").and_then(|base| base.join(href))
    });
    let parsed = parsed.ok()?;
    parsed
        .query_pairs()
        .find(|(key, _)| key == "id")
        .map(|(_, value)| value.into_owned())
        .filter(|id| !id.is_empty())
}

/// Scraped listing of one category
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct CatalogPartition {
    /// Category key, also the file name
    pub category: String,

    /// Listing URL the partition was scraped from
    pub url: String,

    /// Display name of the channel
    pub name: String,

    /// Display name of the parent menu, if the channel came from a dropdown
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub parent_name: Option<String>,

    /// Number of listing pages scanned
    #[serde(default)]
    pub pages: u32,

    /// Builds in scrape order
    #[serde(default)]
    pub versions: Vec<CatalogEntry>,
}

impl CatalogPartition {
    /// Create an empty partition
    pub fn new(category: impl Into<String>, url: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            category: category.into(),
            url: url.into(),
            name: name.into(),
            parent_name: None,
            pages: 0,
            versions: Vec::new(),
        }
    }

    /// Fill missing ids from the detail link and drop entries that still
    /// have none or repeat an id already seen. Returns the number dropped.
    pub fn normalize(&mut self) -> usize {
        let before = self.versions.len();
        let mut seen = HashSet::new();

        self.versions.retain_mut(|entry| {
            if entry.id.is_empty() {
                if let Some(id) = source_id_from_href(&entry.href) {
                    entry.id = id;
                }
            }
            if entry.id.is_empty() {
                tracing::warn!("Dropping catalog entry without build id: {}", entry.title);
                return false;
            }
            seen.insert(entry.id.clone())
        });

        before - self.versions.len()
    }

    /// Whether an entry with this id exists
    pub fn contains(&self, id: &str) -> bool {
        self.versions.iter().any(|v| v.id == id)
    }

    /// Append entries whose id is not yet present.
    ///
    /// Re-adding a known id is a no-op, so merging the same entries twice
    /// leaves the partition unchanged. Returns the number of entries added.
    pub fn merge(&mut self, entries: impl IntoIterator<Item = CatalogEntry>) -> usize {
        let mut known: HashSet<String> = self.versions.iter().map(|v| v.id.clone()).collect();
        let mut added = 0;

        for entry in entries {
            if entry.id.is_empty() || !known.insert(entry.id.clone()) {
                continue;
            }
            self.versions.push(entry);
            added += 1;
        }

        added
    }
}

/// Read access to catalog partitions
pub trait CatalogSource: Send + Sync {
    /// Partition for a category, or [`CatalogError::NotFound`]
    fn load(&self, category: &str) -> Result<CatalogPartition, CatalogError>;
}
