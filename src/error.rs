//! Error types for uupforge
//!
//! Domain-specific error types using thiserror.

use std::path::PathBuf;
use std::time::Duration;
use thiserror::Error;

/// Catalog store errors
#[derive(Error, Debug)]
pub enum CatalogError {
    /// No partition has been scraped for this category yet
    #[error("Category '{category}' not found in catalog")]
    NotFound { category: String },

    /// Partition file could not be read
    #[error("Failed to read catalog file '{path}': {error}")]
    Read { path: PathBuf, error: String },

    /// Partition file is not valid JSON
    #[error("Failed to parse catalog file '{path}': {error}")]
    Parse { path: PathBuf, error: String },

    /// Partition file could not be written
    #[error("Failed to write catalog file '{path}': {error}")]
    Write { path: PathBuf, error: String },
}

/// Selection rule validation errors
#[derive(Error, Debug, Clone, PartialEq)]
pub enum RuleError {
    /// Rule has an empty name
    #[error("Rule name cannot be empty")]
    EmptyName,

    /// Two rules share a name
    #[error("Rule '{rule}' is declared more than once")]
    DuplicateName { rule: String },

    /// Required field is empty
    #[error("Rule '{rule}' is missing required field '{field}'")]
    MissingField { rule: String, field: String },

    /// Title pattern is not a valid regular expression
    #[error("Rule '{rule}' has invalid title pattern '{pattern}': {error}")]
    InvalidPattern {
        rule: String,
        pattern: String,
        error: String,
    },

    /// Architecture not recognised
    #[error("Rule '{rule}' has unknown architecture '{arch}' (expected x64, arm64, x86 or amd64)")]
    UnknownArchitecture { rule: String, arch: String },

    /// Download method outside 1..=3
    #[error("Rule '{rule}' has invalid download method '{method}' (expected 1, 2 or 3)")]
    InvalidDownloadMethod { rule: String, method: String },

    /// Conversion option not recognised
    #[error("Rule '{rule}' has unknown option '{option}' (expected updates, cleanup, netfx or esd)")]
    UnknownOption { rule: String, option: String },

    /// Virtual edition request is neither a list nor "all"
    #[error("Rule '{rule}' has invalid virtual_editions '{value}' (expected a list or \"all\")")]
    InvalidVirtualEditions { rule: String, value: String },

    /// Virtual editions requested without download method 3
    #[error("Rule '{rule}' requests virtual editions but uses download method {method}; virtual editions require download method 3")]
    VirtualEditionsRequireMethod3 { rule: String, method: u8 },

    /// Download method 3 without any virtual edition
    #[error("Rule '{rule}' uses download method 3 but requests no virtual editions")]
    Method3RequiresVirtualEditions { rule: String },
}

impl RuleError {
    /// Name of the rule the error refers to, if any
    pub fn rule_name(&self) -> Option<&str> {
        match self {
            Self::EmptyName => None,
            Self::DuplicateName { rule }
            | Self::MissingField { rule, .. }
            | Self::InvalidPattern { rule, .. }
            | Self::UnknownArchitecture { rule, .. }
            | Self::InvalidDownloadMethod { rule, .. }
            | Self::UnknownOption { rule, .. }
            | Self::InvalidVirtualEditions { rule, .. }
            | Self::VirtualEditionsRequireMethod3 { rule, .. }
            | Self::Method3RequiresVirtualEditions { rule } => Some(rule),
        }
    }
}

/// Parameter probing errors
#[derive(Error, Debug)]
pub enum ProbeError {
    /// Requested language is not offered for the build
    #[error("Language '{requested}' is not offered for build {build} (offered: {})", offered.join(", "))]
    NoLanguageMatch {
        build: String,
        requested: String,
        offered: Vec<String>,
    },

    /// None of the requested editions is offered
    #[error("No requested edition is offered for build {build} in '{language}' (requested: {}, offered: {})", requested.join(", "), offered.join(", "))]
    NoEditionsFound {
        build: String,
        language: String,
        requested: Vec<String>,
        offered: Vec<String>,
    },

    /// Some requested editions are not offered
    #[error("Build {build} does not offer {} in '{language}' (offered: {})", missing.join(", "), offered.join(", "))]
    EditionsUnavailable {
        build: String,
        language: String,
        missing: Vec<String>,
        offered: Vec<String>,
    },

    /// Network or HTTP failure while talking to the service
    #[error("Transport error for '{url}': {error}")]
    Transport { url: String, error: String },
}

/// Packaging (bundle download + conversion) errors
#[derive(Error, Debug)]
pub enum PackagingError {
    /// Bundle request failed
    #[error("Failed to download conversion bundle from '{url}': {error}")]
    Transport { url: String, error: String },

    /// Bundle is not a usable ZIP archive
    #[error("Invalid conversion bundle '{path}': {error}")]
    Bundle { path: PathBuf, error: String },

    /// No conversion script inside the bundle
    #[error("No conversion script found in '{dir}'")]
    ScriptNotFound { dir: PathBuf },

    /// Script process could not be started
    #[error("Failed to start '{program}': {error}")]
    Spawn { program: String, error: String },

    /// Conversion reported failure
    #[error("Conversion failed: {reason}")]
    Failed { reason: String },

    /// Conversion claimed success but the image is missing
    #[error("Image '{name}' not found after conversion")]
    ArtifactMissing { name: String },

    /// Conversion did not finish in time
    #[error("Conversion timed out after {}s", after.as_secs())]
    TimedOut { after: Duration },

    /// Filesystem error
    #[error("IO error for '{path}': {error}")]
    Io { path: PathBuf, error: String },
}

/// Build-state ledger errors
#[derive(Error, Debug)]
pub enum LedgerError {
    /// Ledger file could not be read
    #[error("Failed to read ledger '{path}': {error}")]
    Read { path: PathBuf, error: String },

    /// Ledger file is corrupt
    #[error("Failed to parse ledger '{path}': {error}")]
    Parse { path: PathBuf, error: String },

    /// Ledger file could not be written
    #[error("Failed to write ledger '{path}': {error}")]
    Write { path: PathBuf, error: String },
}

/// Catalog scraping errors
#[derive(Error, Debug)]
pub enum ScrapeError {
    /// Page could not be fetched
    #[error("Network error fetching '{url}': {error}")]
    Network { url: String, error: String },

    /// Page fetch kept failing
    #[error("Fetching '{url}' failed after {attempts} attempts")]
    MaxRetriesExceeded { url: String, attempts: u32 },

    /// Page did not have the expected structure
    #[error("Unexpected page structure at '{url}': {message}")]
    Structure { url: String, message: String },
}

/// Filesystem errors
#[derive(Error, Debug)]
pub enum FilesystemError {
    /// Failed to create directory
    #[error("Failed to create directory '{path}': {error}")]
    CreateDir { path: PathBuf, error: String },

    /// Failed to remove directory
    #[error("Failed to remove directory '{path}': {error}")]
    RemoveDir { path: PathBuf, error: String },

    /// Failed to write file
    #[error("Failed to write file '{path}': {error}")]
    WriteFile { path: PathBuf, error: String },

    /// Failed to read file
    #[error("Failed to read file '{path}': {error}")]
    ReadFile { path: PathBuf, error: String },

    /// Failed to move file
    #[error("Failed to move '{from}' to '{to}': {error}")]
    Rename {
        from: PathBuf,
        to: PathBuf,
        error: String,
    },
}

/// Configuration loading errors
///
/// Domain errors reach the command handlers directly through `anyhow`.
#[derive(Error, Debug)]
pub enum UupforgeError {
    /// Configuration file not found
    #[error("Configuration not found at '{path}'. Pass --config or create uupforge.toml.")]
    ConfigNotFound { path: PathBuf },

    /// Configuration parse error
    #[error("Failed to parse configuration: {source}")]
    ConfigParse { source: toml::de::Error },

    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),

    /// IO error
    #[error("IO error: {source}")]
    Io { source: std::io::Error },
}
