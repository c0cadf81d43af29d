//! Platform-specific directory management
//!
//! Provides platform-specific paths for cache, config, and data directories.
//! Follows XDG Base Directory Specification on Linux and standard locations
//! on macOS and Windows.
//!
//! Environment variables can override default directories:
//! - `UUPFORGE_CACHE_DIR` - Override cache directory
//! - `UUPFORGE_CONFIG_DIR` - Override config directory
//! - `UUPFORGE_DATA_DIR` - Override data directory

use std::env;
use std::path::PathBuf;

/// Environment variable names for directory overrides
pub const ENV_CACHE_DIR: &str = "UUPFORGE_CACHE_DIR";
pub const ENV_CONFIG_DIR: &str = "UUPFORGE_CONFIG_DIR";
pub const ENV_DATA_DIR: &str = "UUPFORGE_DATA_DIR";

/// Application name used in directory paths
const APP_NAME: &str = "uupforge";

/// Subdirectory names
const CATALOG_SUBDIR: &str = "catalog";
const OUTPUT_SUBDIR: &str = "output";
const WORK_SUBDIR: &str = "work";

/// Platform-specific directory provider for uupforge
#[derive(Debug, Clone)]
pub struct UupforgeDirs {
    cache_dir: PathBuf,
    config_dir: PathBuf,
    data_dir: PathBuf,
}

impl UupforgeDirs {
    /// Checks environment variables first, then falls back to platform defaults.
    #[must_use]
    pub fn new() -> Self {
        Self {
            cache_dir: resolve(ENV_CACHE_DIR, dirs::cache_dir, &[".cache"]),
            config_dir: resolve(ENV_CONFIG_DIR, dirs::config_dir, &[".config"]),
            data_dir: resolve(ENV_DATA_DIR, dirs::data_dir, &[".local", "share"]),
        }
    }

    /// Cache directory (bundle downloads and extraction)
    #[must_use]
    pub fn cache_dir(&self) -> PathBuf {
        self.cache_dir.clone()
    }

    /// Config directory
    #[must_use]
    pub fn config_dir(&self) -> PathBuf {
        self.config_dir.clone()
    }

    /// Data directory (catalog, ledger, images)
    #[must_use]
    pub fn data_dir(&self) -> PathBuf {
        self.data_dir.clone()
    }

    /// Default catalog directory
    #[must_use]
    pub fn catalog_dir(&self) -> PathBuf {
        self.data_dir.join(CATALOG_SUBDIR)
    }

    /// Default ledger file
    #[must_use]
    pub fn ledger_path(&self) -> PathBuf {
        self.data_dir.join(crate::config::defaults::LEDGER_FILE_NAME)
    }

    /// Default image output directory
    #[must_use]
    pub fn output_dir(&self) -> PathBuf {
        self.data_dir.join(OUTPUT_SUBDIR)
    }

    /// Default packaging work directory
    #[must_use]
    pub fn work_dir(&self) -> PathBuf {
        self.cache_dir.join(WORK_SUBDIR)
    }

    /// Per-user config file, `<config dir>/config.toml`
    #[must_use]
    pub fn user_config_path(&self) -> PathBuf {
        self.config_dir.join("config.toml")
    }
}

/// Environment override, else platform directory, else a dotted
/// directory under home, else under the current directory
fn resolve(var: &str, platform: fn() -> Option<PathBuf>, fallback: &[&str]) -> PathBuf {
    if let Ok(path) = env::var(var) {
        if !path.is_empty() {
            return PathBuf::from(path);
        }
    }

    platform().map(|p| p.join(APP_NAME)).unwrap_or_else(|| {
        let mut base = dirs::home_dir().unwrap_or_else(|| PathBuf::from("."));
        for part in fallback {
            base.push(part);
        }
        base.join(APP_NAME)
    })
}

impl Default for UupforgeDirs {
    fn default() -> Self {
        Self::new()
    }
}
