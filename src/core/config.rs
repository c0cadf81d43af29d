//! Application configuration
//!
//! Settings and selection rules come from one TOML file, `uupforge.toml`:
//!
//! ```toml
//! [service]
//! base_url = "https://uupdump.net"
//!
//! [paths]
//! catalog_dir = "catalog"
//! ledger = "build_state.json"
//!
//! [packaging]
//! timeout_secs = 7200
//! monitor_script = "monitor-uup-script.ps1"
//!
//! [[rule]]
//! name = "Win11_24H2_x64_Latest"
//! category = "w11-24h2"
//! title_pattern = "^Windows 11, version 24H2"
//! arch = "x64"
//! language = "zh-cn"
//! editions = ["PROFESSIONAL", "CORE"]
//! virtual_editions = ["Enterprise"]
//! download_method = 3
//! options = ["updates", "cleanup", "netfx", "esd"]
//! ```
//!
//! String values may reference environment variables as `${VAR}`. Relative
//! paths are resolved against the directory holding the config file.

use regex::Regex;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::config::{defaults, urls};
use crate::core::rule::RuleSpec;
use crate::error::UupforgeError;
use crate::infra::dirs::UupforgeDirs;

/// Parsed configuration file
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AppConfig {
    #[serde(default)]
    pub service: ServiceConfig,

    #[serde(default)]
    pub paths: PathsConfig,

    #[serde(default)]
    pub packaging: PackagingConfig,

    #[serde(default)]
    pub scrape: ScrapeConfig,

    /// Selection rules in declaration order
    #[serde(default, rename = "rule")]
    pub rules: Vec<RuleSpec>,

    /// Directory relative paths resolve against
    #[serde(skip)]
    pub base_dir: Option<PathBuf>,
}

/// UUP dump service settings
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ServiceConfig {
    pub base_url: Option<String>,
    pub user_agent: Option<String>,
    pub request_timeout_secs: Option<u64>,
}

/// Storage locations
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PathsConfig {
    pub catalog_dir: Option<PathBuf>,
    pub ledger: Option<PathBuf>,
    pub output_dir: Option<PathBuf>,
    pub work_dir: Option<PathBuf>,
}

/// Conversion settings
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PackagingConfig {
    /// Upper bound for one conversion, in seconds
    pub timeout_secs: Option<u64>,
    /// PowerShell monitor wrapping the conversion script
    pub monitor_script: Option<PathBuf>,
    /// Shell used to run the monitor
    pub shell: Option<String>,
}

/// Catalog scraping settings
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ScrapeConfig {
    pub max_attempts: Option<u32>,
    pub base_delay_ms: Option<u64>,
    pub page_delay_ms: Option<u64>,
}

/// Replace `${VAR}` with the variable's value (empty when unset)
pub fn substitute_env_vars(input: &str) -> Result<String, UupforgeError> {
    let re = Regex::new(r"\$\{([A-Za-z_][A-Za-z0-9_]*)\}")
        .map_err(|e| UupforgeError::Config(format!("Invalid substitution pattern: {e}")))?;

    Ok(re
        .replace_all(input, |caps: &regex::Captures<'_>| {
            std::env::var(&caps[1]).unwrap_or_default()
        })
        .into_owned())
}

fn substitute_in_value(value: &mut toml::Value) -> Result<(), UupforgeError> {
    match value {
        toml::Value::String(s) => *s = substitute_env_vars(s)?,
        toml::Value::Array(items) => {
            for item in items {
                substitute_in_value(item)?;
            }
        }
        toml::Value::Table(table) => {
            for (_, v) in table.iter_mut() {
                substitute_in_value(v)?;
            }
        }
        _ => {}
    }
    Ok(())
}

impl AppConfig {
    /// Find the config file: `explicit`, else `./uupforge.toml`, else the
    /// per-user config. `Ok(None)` when there is none.
    pub fn locate(explicit: Option<&Path>, dirs: &UupforgeDirs) -> Result<Option<PathBuf>, UupforgeError> {
        if let Some(path) = explicit {
            if !path.is_file() {
                return Err(UupforgeError::ConfigNotFound {
                    path: path.to_path_buf(),
                });
            }
            return Ok(Some(path.to_path_buf()));
        }

        let local = PathBuf::from(defaults::CONFIG_FILE_NAME);
        if local.is_file() {
            return Ok(Some(local));
        }
        let user = dirs.user_config_path();
        Ok(user.is_file().then_some(user))
    }

    /// Load from the located file, or defaults without rules
    pub fn discover(explicit: Option<&Path>, dirs: &UupforgeDirs) -> Result<Self, UupforgeError> {
        match Self::locate(explicit, dirs)? {
            Some(path) => {
                tracing::debug!("Loading configuration from {}", path.display());
                Self::load(&path)
            }
            None => {
                tracing::debug!("No configuration file found, using defaults");
                Ok(Self::default())
            }
        }
    }

    /// Load a config file with environment substitution
    pub fn load(path: &Path) -> Result<Self, UupforgeError> {
        let content = std::fs::read_to_string(path).map_err(|e| UupforgeError::Io { source: e })?;
        let mut config = Self::from_toml(&content)?;
        config.base_dir = path
            .parent()
            .map(|p| if p.as_os_str().is_empty() { PathBuf::from(".") } else { p.to_path_buf() });
        Ok(config)
    }

    /// Parse TOML text with environment substitution
    pub fn from_toml(content: &str) -> Result<Self, UupforgeError> {
        let mut value: toml::Value =
            toml::from_str(content).map_err(|e| UupforgeError::ConfigParse { source: e })?;
        substitute_in_value(&mut value)?;
        value
            .try_into()
            .map_err(|e| UupforgeError::ConfigParse { source: e })
    }

    fn resolve(&self, path: &Path) -> PathBuf {
        match &self.base_dir {
            Some(base) if path.is_relative() => base.join(path),
            _ => path.to_path_buf(),
        }
    }

    /// Service root URL without trailing slash
    pub fn base_url(&self) -> String {
        self.service
            .base_url
            .as_deref()
            .unwrap_or(urls::UUP_DUMP)
            .trim_end_matches('/')
            .to_string()
    }

    pub fn user_agent(&self) -> &str {
        self.service.user_agent.as_deref().unwrap_or(urls::USER_AGENT)
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(
            self.service
                .request_timeout_secs
                .unwrap_or(defaults::REQUEST_TIMEOUT_SECS),
        )
    }

    pub fn catalog_dir(&self, dirs: &UupforgeDirs) -> PathBuf {
        self.paths
            .catalog_dir
            .as_deref()
            .map_or_else(|| dirs.catalog_dir(), |p| self.resolve(p))
    }

    pub fn ledger_path(&self, dirs: &UupforgeDirs) -> PathBuf {
        self.paths
            .ledger
            .as_deref()
            .map_or_else(|| dirs.ledger_path(), |p| self.resolve(p))
    }

    pub fn output_dir(&self, dirs: &UupforgeDirs) -> PathBuf {
        self.paths
            .output_dir
            .as_deref()
            .map_or_else(|| dirs.output_dir(), |p| self.resolve(p))
    }

    pub fn work_dir(&self, dirs: &UupforgeDirs) -> PathBuf {
        self.paths
            .work_dir
            .as_deref()
            .map_or_else(|| dirs.work_dir(), |p| self.resolve(p))
    }

    /// Upper bound for one packaging call
    pub fn packaging_timeout(&self) -> Duration {
        Duration::from_secs(
            self.packaging
                .timeout_secs
                .unwrap_or(defaults::PACKAGING_TIMEOUT_SECS),
        )
    }

    pub fn monitor_script(&self) -> Option<PathBuf> {
        self.packaging.monitor_script.as_deref().map(|p| self.resolve(p))
    }

    pub fn shell(&self) -> &str {
        self.packaging.shell.as_deref().unwrap_or(defaults::MONITOR_SHELL)
    }

    pub fn scrape_attempts(&self) -> u32 {
        self.scrape
            .max_attempts
            .unwrap_or(defaults::MAX_SCRAPE_ATTEMPTS)
            .max(1)
    }

    pub fn scrape_base_delay(&self) -> Duration {
        Duration::from_millis(
            self.scrape
                .base_delay_ms
                .unwrap_or(defaults::SCRAPE_BASE_DELAY_MS),
        )
    }

    pub fn scrape_page_delay(&self) -> Duration {
        Duration::from_millis(
            self.scrape
                .page_delay_ms
                .unwrap_or(defaults::SCRAPE_PAGE_DELAY_MS),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::rule::RawDownloadMethod;
    use tempfile::TempDir;

    const SAMPLE: &str = r#"
[service]
base_url = "http://localhost:8080/"

[paths]
catalog_dir = "catalog"
ledger = "/var/lib/uupforge/build_state.json"

[packaging]
timeout_secs = 60

[[rule]]
name = "Win11_24H2_x64_Latest"
category = "w11-24h2"
title_pattern = "^Windows 11, version 24H2"
arch = "x64"
language = "zh-cn"
editions = ["PROFESSIONAL", "CORE"]
virtual_editions = ["Enterprise"]
download_method = "3"
options = ["updates", "cleanup", "netfx", "esd"]

[[rule]]
name = "Win10"
category = "w10-22h2"
title_pattern = "^Windows 10"
arch = "amd64"
language = "en-us"
editions = ["PROFESSIONAL"]
download_method = 2
"#;

    #[test]
    fn test_parse_sample() {
        let config = AppConfig::from_toml(SAMPLE).unwrap();

        assert_eq!(config.base_url(), "http://localhost:8080");
        assert_eq!(config.packaging_timeout(), Duration::from_secs(60));
        assert_eq!(config.rules.len(), 2);
        assert_eq!(config.rules[0].name, "Win11_24H2_x64_Latest");
        assert_eq!(
            config.rules[0].download_method,
            Some(RawDownloadMethod::Text("3".to_string()))
        );
        assert_eq!(config.rules[1].download_method, Some(RawDownloadMethod::Number(2)));
    }

    #[test]
    fn test_defaults() {
        let config = AppConfig::default();
        assert_eq!(config.base_url(), "https://uupdump.net");
        assert_eq!(config.packaging_timeout(), Duration::from_secs(7200));
        assert_eq!(config.scrape_attempts(), 3);
        assert_eq!(config.shell(), "powershell.exe");
        assert!(config.rules.is_empty());
    }

    #[test]
    fn test_relative_paths_resolve_against_config_dir() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("uupforge.toml");
        std::fs::write(&path, SAMPLE).unwrap();

        let config = AppConfig::load(&path).unwrap();
        let dirs = UupforgeDirs::new();

        assert_eq!(config.catalog_dir(&dirs), dir.path().join("catalog"));
        assert_eq!(
            config.ledger_path(&dirs),
            PathBuf::from("/var/lib/uupforge/build_state.json")
        );
        assert_eq!(config.output_dir(&dirs), dirs.output_dir());
    }

    #[test]
    fn test_env_substitution() {
        std::env::set_var("UUPFORGE_TEST_LANG", "de-de");
        let config = AppConfig::from_toml(
            r#"
[[rule]]
name = "r"
category = "c"
title_pattern = "^Windows"
arch = "x64"
language = "${UUPFORGE_TEST_LANG}"
editions = ["CORE"]
download_method = 2
"#,
        )
        .unwrap();
        std::env::remove_var("UUPFORGE_TEST_LANG");

        assert_eq!(config.rules[0].language, "de-de");
    }

    #[test]
    fn test_substitute_unset_is_empty() {
        assert_eq!(
            substitute_env_vars("a${UUPFORGE_SURELY_UNSET_VAR}b").unwrap(),
            "ab"
        );
        assert_eq!(substitute_env_vars("no vars").unwrap(), "no vars");
    }

    #[test]
    fn test_invalid_toml() {
        assert!(matches!(
            AppConfig::from_toml("[service\nbase_url = 1"),
            Err(UupforgeError::ConfigParse { .. })
        ));
    }

    #[test]
    fn test_explicit_missing_config() {
        let dirs = UupforgeDirs::new();
        let err = AppConfig::locate(Some(Path::new("/nonexistent/uupforge.toml")), &dirs).unwrap_err();
        assert!(matches!(err, UupforgeError::ConfigNotFound { .. }));
    }
}
