//! Selection rules
//!
//! A rule declares which build to pick from a catalog category and which
//! language, editions and conversion options to request for it. Rules are
//! read from the `[[rule]]` tables of the configuration as [`RuleSpec`] and
//! validated once at startup into [`SelectionRule`].

use regex::Regex;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::fmt;

use crate::core::catalog::Architecture;
use crate::error::RuleError;

/// Download method (`autodl` form field)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DownloadMethod {
    /// Download script only
    ScriptOnly,
    /// Download and convert to ISO
    Convert,
    /// Download, add virtual editions and convert to ISO
    ConvertWithVirtualEditions,
}

impl DownloadMethod {
    /// Numeric value used by the service
    pub fn value(self) -> u8 {
        match self {
            Self::ScriptOnly => 1,
            Self::Convert => 2,
            Self::ConvertWithVirtualEditions => 3,
        }
    }

    /// Value as submitted in the form
    pub fn form_value(self) -> String {
        self.value().to_string()
    }

    fn from_value(value: i64) -> Option<Self> {
        match value {
            1 => Some(Self::ScriptOnly),
            2 => Some(Self::Convert),
            3 => Some(Self::ConvertWithVirtualEditions),
            _ => None,
        }
    }
}

impl fmt::Display for DownloadMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.value())
    }
}

/// Boolean conversion flag
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ConversionOption {
    /// Integrate updates
    Updates,
    /// Run component cleanup after conversion
    Cleanup,
    /// Integrate .NET Framework 3.5
    NetFx,
    /// Create install.esd instead of install.wim
    Esd,
}

impl ConversionOption {
    /// Form field name
    pub fn field(self) -> &'static str {
        match self {
            Self::Updates => "updates",
            Self::Cleanup => "cleanup",
            Self::NetFx => "netfx",
            Self::Esd => "esd",
        }
    }

    fn parse(name: &str) -> Option<Self> {
        match name.trim().to_ascii_lowercase().as_str() {
            "updates" => Some(Self::Updates),
            "cleanup" => Some(Self::Cleanup),
            "netfx" => Some(Self::NetFx),
            "esd" => Some(Self::Esd),
            _ => None,
        }
    }
}

/// Which virtual editions a rule asks for
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum VirtualEditions {
    /// Nothing beyond the base editions
    None,
    /// Every virtual edition the build offers
    All,
    /// These editions, in this order, where available
    Listed(Vec<String>),
}

impl VirtualEditions {
    /// Whether any virtual edition is requested
    pub fn is_requested(&self) -> bool {
        match self {
            Self::None => false,
            Self::All => true,
            Self::Listed(list) => !list.is_empty(),
        }
    }
}

/// Raw `download_method` value: `3` or `"3"`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum RawDownloadMethod {
    Number(i64),
    Text(String),
}

/// Raw `virtual_editions` value: a list or the keyword `"all"`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum RawVirtualEditions {
    Keyword(String),
    List(Vec<String>),
}

impl Default for RawVirtualEditions {
    fn default() -> Self {
        Self::List(Vec::new())
    }
}

/// A rule as written in the configuration file
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RuleSpec {
    /// Unique rule name (ledger key)
    #[serde(default)]
    pub name: String,

    /// Catalog category to search
    #[serde(default)]
    pub category: String,

    /// Regular expression matched against build titles
    #[serde(default)]
    pub title_pattern: String,

    /// Architecture filter
    #[serde(default)]
    pub arch: String,

    /// Language code, e.g. "en-us"
    #[serde(default)]
    pub language: String,

    /// Base editions, e.g. `["PROFESSIONAL", "CORE"]`
    #[serde(default)]
    pub editions: Vec<String>,

    /// Virtual editions to add
    #[serde(default)]
    pub virtual_editions: RawVirtualEditions,

    /// Download method (1, 2 or 3)
    #[serde(default)]
    pub download_method: Option<RawDownloadMethod>,

    /// Conversion flags
    #[serde(default)]
    pub options: Vec<String>,
}

/// Title regular expression
#[derive(Debug, Clone)]
pub struct TitlePattern(Regex);

impl TitlePattern {
    /// Compile a pattern
    pub fn new(pattern: &str) -> Result<Self, regex::Error> {
        Regex::new(pattern).map(Self)
    }

    /// Whether the title matches anywhere (use `^` to anchor)
    pub fn matches(&self, title: &str) -> bool {
        self.0.is_match(title)
    }

    /// Source text of the pattern
    pub fn as_str(&self) -> &str {
        self.0.as_str()
    }
}

impl PartialEq for TitlePattern {
    fn eq(&self, other: &Self) -> bool {
        self.as_str() == other.as_str()
    }
}

/// A validated selection rule
#[derive(Debug, Clone, PartialEq)]
pub struct SelectionRule {
    pub name: String,
    pub category: String,
    pub title_pattern: TitlePattern,
    pub arch: Architecture,
    pub language: String,
    pub editions: Vec<String>,
    pub virtual_editions: VirtualEditions,
    pub download_method: DownloadMethod,
    pub options: Vec<ConversionOption>,
}

impl TryFrom<&RuleSpec> for SelectionRule {
    type Error = RuleError;

    fn try_from(spec: &RuleSpec) -> Result<Self, Self::Error> {
        let name = spec.name.trim().to_string();
        if name.is_empty() {
            return Err(RuleError::EmptyName);
        }

        let missing = |field: &str| RuleError::MissingField {
            rule: name.clone(),
            field: field.to_string(),
        };
        let required = |field: &str, value: &str| {
            if value.trim().is_empty() {
                Err(missing(field))
            } else {
                Ok(value.trim().to_string())
            }
        };
        let category = required("category", &spec.category)?;
        let pattern = required("title_pattern", &spec.title_pattern)?;
        let language = required("language", &spec.language)?.to_ascii_lowercase();

        let editions: Vec<String> = spec
            .editions
            .iter()
            .map(|e| e.trim().to_string())
            .filter(|e| !e.is_empty())
            .collect();
        if editions.is_empty() {
            return Err(missing("editions"));
        }

        let title_pattern = TitlePattern::new(&pattern).map_err(|e| RuleError::InvalidPattern {
            rule: name.clone(),
            pattern: pattern.clone(),
            error: e.to_string(),
        })?;

        let arch = required("arch", &spec.arch)?
            .parse::<Architecture>()
            .map_err(|_| RuleError::UnknownArchitecture {
                rule: name.clone(),
                arch: spec.arch.clone(),
            })?;

        let raw_method = spec.download_method.as_ref().ok_or_else(|| missing("download_method"))?;
        let download_method = parse_download_method(&name, raw_method)?;

        let mut options = Vec::new();
        for raw in &spec.options {
            let option = ConversionOption::parse(raw).ok_or_else(|| RuleError::UnknownOption {
                rule: name.clone(),
                option: raw.clone(),
            })?;
            if !options.contains(&option) {
                options.push(option);
            }
        }

        let virtual_editions = parse_virtual_editions(&name, &spec.virtual_editions)?;

        // autodl=3 iff virtual editions are requested
        match (virtual_editions.is_requested(), download_method) {
            (true, DownloadMethod::ConvertWithVirtualEditions)
            | (false, DownloadMethod::ScriptOnly | DownloadMethod::Convert) => {}
            (true, method) => {
                return Err(RuleError::VirtualEditionsRequireMethod3 {
                    rule: name,
                    method: method.value(),
                })
            }
            (false, DownloadMethod::ConvertWithVirtualEditions) => {
                return Err(RuleError::Method3RequiresVirtualEditions { rule: name })
            }
        }

        Ok(Self {
            name,
            category,
            title_pattern,
            arch,
            language,
            editions,
            virtual_editions,
            download_method,
            options,
        })
    }
}

fn parse_download_method(rule: &str, raw: &RawDownloadMethod) -> Result<DownloadMethod, RuleError> {
    let (value, text) = match raw {
        RawDownloadMethod::Number(n) => (Some(*n), n.to_string()),
        RawDownloadMethod::Text(s) => (s.trim().parse::<i64>().ok(), s.clone()),
    };
    value
        .and_then(DownloadMethod::from_value)
        .ok_or_else(|| RuleError::InvalidDownloadMethod {
            rule: rule.to_string(),
            method: text,
        })
}

fn parse_virtual_editions(rule: &str, raw: &RawVirtualEditions) -> Result<VirtualEditions, RuleError> {
    match raw {
        RawVirtualEditions::Keyword(word) if word.trim().eq_ignore_ascii_case("all") => {
            Ok(VirtualEditions::All)
        }
        RawVirtualEditions::Keyword(word) => Err(RuleError::InvalidVirtualEditions {
            rule: rule.to_string(),
            value: word.clone(),
        }),
        RawVirtualEditions::List(list) => {
            let mut seen = HashSet::new();
            let list: Vec<String> = list
                .iter()
                .map(|v| v.trim().to_string())
                .filter(|v| !v.is_empty() && seen.insert(v.to_ascii_lowercase()))
                .collect();
            if list.is_empty() {
                Ok(VirtualEditions::None)
            } else {
                Ok(VirtualEditions::Listed(list))
            }
        }
    }
}

/// A configured rule after validation
#[derive(Debug, Clone)]
pub enum ConfiguredRule {
    /// Ready to run
    Valid(SelectionRule),
    /// Rejected at startup; reported as failed without probing
    Invalid { name: String, error: RuleError },
}

impl ConfiguredRule {
    /// Rule name as declared
    pub fn name(&self) -> &str {
        match self {
            Self::Valid(rule) => &rule.name,
            Self::Invalid { name, .. } => name,
        }
    }
}

/// Validate every rule in declaration order.
///
/// Invalid rules are kept in place so they still get a status in the run
/// summary. A repeated name invalidates every occurrence after the first.
pub fn validate_rules(specs: &[RuleSpec]) -> Vec<ConfiguredRule> {
    let mut seen = HashSet::new();

    specs
        .iter()
        .map(|spec| {
            let name = spec.name.trim().to_string();
            if !name.is_empty() && !seen.insert(name.clone()) {
                return ConfiguredRule::Invalid {
                    error: RuleError::DuplicateName { rule: name.clone() },
                    name,
                };
            }
            match SelectionRule::try_from(spec) {
                Ok(rule) => ConfiguredRule::Valid(rule),
                Err(error) => ConfiguredRule::Invalid { name, error },
            }
        })
        .collect()
}
