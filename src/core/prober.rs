//! Parameter probing
//!
//! The UUP dump download form is dependent: the editions on offer depend on
//! the chosen language, and the virtual editions depend on the chosen
//! editions. [`ParameterProber`] walks those steps in order, each one a
//! separate stage that returns a typed value or a named failure.

use async_trait::async_trait;
use serde::Serialize;

use crate::core::rule::{ConversionOption, DownloadMethod, SelectionRule, VirtualEditions};
use crate::error::ProbeError;

/// One selectable value on a service page
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FormChoice {
    /// Human-readable label
    pub label: String,
    /// Value submitted to the service
    pub value: String,
}

impl FormChoice {
    pub fn new(label: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            label: label.into(),
            value: value.into(),
        }
    }
}

/// Source of the values offered at each step of the download form
#[async_trait]
pub trait ProbeTransport: Send + Sync {
    /// Languages offered for a build
    async fn languages(&self, build_id: &str) -> Result<Vec<FormChoice>, ProbeError>;

    /// Editions offered for a build in a language
    async fn editions(&self, build_id: &str, language: &str)
        -> Result<Vec<FormChoice>, ProbeError>;

    /// Virtual editions offered for a build, language and compound edition
    async fn virtual_editions(
        &self,
        build_id: &str,
        language: &str,
        compound_edition: &str,
    ) -> Result<Vec<FormChoice>, ProbeError>;
}

/// Join edition values into the compound form used by the service
/// (`professional;core`).
pub fn compound_edition<S: AsRef<str>>(editions: &[S]) -> String {
    editions
        .iter()
        .map(|e| e.as_ref().to_lowercase())
        .collect::<Vec<_>>()
        .join(";")
}

/// Concrete form parameters for one build
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ResolvedParameters {
    pub build_id: String,
    /// Language value as offered by the service
    pub language: String,
    /// Edition values as offered, in rule order
    pub editions: Vec<String>,
    /// `editions` lower-cased and joined with `;`
    pub compound_edition: String,
    #[serde(serialize_with = "serialize_method")]
    pub download_method: DownloadMethod,
    #[serde(serialize_with = "serialize_options")]
    pub options: Vec<ConversionOption>,
    /// Requested virtual editions that the build offers
    pub virtual_editions: Vec<String>,
}

fn serialize_method<S: serde::Serializer>(m: &DownloadMethod, s: S) -> Result<S::Ok, S::Error> {
    s.serialize_u8(m.value())
}

fn serialize_options<S: serde::Serializer>(
    options: &[ConversionOption],
    s: S,
) -> Result<S::Ok, S::Error> {
    s.collect_seq(options.iter().map(|o| o.field()))
}

impl ResolvedParameters {
    /// Query string pairs for `get.php`
    pub fn query_pairs(&self) -> Vec<(&'static str, String)> {
        vec![
            ("id", self.build_id.clone()),
            ("pack", self.language.clone()),
            ("edition", self.compound_edition.clone()),
        ]
    }

    /// Form body fields for `get.php`, in submission order
    pub fn form_fields(&self) -> Vec<(String, String)> {
        let mut fields = vec![("autodl".to_string(), self.download_method.form_value())];
        for option in &self.options {
            fields.push((option.field().to_string(), "1".to_string()));
        }
        for edition in &self.virtual_editions {
            fields.push(("virtualEditions[]".to_string(), edition.clone()));
        }
        fields
    }
}

/// Walks the dependent form steps for a rule and a build
pub struct ParameterProber<'a> {
    transport: &'a dyn ProbeTransport,
}

impl<'a> ParameterProber<'a> {
    pub fn new(transport: &'a dyn ProbeTransport) -> Self {
        Self { transport }
    }

    /// Resolve the full parameter set for `build_id`
    pub async fn probe(
        &self,
        rule: &SelectionRule,
        build_id: &str,
    ) -> Result<ResolvedParameters, ProbeError> {
        let language = self.resolve_language(rule, build_id).await?;
        let editions = self.resolve_editions(rule, build_id, &language).await?;
        let compound = compound_edition(&editions);
        let virtual_editions = self
            .resolve_virtual_editions(rule, build_id, &language, &compound)
            .await?;

        Ok(ResolvedParameters {
            build_id: build_id.to_string(),
            language,
            editions,
            compound_edition: compound,
            download_method: rule.download_method,
            options: rule.options.clone(),
            virtual_editions,
        })
    }

    /// Stage 1: the offered language equal to the rule's language
    pub async fn resolve_language(
        &self,
        rule: &SelectionRule,
        build_id: &str,
    ) -> Result<String, ProbeError> {
        let offered = self.transport.languages(build_id).await?;
        tracing::debug!("Build {build_id} offers {} languages", offered.len());

        offered
            .iter()
            .find(|choice| choice.value.eq_ignore_ascii_case(&rule.language))
            .map(|choice| choice.value.clone())
            .ok_or_else(|| ProbeError::NoLanguageMatch {
                build: build_id.to_string(),
                requested: rule.language.clone(),
                offered: offered.into_iter().map(|c| c.value).collect(),
            })
    }

    /// Stage 2: every requested edition, as offered by the service, in rule
    /// order. A build missing any of them fails the stage.
    pub async fn resolve_editions(
        &self,
        rule: &SelectionRule,
        build_id: &str,
        language: &str,
    ) -> Result<Vec<String>, ProbeError> {
        let offered = self.transport.editions(build_id, language).await?;

        let mut selected = Vec::new();
        let mut missing = Vec::new();
        for wanted in &rule.editions {
            match offered.iter().find(|c| c.value.eq_ignore_ascii_case(wanted)) {
                Some(choice) if !selected.contains(&choice.value) => selected.push(choice.value.clone()),
                Some(_) => {}
                None => missing.push(wanted.clone()),
            }
        }

        let offered_values = || -> Vec<String> { offered.iter().map(|c| c.value.clone()).collect() };
        if selected.is_empty() {
            return Err(ProbeError::NoEditionsFound {
                build: build_id.to_string(),
                language: language.to_string(),
                requested: rule.editions.clone(),
                offered: offered_values(),
            });
        }
        if !missing.is_empty() {
            return Err(ProbeError::EditionsUnavailable {
                build: build_id.to_string(),
                language: language.to_string(),
                missing,
                offered: offered_values(),
            });
        }
        Ok(selected)
    }

    /// Stage 3: confirmed virtual editions (empty unless download method 3)
    pub async fn resolve_virtual_editions(
        &self,
        rule: &SelectionRule,
        build_id: &str,
        language: &str,
        compound: &str,
    ) -> Result<Vec<String>, ProbeError> {
        if rule.download_method != DownloadMethod::ConvertWithVirtualEditions {
            return Ok(Vec::new());
        }

        let available = self
            .transport
            .virtual_editions(build_id, language, compound)
            .await?;
        if available.is_empty() {
            tracing::warn!(
                "Rule '{}': build {build_id} offers no virtual editions for '{compound}', continuing without",
                rule.name
            );
            return Ok(Vec::new());
        }

        let confirmed = match &rule.virtual_editions {
            VirtualEditions::None => Vec::new(),
            VirtualEditions::All => available.into_iter().map(|c| c.value).collect(),
            VirtualEditions::Listed(requested) => {
                let mut confirmed = Vec::new();
                for wanted in requested {
                    match available.iter().find(|c| c.value.eq_ignore_ascii_case(wanted)) {
                        Some(choice) => confirmed.push(choice.value.clone()),
                        None => tracing::warn!(
                            "Rule '{}': virtual edition {wanted} is not available for build {build_id}",
                            rule.name
                        ),
                    }
                }
                confirmed
            }
        };
        Ok(confirmed)
    }
}
