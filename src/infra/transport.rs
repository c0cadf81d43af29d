//! UUP dump form pages
//!
//! [`HttpProbeTransport`] reads the values offered at each step of the
//! download form from the service's HTML pages. Parsing is kept in plain
//! functions over the page text so it can be tested without a server.

use async_trait::async_trait;
use scraper::{ElementRef, Html};
use std::collections::HashMap;
use url::Url;

use crate::config::urls;
use crate::core::prober::{FormChoice, ProbeTransport};
use crate::error::ProbeError;
use crate::infra::http::{element_text, fetch_text, selector};

/// Probe transport backed by the UUP dump web pages
#[derive(Debug, Clone)]
pub struct HttpProbeTransport {
    client: reqwest::Client,
    base_url: String,
}

impl HttpProbeTransport {
    pub fn new(client: reqwest::Client, base_url: impl Into<String>) -> Self {
        Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
        }
    }

    fn page_url(&self, page: &str, params: &[(&str, &str)]) -> Result<Url, ProbeError> {
        let raw = format!("{}/{page}", self.base_url);
        Url::parse_with_params(&raw, params).map_err(|e| ProbeError::Transport {
            url: raw.clone(),
            error: e.to_string(),
        })
    }

    async fn fetch(&self, url: &Url) -> Result<String, ProbeError> {
        tracing::debug!("GET {url}");
        fetch_text(&self.client, url.as_str())
            .await
            .map_err(|error| ProbeError::Transport {
                url: url.to_string(),
                error,
            })
    }
}

#[async_trait]
impl ProbeTransport for HttpProbeTransport {
    async fn languages(&self, build_id: &str) -> Result<Vec<FormChoice>, ProbeError> {
        let url = self.page_url(urls::SELECT_LANG_PAGE, &[("id", build_id)])?;
        let html = self.fetch(&url).await?;
        parse_languages(&html).map_err(|error| ProbeError::Transport {
            url: url.to_string(),
            error,
        })
    }

    async fn editions(&self, build_id: &str, language: &str) -> Result<Vec<FormChoice>, ProbeError> {
        let url = self.page_url(urls::SELECT_EDITION_PAGE, &[("id", build_id), ("pack", language)])?;
        let html = self.fetch(&url).await?;
        parse_checkbox_group(&html, "edition[]").map_err(|error| ProbeError::Transport {
            url: url.to_string(),
            error,
        })
    }

    async fn virtual_editions(
        &self,
        build_id: &str,
        language: &str,
        compound_edition: &str,
    ) -> Result<Vec<FormChoice>, ProbeError> {
        let url = self.page_url(
            urls::DOWNLOAD_PAGE,
            &[("id", build_id), ("pack", language), ("edition", compound_edition)],
        )?;
        let html = self.fetch(&url).await?;
        parse_checkbox_group(&html, "virtualEditions[]").map_err(|error| ProbeError::Transport {
            url: url.to_string(),
            error,
        })
    }
}

/// Languages on a `selectlang.php` page.
///
/// Read from the `pack` dropdown, else from links carrying `pack=`, else
/// from a hidden `pack` input when the build has a single language.
pub fn parse_languages(html: &str) -> Result<Vec<FormChoice>, String> {
    let doc = Html::parse_document(html);
    let mut choices: Vec<FormChoice> = Vec::new();

    for option in doc.select(&selector(r#"select[name="pack"] option"#)?) {
        if let Some(value) = option.value().attr("value").filter(|v| !v.is_empty()) {
            choices.push(FormChoice::new(element_text(&option), value));
        }
    }
    if !choices.is_empty() {
        return Ok(choices);
    }

    let base = Url::parse("https://uupdump.invalid/").map_err(|e| e.to_string())?;
    for link in doc.select(&selector(r#"a[href*="pack="]"#)?) {
        let Some(href) = link.value().attr("href") else {
            continue;
        };
        let Ok(target) = base.join(href) else {
            continue;
        };
        if let Some((_, pack)) = target.query_pairs().find(|(k, v)| k == "pack" && !v.is_empty()) {
            if !choices.iter().any(|c| c.value == pack) {
                choices.push(FormChoice::new(element_text(&link), pack.into_owned()));
            }
        }
    }
    if !choices.is_empty() {
        return Ok(choices);
    }

    if let Some(hidden) = doc.select(&selector(r#"input[name="pack"]"#)?).next() {
        if let Some(value) = hidden.value().attr("value").filter(|v| !v.is_empty()) {
            choices.push(FormChoice::new("Default", value));
        }
    }
    Ok(choices)
}

/// Values of the inputs named `name`, labelled by their `<label for>` or
/// the surrounding element's text
pub fn parse_checkbox_group(html: &str, name: &str) -> Result<Vec<FormChoice>, String> {
    let doc = Html::parse_document(html);

    let labels: HashMap<String, String> = doc
        .select(&selector("label[for]")?)
        .filter_map(|label| {
            let target = label.value().attr("for")?;
            Some((target.to_string(), element_text(&label)))
        })
        .collect();

    let mut choices: Vec<FormChoice> = Vec::new();
    for input in doc.select(&selector(&format!(r#"input[name="{name}"]"#))?) {
        let Some(value) = input.value().attr("value").filter(|v| !v.is_empty()) else {
            continue;
        };
        if choices.iter().any(|c| c.value == value) {
            continue;
        }
        let label = input
            .value()
            .id()
            .and_then(|id| labels.get(id).cloned())
            .or_else(|| input.parent().and_then(ElementRef::wrap).map(|p| element_text(&p)))
            .filter(|l| !l.is_empty())
            .unwrap_or_else(|| value.to_string());
        choices.push(FormChoice::new(label, value));
    }
    Ok(choices)
}
