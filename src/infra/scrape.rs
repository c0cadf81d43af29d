//! Catalog scraping
//!
//! Reads the channel menu from the UUP dump home page and the paged build
//! listings (`known.php?q=category:<c>&p=<n>`) of each channel.

use chrono::{DateTime, Utc};
use scraper::Html;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use url::Url;

use crate::config::urls;
use crate::core::catalog::{source_id_from_href, CatalogEntry, CatalogPartition};
use crate::error::ScrapeError;
use crate::infra::http::{element_text, fetch_text, selector};

/// One entry of the home page channel menu
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChannelLink {
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
    #[serde(default)]
    pub is_dropdown: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub category: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub sub_links: Vec<ChannelLink>,
}

/// Contents of `index.json`
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CatalogIndex {
    pub scraped_at: DateTime<Utc>,
    pub hierarchy: Vec<ChannelLink>,
}

/// A listing to scrape
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Channel {
    pub category: String,
    pub name: String,
    pub url: String,
    pub parent_name: Option<String>,
}

/// Category from a `known.php?q=category:<c>` link
pub fn category_from_url(url: &str) -> Option<String> {
    let parsed = Url::parse(url).ok()?;
    parsed
        .query_pairs()
        .find(|(k, _)| k == "q")
        .map(|(_, q)| q.trim_start_matches("category:").to_string())
        .filter(|c| !c.is_empty())
}

/// File-safe category derived from a display name
pub fn safe_category(name: &str) -> String {
    name.chars()
        .map(|c| if c.is_ascii_alphanumeric() { c.to_ascii_lowercase() } else { '_' })
        .collect()
}

/// Listings in menu order; dropdown entries contribute their sub-links
pub fn flatten_channels(hierarchy: &[ChannelLink]) -> Vec<Channel> {
    let mut channels = Vec::new();
    let mut push = |link: &ChannelLink, parent: Option<&str>| {
        if let Some(url) = &link.url {
            channels.push(Channel {
                category: link.category.clone().unwrap_or_else(|| safe_category(&link.name)),
                name: link.name.clone(),
                url: url.clone(),
                parent_name: parent.map(str::to_string),
            });
        }
    };

    for item in hierarchy {
        if item.is_dropdown {
            for sub in &item.sub_links {
                push(sub, Some(item.name.as_str()));
            }
        } else {
            push(item, None);
        }
    }
    channels
}

fn absolute(base: &Url, href: &str) -> String {
    base.join(href).map_or_else(|_| href.to_string(), |u| u.to_string())
}

/// Channel menu of the home page
pub fn parse_homepage(html: &str, base: &Url) -> Result<Vec<ChannelLink>, String> {
    let doc = Html::parse_document(html);
    let item_sel = selector(".item")?;
    let sub_sel = selector(".menu a.item")?;

    let mut hierarchy = Vec::new();
    for menu in doc.select(&selector(".quick-search-buttons .ui.tiny.compact.menu")?) {
        let Some(item) = menu.select(&item_sel).next() else {
            continue;
        };
        let name = item
            .text()
            .map(str::trim)
            .find(|t| !t.is_empty())
            .unwrap_or_default()
            .to_string();
        let is_dropdown = item.value().classes().any(|c| c == "dropdown");

        if is_dropdown {
            let sub_links = item
                .select(&sub_sel)
                .map(|sub| {
                    let url = sub.value().attr("href").map(|h| absolute(base, h));
                    ChannelLink {
                        name: element_text(&sub),
                        category: url.as_deref().and_then(category_from_url),
                        url,
                        is_dropdown: false,
                        sub_links: Vec::new(),
                    }
                })
                .collect();
            hierarchy.push(ChannelLink {
                name,
                url: None,
                is_dropdown: true,
                category: None,
                sub_links,
            });
        } else {
            let url = (item.value().name() == "a")
                .then(|| item.value().attr("href"))
                .flatten()
                .map(|h| absolute(base, h));
            hierarchy.push(ChannelLink {
                name,
                category: url.as_deref().and_then(category_from_url),
                url,
                is_dropdown: false,
                sub_links: Vec::new(),
            });
        }
    }
    Ok(hierarchy)
}

/// Build rows of one listing page
pub fn parse_listing(html: &str, base: &Url) -> Result<Vec<CatalogEntry>, String> {
    let doc = Html::parse_document(html);
    let link_sel = selector(r#"a[href*="selectlang.php?id="]"#)?;
    let cell_sel = selector("td")?;

    let mut entries = Vec::new();
    for row in doc.select(&selector("table tbody tr")?) {
        let Some(link) = row.select(&link_sel).next() else {
            continue;
        };
        let Some(href) = link.value().attr("href").map(|h| absolute(base, h)) else {
            continue;
        };
        let cells: Vec<String> = row.select(&cell_sel).map(|c| element_text(&c)).collect();
        let cell = |i: usize| cells.get(i).filter(|c| !c.is_empty()).cloned();

        entries.push(CatalogEntry {
            title: element_text(&link),
            id: source_id_from_href(&href).unwrap_or_default(),
            href,
            arch: cell(1),
            added_at: cell(2),
        });
    }
    Ok(entries)
}

/// Highest page number in the pagination menu, 1 without one
pub fn parse_page_count(html: &str) -> Result<u32, String> {
    let doc = Html::parse_document(html);
    let pages = doc
        .select(&selector(".pagination a.item, .ui.pagination.menu a.item")?)
        .filter_map(|a| element_text(&a).parse::<u32>().ok())
        .max()
        .unwrap_or(1);
    Ok(pages.max(1))
}

/// URL of listing page `page` (1-based)
pub fn listing_page_url(url: &str, page: u32) -> String {
    if page <= 1 {
        return url.to_string();
    }
    let separator = if url.contains('?') { '&' } else { '?' };
    format!("{url}{separator}p={page}")
}

/// Fetches and parses catalog pages
#[derive(Debug, Clone)]
pub struct CatalogScraper {
    client: reqwest::Client,
    base_url: String,
    max_attempts: u32,
    base_delay: Duration,
    page_delay: Duration,
}

impl CatalogScraper {
    pub fn new(client: reqwest::Client, base_url: impl Into<String>) -> Self {
        Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            max_attempts: crate::config::defaults::MAX_SCRAPE_ATTEMPTS,
            base_delay: Duration::from_millis(crate::config::defaults::SCRAPE_BASE_DELAY_MS),
            page_delay: Duration::from_millis(crate::config::defaults::SCRAPE_PAGE_DELAY_MS),
        }
    }

    /// Retry and pacing settings
    #[must_use]
    pub fn with_retry(mut self, max_attempts: u32, base_delay: Duration, page_delay: Duration) -> Self {
        self.max_attempts = max_attempts.max(1);
        self.base_delay = base_delay;
        self.page_delay = page_delay;
        self
    }

    fn base(&self) -> Result<Url, ScrapeError> {
        Url::parse(&format!("{}/", self.base_url)).map_err(|e| ScrapeError::Structure {
            url: self.base_url.clone(),
            message: e.to_string(),
        })
    }

    /// Fetch a page, retrying with exponential backoff
    pub async fn fetch(&self, url: &str) -> Result<String, ScrapeError> {
        let mut attempts = 0;
        let mut delay = self.base_delay;
        let mut last_error = None;

        while attempts < self.max_attempts {
            attempts += 1;
            match fetch_text(&self.client, url).await {
                Ok(body) => return Ok(body),
                Err(error) => {
                    tracing::warn!("Fetching {url} failed (attempt {attempts}/{}): {error}", self.max_attempts);
                    last_error = Some(ScrapeError::Network {
                        url: url.to_string(),
                        error,
                    });
                    if attempts < self.max_attempts {
                        tokio::time::sleep(delay).await;
                        delay = (delay * 2).min(Duration::from_secs(30));
                    }
                }
            }
        }

        Err(last_error.unwrap_or_else(|| ScrapeError::MaxRetriesExceeded {
            url: url.to_string(),
            attempts: self.max_attempts,
        }))
    }

    /// Channel menu of the home page
    pub async fn hierarchy(&self) -> Result<Vec<ChannelLink>, ScrapeError> {
        let url = format!("{}/", self.base_url);
        let html = self.fetch(&url).await?;
        let hierarchy = parse_homepage(&html, &self.base()?).map_err(|message| ScrapeError::Structure {
            url: url.clone(),
            message,
        })?;
        if hierarchy.is_empty() {
            return Err(ScrapeError::Structure {
                url,
                message: "no channel menu found".to_string(),
            });
        }
        Ok(hierarchy)
    }

    /// Channel for a bare category key
    pub fn channel_for(&self, category: &str) -> Channel {
        Channel {
            category: category.to_string(),
            name: category.to_string(),
            url: format!("{}/{}?q=category:{category}", self.base_url, urls::KNOWN_PAGE),
            parent_name: None,
        }
    }

    /// Every listing page of a channel.
    ///
    /// The first page must load; a later page that keeps failing is logged
    /// and skipped. `pages` counts the pages actually read.
    pub async fn channel(&self, channel: &Channel) -> Result<CatalogPartition, ScrapeError> {
        let base = self.base()?;
        let structure = |url: &str, message: String| ScrapeError::Structure {
            url: url.to_string(),
            message,
        };

        let first = self.fetch(&channel.url).await?;
        let total = parse_page_count(&first).map_err(|m| structure(&channel.url, m))?;
        let mut versions = parse_listing(&first, &base).map_err(|m| structure(&channel.url, m))?;
        let mut pages = 1;
        tracing::info!("Channel {} ({}): {total} pages", channel.name, channel.category);

        for page in 2..=total {
            tokio::time::sleep(self.page_delay).await;
            let url = listing_page_url(&channel.url, page);
            let html = match self.fetch(&url).await {
                Ok(html) => html,
                Err(e) => {
                    tracing::warn!("Skipping page {page} of {}: {e}", channel.category);
                    continue;
                }
            };
            let rows = parse_listing(&html, &base).map_err(|m| structure(&url, m))?;
            if rows.is_empty() {
                tracing::warn!("Page {page} of {} has no builds", channel.category);
            }
            versions.extend(rows);
            pages += 1;
        }

        let mut partition = CatalogPartition::new(&channel.category, &channel.url, &channel.name);
        partition.parent_name = channel.parent_name.clone();
        partition.pages = pages;
        partition.versions = versions;
        let dropped = partition.normalize();
        if dropped > 0 {
            tracing::debug!("Dropped {dropped} rows without a usable id from {}", channel.category);
        }
        Ok(partition)
    }
}
