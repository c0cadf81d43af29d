//! Scrape command implementation
//!
//! Implements `uupforge scrape` to refresh the local catalog.

use anyhow::{bail, Context as _, Result};
use chrono::Utc;
use serde::Serialize;

use super::Workspace;
use crate::cli::output::status;
use crate::cli::Context;
use crate::infra::catalog_store::FileCatalogStore;
use crate::infra::scrape::{flatten_channels, CatalogIndex, CatalogScraper, Channel};

#[derive(Debug, Serialize)]
struct ChannelResult {
    category: String,
    builds: usize,
    added: Option<usize>,
    pages: u32,
    error: Option<String>,
}

/// Execute the scrape command
pub async fn execute(ctx: &Context, categories: &[String], incremental: bool) -> Result<()> {
    let ws = Workspace::load(ctx)?;
    let scraper = CatalogScraper::new(ws.client(), ws.config.base_url()).with_retry(
        ws.config.scrape_attempts(),
        ws.config.scrape_base_delay(),
        ws.config.scrape_page_delay(),
    );
    let store = FileCatalogStore::new(ws.config.catalog_dir(&ws.dirs));

    let channels: Vec<Channel> = if categories.is_empty() {
        let spinner = ctx.output.spinner("Reading channel list...");
        let hierarchy = scraper.hierarchy().await;
        spinner.finish_and_clear();
        let hierarchy = hierarchy.context("Failed to read the channel list")?;

        let index = CatalogIndex {
            scraped_at: Utc::now(),
            hierarchy,
        };
        store.save_index(&index).context("Failed to save catalog index")?;
        flatten_channels(&index.hierarchy)
    } else {
        categories.iter().map(|c| scraper.channel_for(c)).collect()
    };
    tracing::info!("Scraping {} channels into {}", channels.len(), store.dir().display());

    let bar = ctx.output.channel_bar(channels.len() as u64);
    let mut results = Vec::with_capacity(channels.len());
    for channel in &channels {
        bar.set_message(channel.category.clone());
        let result = match scraper.channel(channel).await {
            Ok(partition) => {
                let builds = partition.versions.len();
                let pages = partition.pages;
                let added = if incremental {
                    store.merge(partition).map(Some)
                } else {
                    store.save(&partition).map(|_| None)
                };
                match added {
                    Ok(added) => ChannelResult {
                        category: channel.category.clone(),
                        builds,
                        added,
                        pages,
                        error: None,
                    },
                    Err(e) => failed(channel, e.to_string()),
                }
            }
            Err(e) => failed(channel, e.to_string()),
        };
        if let Some(error) = &result.error {
            tracing::warn!("Channel {}: {error}", channel.category);
        }
        results.push(result);
        bar.inc(1);
    }
    bar.finish_and_clear();

    let failures = results.iter().filter(|r| r.error.is_some()).count();
    if ctx.output.json {
        ctx.output.print_json(&results)?;
    } else {
        for r in &results {
            match (&r.error, r.added) {
                (Some(error), _) => ctx.output.line(format!("{} {}: {error}", status::ERROR, r.category)),
                (None, Some(added)) => ctx.output.line(format!(
                    "{} {}: {} builds, {added} new ({} pages)",
                    status::SUCCESS,
                    r.category,
                    r.builds,
                    r.pages
                )),
                (None, None) => ctx.output.line(format!(
                    "{} {}: {} builds ({} pages)",
                    status::SUCCESS,
                    r.category,
                    r.builds,
                    r.pages
                )),
            }
        }
    }

    if !results.is_empty() && failures == results.len() {
        bail!("Every channel failed to scrape");
    }
    Ok(())
}

fn failed(channel: &Channel, error: String) -> ChannelResult {
    ChannelResult {
        category: channel.category.clone(),
        builds: 0,
        added: None,
        pages: 0,
        error: Some(error),
    }
}
