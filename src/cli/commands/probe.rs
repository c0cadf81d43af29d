//! Probe command implementation
//!
//! Implements `uupforge probe <RULE>`: resolve the download parameters for
//! the build a rule currently selects, without packaging anything.

use anyhow::{anyhow, bail, Context as _, Result};
use serde::Serialize;

use super::Workspace;
use crate::cli::Context;
use crate::config::urls;
use crate::core::catalog::{CatalogEntry, CatalogSource};
use crate::core::matcher::select_build;
use crate::core::prober::{ParameterProber, ResolvedParameters};
use crate::core::rule::{validate_rules, ConfiguredRule};
use crate::infra::catalog_store::FileCatalogStore;
use crate::infra::transport::HttpProbeTransport;

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct ProbeReport<'a> {
    rule: &'a str,
    build: &'a CatalogEntry,
    parameters: &'a ResolvedParameters,
    download_url: String,
}

/// Execute the probe command
pub async fn execute(ctx: &Context, name: &str) -> Result<()> {
    let ws = Workspace::load(ctx)?;

    let rule = validate_rules(&ws.config.rules)
        .into_iter()
        .find(|r| r.name() == name)
        .ok_or_else(|| anyhow!("No rule named '{name}' in the configuration"))?;
    let rule = match rule {
        ConfiguredRule::Valid(rule) => rule,
        ConfiguredRule::Invalid { error, .. } => bail!("Rule '{name}' is invalid: {error}"),
    };

    let store = FileCatalogStore::new(ws.config.catalog_dir(&ws.dirs));
    let partition = store
        .load(&rule.category)
        .with_context(|| format!("Cannot load catalog for rule '{name}'"))?;
    let Some(build) = select_build(&rule, &partition) else {
        bail!("No build in '{}' matches rule '{name}'", rule.category);
    };

    let transport = HttpProbeTransport::new(ws.client(), ws.config.base_url());
    let spinner = ctx.output.spinner(&format!("Probing {} ({})...", build.title, build.id));
    let params = ParameterProber::new(&transport).probe(&rule, &build.id).await;
    spinner.finish_and_clear();
    let params = params.with_context(|| format!("Probing failed for rule '{name}'"))?;

    let download_url = url::Url::parse_with_params(
        &format!("{}/{}", ws.config.base_url(), urls::GET_PAGE),
        params.query_pairs(),
    )
    .map(String::from)
    .context("Invalid service URL")?;

    if ctx.output.json {
        return ctx.output.print_json(&ProbeReport {
            rule: name,
            build,
            parameters: &params,
            download_url,
        });
    }

    println!("Rule:       {name}");
    println!("Build:      {} ({})", build.title, build.id);
    println!("Language:   {}", params.language);
    println!("Editions:   {}", params.compound_edition);
    if !params.virtual_editions.is_empty() {
        println!("Virtual:    {}", params.virtual_editions.join(", "));
    }
    println!("Method:     {}", params.download_method.value());
    let options: Vec<&str> = params.options.iter().map(|o| o.field()).collect();
    if !options.is_empty() {
        println!("Options:    {}", options.join(", "));
    }
    println!("Bundle URL: {download_url}");
    Ok(())
}
