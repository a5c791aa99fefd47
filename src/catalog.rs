//! URL catalog loading.
//!
//! Reads the `{name, url, category}` JSON list from a local file or from a
//! blob in the configured Azure container and logs the records that were
//! dropped while building the [`UrlCatalog`].

use anyhow::{bail, Context, Result};

use docqa_core::catalog::UrlCatalog;

use crate::config::{CatalogConfig, Config};
use crate::connector_azure::AzureContainer;

/// The configured catalog, or `None` when `[catalog]` is absent.
pub async fn load_catalog(config: &Config) -> Result<Option<UrlCatalog>> {
    let Some(catalog_config) = &config.catalog else {
        return Ok(None);
    };

    let json = match (&catalog_config.path, &catalog_config.blob) {
        (Some(path), _) => tokio::fs::read_to_string(path)
            .await
            .with_context(|| format!("Failed to read URL catalog: {}", path.display()))?,
        (None, Some(blob)) => {
            let azure = config
                .sources
                .azure
                .as_ref()
                .context("catalog.blob requires [sources.azure]")?;
            let container = AzureContainer::from_sas_url(&azure.resolve_sas_url()?)?;
            let bytes = container
                .download(blob)
                .await
                .with_context(|| format!("Failed to download URL catalog blob: {blob}"))?;
            String::from_utf8_lossy(&bytes).into_owned()
        }
        (None, None) => bail!("[catalog] needs either path or blob"),
    };

    parse_catalog(&json, catalog_config).map(Some)
}

/// Parse catalog JSON, logging incomplete and duplicate records.
pub fn parse_catalog(json: &str, config: &CatalogConfig) -> Result<UrlCatalog> {
    let (catalog, report) = UrlCatalog::from_json(json, &config.default_category)
        .context("URL catalog is not a JSON array of records")?;

    if report.incomplete > 0 {
        tracing::warn!(
            count = report.incomplete,
            "skipped catalog records without a name or url"
        );
    }
    for name in &report.duplicates {
        tracing::warn!(name = %name, "duplicate catalog name, keeping the first record");
    }
    tracing::info!(entries = catalog.len(), "loaded URL catalog");

    Ok(catalog)
}
