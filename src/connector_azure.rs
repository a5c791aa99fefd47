//! Azure Blob Storage container.
//!
//! Access uses a container-level SAS URL, so no account keys or signing are
//! involved: the SAS query string is appended to every request. Listing
//! follows `NextMarker` pagination of the `List Blobs` operation.
//!
//! # Configuration
//!
//! ```toml
//! [sources.azure]
//! # sas_url = "https://acct.blob.core.windows.net/docs?sv=...&sig=..."
//! sas_url_env = "AZURE_SAS_URL"
//! extensions = ["pdf", "pptx", "txt"]
//! ```

use anyhow::{bail, Context, Result};
use std::sync::Arc;

use crate::config::AzureSourceConfig;
use crate::connector_s3::uri_encode;
use crate::sources::{xml_blocks, xml_value, BlobStore, RemoteBlob, SourceDescriptor};

/// A container reachable through a SAS URL.
pub struct AzureContainer {
    /// `https://{account}.blob.core.windows.net/{container}`
    base_url: String,
    name: String,
    /// Query string without the leading `?`.
    sas: String,
    client: reqwest::Client,
}

impl std::fmt::Debug for AzureContainer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AzureContainer")
            .field("base_url", &self.base_url)
            .field("name", &self.name)
            .finish_non_exhaustive()
    }
}

impl AzureContainer {
    pub fn from_sas_url(sas_url: &str) -> Result<Self> {
        let (base, sas) = sas_url
            .split_once('?')
            .context("SAS URL has no query string")?;
        let base = base.trim_end_matches('/');
        if !base.starts_with("https://") && !base.starts_with("http://") {
            bail!("SAS URL must be http(s): {base}");
        }
        let name = base
            .rsplit('/')
            .next()
            .filter(|n| !n.is_empty() && !n.contains('.'))
            .context("SAS URL does not name a container")?
            .to_string();
        if sas.is_empty() {
            bail!("SAS URL has an empty token");
        }

        Ok(Self {
            base_url: base.to_string(),
            name,
            sas: sas.to_string(),
            client: reqwest::Client::new(),
        })
    }

    /// Container name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Names of every blob in the container.
    pub async fn list_blobs(&self) -> Result<Vec<String>> {
        let mut names = Vec::new();
        let mut marker: Option<String> = None;

        loop {
            let mut url = format!("{}?restype=container&comp=list&{}", self.base_url, self.sas);
            if let Some(m) = &marker {
                url.push_str(&format!("&marker={}", uri_encode(m)));
            }

            let resp = self
                .client
                .get(&url)
                .send()
                .await
                .with_context(|| format!("Failed to list blobs in container '{}'", self.name))?;
            if !resp.status().is_success() {
                let status = resp.status();
                let body = resp.text().await.unwrap_or_default();
                bail!(
                    "Azure List Blobs failed (HTTP {}): {}",
                    status,
                    body.chars().take(500).collect::<String>()
                );
            }

            let page = parse_list_blobs_response(&resp.text().await?);
            names.extend(page.names);
            match page.next_marker {
                Some(m) => marker = Some(m),
                None => break,
            }
        }

        Ok(names)
    }

    /// Download one blob's bytes.
    pub async fn download(&self, name: &str) -> Result<Vec<u8>> {
        let encoded = name.split('/').map(uri_encode).collect::<Vec<_>>().join("/");
        let url = format!("{}/{}?{}", self.base_url, encoded, self.sas);
        let resp = self
            .client
            .get(&url)
            .send()
            .await
            .with_context(|| format!("Failed to download blob '{name}'"))?;
        if !resp.status().is_success() {
            bail!("Azure Get Blob failed (HTTP {}) for '{}'", resp.status(), name);
        }
        Ok(resp.bytes().await?.to_vec())
    }
}

/// Remote descriptors for every blob with an accepted extension.
///
/// The category is the blob's virtual folder, or the configured default
/// for blobs at the container root.
pub async fn scan_azure(config: &AzureSourceConfig) -> Result<Vec<SourceDescriptor>> {
    let container = AzureContainer::from_sas_url(&config.resolve_sas_url()?)?;
    let names = container.list_blobs().await?;
    let store = Arc::new(BlobStore::Azure(container));

    let mut sources: Vec<SourceDescriptor> = names
        .into_iter()
        .filter(|name| has_extension(name, &config.extensions))
        .map(|key| SourceDescriptor::Remote(RemoteBlob {
            store: Arc::clone(&store),
            category: blob_category(&key, &config.default_category),
            key,
        }))
        .collect();

    sources.sort_by(|a, b| a.name().cmp(b.name()));
    Ok(sources)
}

fn has_extension(name: &str, extensions: &[String]) -> bool {
    let Some((_, ext)) = name.rsplit_once('.') else {
        return false;
    };
    extensions
        .iter()
        .any(|e| e.trim_start_matches('.').eq_ignore_ascii_case(ext))
}

fn blob_category(name: &str, default_category: &str) -> String {
    name.rsplit_once('/')
        .map(|(dir, _)| dir.to_string())
        .filter(|dir| !dir.is_empty())
        .unwrap_or_else(|| default_category.to_string())
}

struct BlobPage {
    names: Vec<String>,
    next_marker: Option<String>,
}

fn parse_list_blobs_response(xml: &str) -> BlobPage {
    let names = xml_blocks(xml, "Blob")
        .into_iter()
        .filter_map(|block| xml_value(block, "Name"))
        .filter(|name| !name.is_empty())
        .collect();
    BlobPage {
        names,
        next_marker: xml_value(xml, "NextMarker").filter(|m| !m.is_empty()),
    }
}
