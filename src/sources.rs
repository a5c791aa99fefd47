//! Source descriptors and discovery.
//!
//! A [`SourceDescriptor`] names one file or blob without holding its bytes.
//! Discovery runs every configured connector and returns descriptors in a
//! deterministic order: local files first, then Azure blobs, then S3
//! objects, each sorted by name.

use anyhow::Result;
use std::path::PathBuf;
use std::sync::Arc;

use docqa_core::catalog::file_stem;
use docqa_core::models::Document;

use crate::config::Config;
use crate::connector_azure::{scan_azure, AzureContainer};
use crate::connector_fs::scan_local;
use crate::connector_s3::{scan_s3, S3Bucket};

/// A file on the local filesystem.
#[derive(Debug, Clone)]
pub struct LocalFile {
    /// File name including extension.
    pub name: String,
    /// Path relative to the source root, `/`-separated.
    pub relative: String,
    pub path: PathBuf,
    pub category: String,
}

/// A blob in a remote store, fetched lazily.
#[derive(Debug, Clone)]
pub struct RemoteBlob {
    pub store: Arc<BlobStore>,
    /// Full blob name or object key.
    pub key: String,
    pub category: String,
}

/// The remote stores blobs can come from.
#[derive(Debug)]
pub enum BlobStore {
    Azure(AzureContainer),
    S3(S3Bucket),
}

impl BlobStore {
    pub async fn get(&self, key: &str) -> Result<Vec<u8>> {
        match self {
            BlobStore::Azure(container) => container.download(key).await,
            BlobStore::S3(bucket) => bucket.get_object(key).await,
        }
    }

    /// Stable URI recorded as the chunk path.
    pub fn uri(&self, key: &str) -> String {
        match self {
            BlobStore::Azure(container) => format!("azure_blob://{}/{}", container.name(), key),
            BlobStore::S3(bucket) => format!("s3://{}/{}", bucket.bucket(), key),
        }
    }

    pub fn origin(&self) -> &'static str {
        match self {
            BlobStore::Azure(_) => "azure",
            BlobStore::S3(_) => "s3",
        }
    }
}

/// One unit of input to a corpus build.
#[derive(Debug, Clone)]
pub enum SourceDescriptor {
    Local(LocalFile),
    Remote(RemoteBlob),
}

impl SourceDescriptor {
    /// File name for local sources, full blob key for remote ones.
    pub fn name(&self) -> &str {
        match self {
            SourceDescriptor::Local(f) => &f.name,
            SourceDescriptor::Remote(b) => &b.key,
        }
    }

    /// Identity within its origin: the relative path for local files, the
    /// full key for blobs.
    pub fn key(&self) -> &str {
        match self {
            SourceDescriptor::Local(f) => &f.relative,
            SourceDescriptor::Remote(b) => &b.key,
        }
    }

    pub fn category(&self) -> &str {
        match self {
            SourceDescriptor::Local(f) => &f.category,
            SourceDescriptor::Remote(b) => &b.category,
        }
    }

    pub fn path(&self) -> String {
        match self {
            SourceDescriptor::Local(f) => f.path.to_string_lossy().into_owned(),
            SourceDescriptor::Remote(b) => b.store.uri(&b.key),
        }
    }

    pub fn origin(&self) -> &'static str {
        match self {
            SourceDescriptor::Local(_) => "local",
            SourceDescriptor::Remote(b) => b.store.origin(),
        }
    }

    /// Read the raw bytes.
    pub async fn fetch(&self) -> Result<Vec<u8>> {
        match self {
            SourceDescriptor::Local(f) => Ok(tokio::fs::read(&f.path).await?),
            SourceDescriptor::Remote(b) => b.store.get(&b.key).await,
        }
    }

    /// Wrap extracted text as a [`Document`].
    ///
    /// Files sharing a stem in different folders share a title but never a
    /// `doc_id`.
    pub fn document(&self, content: String) -> Document {
        let title = file_stem(self.name()).to_string();
        Document {
            doc_id: format!("{}_{}", self.origin(), self.key()),
            title,
            content,
            source_name: self.name().to_string(),
            path: self.path(),
            category: self.category().to_string(),
        }
    }
}

/// Descriptors from every configured source.
///
/// A missing local root is an error. A remote store that cannot be listed
/// is logged and skipped so the rest of the build can proceed.
pub async fn discover_sources(config: &Config) -> Result<Vec<SourceDescriptor>> {
    let mut sources = Vec::new();

    if let Some(local) = &config.sources.local {
        let found = scan_local(local)?;
        tracing::info!(root = %local.root.display(), count = found.len(), "discovered local sources");
        sources.extend(found);
    }

    if let Some(azure) = &config.sources.azure {
        match scan_azure(azure).await {
            Ok(found) => {
                tracing::info!(count = found.len(), "discovered azure blobs");
                sources.extend(found);
            }
            Err(e) => tracing::error!(error = %e, "failed to list azure container"),
        }
    }

    if let Some(s3) = &config.sources.s3 {
        match scan_s3(s3).await {
            Ok(found) => {
                tracing::info!(bucket = %s3.bucket, count = found.len(), "discovered s3 objects");
                sources.extend(found);
            }
            Err(e) => tracing::error!(bucket = %s3.bucket, error = %e, "failed to list s3 bucket"),
        }
    }

    Ok(sources)
}

/// Print the configured sources, whether each looks usable, and the
/// files they currently yield. Nothing is downloaded.
pub async fn list_sources(config: &Config) -> Result<()> {
    println!("{:<10} {:<40} STATUS", "SOURCE", "LOCATION");

    match &config.sources.local {
        Some(local) => {
            let status = if local.root.exists() {
                "OK"
            } else {
                "MISSING (root does not exist)"
            };
            println!("{:<10} {:<40} {}", "local", local.root.display(), status);
        }
        None => println!("{:<10} {:<40} NOT CONFIGURED", "local", "-"),
    }

    match &config.sources.azure {
        Some(azure) => {
            let (location, status) = match azure.resolve_sas_url() {
                Ok(url) => match AzureContainer::from_sas_url(&url) {
                    Ok(c) => (c.name().to_string(), "OK"),
                    Err(_) => ("-".to_string(), "INVALID SAS URL"),
                },
                Err(_) => ("-".to_string(), "MISSING SAS URL"),
            };
            println!("{:<10} {:<40} {}", "azure", location, status);
        }
        None => println!("{:<10} {:<40} NOT CONFIGURED", "azure", "-"),
    }

    match &config.sources.s3 {
        Some(s3) => {
            let location = format!("s3://{}/{}", s3.bucket, s3.prefix);
            let status = if std::env::var("AWS_ACCESS_KEY_ID").is_ok() {
                "OK"
            } else {
                "MISSING CREDENTIALS"
            };
            println!("{:<10} {:<40} {}", "s3", location, status);
        }
        None => println!("{:<10} {:<40} NOT CONFIGURED", "s3", "-"),
    }

    if config.sources.is_empty() {
        return Ok(());
    }

    let sources = match discover_sources(config).await {
        Ok(sources) => sources,
        Err(e) => {
            println!();
            println!("discovery failed: {e:#}");
            return Ok(());
        }
    };
    println!();
    println!("{:<8} {:<28} NAME", "ORIGIN", "CATEGORY");
    for source in &sources {
        println!("{:<8} {:<28} {}", source.origin(), source.category(), source.name());
    }
    println!();
    println!("{} sources", sources.len());

    Ok(())
}

// ============ XML helpers shared by the blob connectors ============

/// Inner text of each `<tag>...</tag>` element, in document order.
pub(crate) fn xml_blocks<'a>(xml: &'a str, tag: &str) -> Vec<&'a str> {
    let open = format!("<{tag}>");
    let close = format!("</{tag}>");
    let mut blocks = Vec::new();
    let mut rest = xml;
    while let Some(start) = rest.find(&open) {
        let after = &rest[start + open.len()..];
        let Some(end) = after.find(&close) else {
            break;
        };
        blocks.push(&after[..end]);
        rest = &after[end + close.len()..];
    }
    blocks
}

/// Unescaped inner text of the first `<tag>` element.
pub(crate) fn xml_value(xml: &str, tag: &str) -> Option<String> {
    let raw = xml_blocks(xml, tag).into_iter().next()?;
    Some(
        quick_xml::escape::unescape(raw)
            .map(|s| s.into_owned())
            .unwrap_or_else(|_| raw.to_string()),
    )
}
