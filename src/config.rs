//! Configuration loading.
//!
//! `docqa` reads one TOML file (default `./config/docqa.toml`, overridden
//! with `--config`). Every section is optional and falls back to the
//! defaults below; [`load_config`] rejects values the pipeline cannot run
//! with, such as a chunk overlap larger than the chunk size or an unknown
//! embedding provider. Secrets stay out of the file: the Azure SAS URL,
//! AWS credentials and the OpenAI key come from environment variables.
//!
//! ```toml
//! [corpus]
//! dir = "./models"
//!
//! [chunking]
//! chunk_size = 1000
//! chunk_overlap = 200
//!
//! [embedding]
//! provider = "ollama"
//! model = "nomic-embed-text"
//!
//! [sources.local]
//! root = "./data/processed"
//! ```

use anyhow::{Context, Result};
use serde::Deserialize;
use std::collections::HashMap;
use std::path::{Path, PathBuf};

#[derive(Debug, Deserialize, Clone, Default)]
pub struct Config {
    #[serde(default)]
    pub corpus: CorpusConfig,
    #[serde(default)]
    pub chunking: ChunkingConfig,
    #[serde(default)]
    pub retrieval: RetrievalConfig,
    #[serde(default)]
    pub embedding: EmbeddingConfig,
    #[serde(default)]
    pub sources: SourcesConfig,
    #[serde(default)]
    pub catalog: Option<CatalogConfig>,
    #[serde(default)]
    pub extraction: ExtractionConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Where the built corpus artifacts live.
#[derive(Debug, Deserialize, Clone)]
pub struct CorpusConfig {
    #[serde(default = "default_corpus_dir")]
    pub dir: PathBuf,
}

impl Default for CorpusConfig {
    fn default() -> Self {
        Self {
            dir: default_corpus_dir(),
        }
    }
}

fn default_corpus_dir() -> PathBuf {
    PathBuf::from("./models")
}

#[derive(Debug, Deserialize, Clone)]
pub struct ChunkingConfig {
    #[serde(default = "default_chunk_size")]
    pub chunk_size: usize,
    #[serde(default = "default_chunk_overlap")]
    pub chunk_overlap: usize,
}

impl Default for ChunkingConfig {
    fn default() -> Self {
        Self {
            chunk_size: default_chunk_size(),
            chunk_overlap: default_chunk_overlap(),
        }
    }
}

fn default_chunk_size() -> usize {
    docqa_core::chunk::DEFAULT_CHUNK_SIZE
}
fn default_chunk_overlap() -> usize {
    docqa_core::chunk::DEFAULT_CHUNK_OVERLAP
}

#[derive(Debug, Deserialize, Clone)]
pub struct RetrievalConfig {
    #[serde(default = "default_top_k")]
    pub top_k: usize,
    #[serde(default = "default_keyword_candidates")]
    pub keyword_candidates: usize,
}

impl Default for RetrievalConfig {
    fn default() -> Self {
        Self {
            top_k: default_top_k(),
            keyword_candidates: default_keyword_candidates(),
        }
    }
}

fn default_top_k() -> usize {
    docqa_core::query::DEFAULT_TOP_K
}
fn default_keyword_candidates() -> usize {
    docqa_core::query::DEFAULT_KEYWORD_CANDIDATES
}

#[derive(Debug, Deserialize, Clone)]
pub struct EmbeddingConfig {
    #[serde(default = "default_provider")]
    pub provider: String,
    #[serde(default)]
    pub model: Option<String>,
    #[serde(default)]
    pub dims: Option<usize>,
    /// Base URL for the `ollama` provider.
    #[serde(default)]
    pub url: Option<String>,
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

impl Default for EmbeddingConfig {
    fn default() -> Self {
        Self {
            provider: default_provider(),
            model: None,
            dims: None,
            url: None,
            batch_size: default_batch_size(),
            max_retries: default_max_retries(),
            timeout_secs: default_timeout_secs(),
        }
    }
}

fn default_provider() -> String {
    "disabled".to_string()
}
fn default_batch_size() -> usize {
    32
}
fn default_max_retries() -> u32 {
    5
}
fn default_timeout_secs() -> u64 {
    30
}

impl EmbeddingConfig {
    pub fn is_enabled(&self) -> bool {
        self.provider != "disabled"
    }
}

#[derive(Debug, Deserialize, Clone, Default)]
pub struct SourcesConfig {
    pub local: Option<LocalSourceConfig>,
    pub azure: Option<AzureSourceConfig>,
    pub s3: Option<S3SourceConfig>,
}

impl SourcesConfig {
    pub fn is_empty(&self) -> bool {
        self.local.is_none() && self.azure.is_none() && self.s3.is_none()
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct LocalSourceConfig {
    pub root: PathBuf,
    #[serde(default = "default_local_include_globs")]
    pub include_globs: Vec<String>,
    #[serde(default)]
    pub exclude_globs: Vec<String>,
    #[serde(default)]
    pub follow_symlinks: bool,
    #[serde(default = "default_local_category")]
    pub default_category: String,
}

fn default_local_include_globs() -> Vec<String> {
    vec!["**/*.txt".to_string()]
}
fn default_local_category() -> String {
    "general_local".to_string()
}

/// Azure Blob Storage container, addressed by a container SAS URL.
#[derive(Debug, Deserialize, Clone)]
pub struct AzureSourceConfig {
    /// Container SAS URL. Falls back to `sas_url_env` when absent.
    #[serde(default)]
    pub sas_url: Option<String>,
    #[serde(default = "default_sas_url_env")]
    pub sas_url_env: String,
    #[serde(default = "default_azure_extensions")]
    pub extensions: Vec<String>,
    #[serde(default = "default_azure_category")]
    pub default_category: String,
}

fn default_sas_url_env() -> String {
    "AZURE_SAS_URL".to_string()
}
fn default_azure_extensions() -> Vec<String> {
    vec!["pdf".to_string(), "pptx".to_string(), "txt".to_string()]
}
fn default_azure_category() -> String {
    "general_azure".to_string()
}

impl AzureSourceConfig {
    /// The configured SAS URL, or the one from the environment.
    pub fn resolve_sas_url(&self) -> Result<String> {
        if let Some(url) = self.sas_url.as_ref().filter(|u| !u.trim().is_empty()) {
            return Ok(url.clone());
        }
        std::env::var(&self.sas_url_env).with_context(|| {
            format!(
                "sources.azure.sas_url is not set and {} is not in the environment",
                self.sas_url_env
            )
        })
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct S3SourceConfig {
    pub bucket: String,
    #[serde(default)]
    pub prefix: String,
    #[serde(default = "default_region")]
    pub region: String,
    #[serde(default = "default_s3_include_globs")]
    pub include_globs: Vec<String>,
    #[serde(default)]
    pub exclude_globs: Vec<String>,
    /// Custom endpoint for S3-compatible stores (MinIO, LocalStack).
    #[serde(default)]
    pub endpoint_url: Option<String>,
    #[serde(default = "default_s3_category")]
    pub default_category: String,
}

fn default_region() -> String {
    "us-east-1".to_string()
}
fn default_s3_include_globs() -> Vec<String> {
    vec![
        "**/*.pdf".to_string(),
        "**/*.pptx".to_string(),
        "**/*.txt".to_string(),
    ]
}
fn default_s3_category() -> String {
    "general_s3".to_string()
}

/// External `{name, url, category}` catalog used for URL association.
#[derive(Debug, Deserialize, Clone)]
pub struct CatalogConfig {
    /// Local JSON file.
    #[serde(default)]
    pub path: Option<PathBuf>,
    /// Blob name inside the configured Azure container.
    #[serde(default)]
    pub blob: Option<String>,
    #[serde(default = "default_catalog_category")]
    pub default_category: String,
}

fn default_catalog_category() -> String {
    "catalog".to_string()
}

#[derive(Debug, Deserialize, Clone)]
pub struct ExtractionConfig {
    #[serde(default = "default_documents_dir")]
    pub documents_dir: PathBuf,
    #[serde(default = "default_processed_dir")]
    pub processed_dir: PathBuf,
    #[serde(default = "default_ocr_command")]
    pub ocr_command: String,
    #[serde(default = "default_ocr_language")]
    pub ocr_language: String,
}

impl Default for ExtractionConfig {
    fn default() -> Self {
        Self {
            documents_dir: default_documents_dir(),
            processed_dir: default_processed_dir(),
            ocr_command: default_ocr_command(),
            ocr_language: default_ocr_language(),
        }
    }
}

fn default_documents_dir() -> PathBuf {
    PathBuf::from("./data/documents")
}
fn default_processed_dir() -> PathBuf {
    PathBuf::from("./data/processed")
}
fn default_ocr_command() -> String {
    "tesseract".to_string()
}
fn default_ocr_language() -> String {
    "fra".to_string()
}

#[derive(Debug, Deserialize, Clone)]
pub struct LoggingConfig {
    #[serde(default = "default_log_level")]
    pub default: String,
    #[serde(default)]
    pub modules: HashMap<String, String>,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            default: default_log_level(),
            modules: HashMap::new(),
        }
    }
}

fn default_log_level() -> String {
    "info".to_string()
}

pub fn load_config(path: &Path) -> Result<Config> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file: {}", path.display()))?;

    let config: Config = toml::from_str(&content).with_context(|| "Failed to parse config file")?;
    validate(&config)?;
    Ok(config)
}

fn validate(config: &Config) -> Result<()> {
    if config.chunking.chunk_size == 0 {
        anyhow::bail!("chunking.chunk_size must be > 0");
    }
    if config.chunking.chunk_overlap > config.chunking.chunk_size {
        anyhow::bail!("chunking.chunk_overlap must be <= chunking.chunk_size");
    }

    if config.retrieval.top_k < 1 {
        anyhow::bail!("retrieval.top_k must be >= 1");
    }

    if config.embedding.batch_size == 0 {
        anyhow::bail!("embedding.batch_size must be > 0");
    }

    match config.embedding.provider.as_str() {
        "disabled" | "local" => {}
        "openai" | "ollama" => {
            if config.embedding.model.is_none() {
                anyhow::bail!(
                    "embedding.model must be specified when provider is '{}'",
                    config.embedding.provider
                );
            }
        }
        other => anyhow::bail!(
            "Unknown embedding provider: '{}'. Must be disabled, local, openai, or ollama.",
            other
        ),
    }

    if let Some(catalog) = &config.catalog {
        if catalog.path.is_some() == catalog.blob.is_some() {
            anyhow::bail!("catalog needs exactly one of `path` or `blob`");
        }
        if catalog.blob.is_some() && config.sources.azure.is_none() {
            anyhow::bail!("catalog.blob requires a [sources.azure] container");
        }
    }

    if let Some(s3) = &config.sources.s3 {
        if s3.bucket.trim().is_empty() {
            anyhow::bail!("sources.s3.bucket must not be empty");
        }
    }

    Ok(())
}
