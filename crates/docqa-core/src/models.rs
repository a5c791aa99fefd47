//! Core data models shared by the builder, the persisted corpus and the
//! retrieval path.

use serde::{Deserialize, Serialize};

/// Category reported for a result that has neither a catalog category nor a
/// folder-derived one.
pub const FALLBACK_CATEGORY: &str = "Documentation";

/// A logical source unit, created from extracted text and discarded once
/// it has been chunked.
#[derive(Debug, Clone, PartialEq)]
pub struct Document {
    /// Unique within a build: `"{origin}_{key}"`, where the key is the
    /// relative path or blob key.
    pub doc_id: String,
    /// Human-facing title (the file stem).
    pub title: String,
    /// Full extracted text.
    pub content: String,
    /// Original file or blob name, including extension.
    pub source_name: String,
    /// Local path or blob URI.
    pub path: String,
    /// Folder or container-prefix derived category.
    pub category: String,
}

/// Metadata stored at the same position as its chunk text.
///
/// `chunks[i]` and `metadata[i]` always describe the same logical chunk.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChunkMetadata {
    pub title: String,
    pub source: String,
    pub path: String,
    pub category: String,
    /// Position of the chunk within its document, starting at 0.
    pub chunk_id: usize,
    pub doc_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub url_category: Option<String>,
}

impl ChunkMetadata {
    /// Metadata for chunk `chunk_id` of `doc`, not yet URL-enriched.
    pub fn for_chunk(doc: &Document, chunk_id: usize) -> Self {
        Self {
            title: doc.title.clone(),
            source: doc.source_name.clone(),
            path: doc.path.clone(),
            category: doc.category.clone(),
            chunk_id,
            doc_id: doc.doc_id.clone(),
            url: None,
            url_category: None,
        }
    }

    /// Category shown to callers: the catalog category when a URL was
    /// associated, otherwise the folder-derived one.
    pub fn display_category(&self) -> String {
        match (&self.url, &self.url_category) {
            (Some(_), Some(cat)) => cat.clone(),
            _ if !self.category.is_empty() => self.category.clone(),
            _ => FALLBACK_CATEGORY.to_string(),
        }
    }
}

/// A ranked retrieval hit, created per query and never persisted.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RetrievalResult {
    pub title: String,
    /// Text of the matching chunk.
    pub extract: String,
    /// Keyword score, `1 - distance`, or a fused score depending on origin.
    pub score: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub category: Option<String>,
}

impl RetrievalResult {
    /// Build a result for `chunk` described by `meta`.
    pub fn from_chunk(chunk: &str, meta: &ChunkMetadata, score: f64) -> Self {
        Self {
            title: meta.title.clone(),
            extract: chunk.to_string(),
            score,
            url: meta.url.clone(),
            category: Some(meta.display_category()),
        }
    }

    /// Deduplication key: the URL when present, otherwise the title.
    pub fn dedup_key(&self) -> &str {
        self.url.as_deref().unwrap_or(&self.title)
    }
}
