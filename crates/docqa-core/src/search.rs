//! Keyword and vector retrievers.
//!
//! Both operate on the parallel `chunks` / `metadata` arrays of a corpus
//! and produce [`RetrievalResult`]s whose scores have different meanings:
//!
//! - keyword: `1.0` when a query token occurs in the title, `0.8` when it
//!   only occurs in the chunk text;
//! - vector: `1 - d` where `d` is the index distance. Not clamped, so very
//!   distant chunks score below zero.
//!
//! [`crate::fusion::fuse`] combines the two lists.

use std::cmp::Ordering;

use crate::error::Result;
use crate::index::VectorIndex;
use crate::models::{ChunkMetadata, RetrievalResult};

/// Score of a chunk whose title contains a query token.
pub const TITLE_MATCH_SCORE: f64 = 1.0;
/// Score of a chunk whose text (but not title) contains a query token.
pub const CONTENT_MATCH_SCORE: f64 = 0.8;
/// Tokens must be strictly longer than this many characters.
pub const MIN_TOKEN_CHARS: usize = 3;

/// Lower-cased word tokens of `query` longer than [`MIN_TOKEN_CHARS`].
///
/// A word is a maximal run of alphanumeric characters or underscores.
pub fn query_tokens(query: &str) -> Vec<String> {
    query
        .split(|c: char| !(c.is_alphanumeric() || c == '_'))
        .filter(|w| w.chars().count() > MIN_TOKEN_CHARS)
        .map(str::to_lowercase)
        .collect()
}

/// Token-containment search over titles and chunk texts.
///
/// Returns an empty list when the query has no qualifying tokens. Results
/// are sorted by descending score; equal scores keep corpus order.
pub fn search_keywords(
    query: &str,
    chunks: &[String],
    metadata: &[ChunkMetadata],
    top_k: usize,
) -> Vec<RetrievalResult> {
    let tokens = query_tokens(query);
    if tokens.is_empty() || top_k == 0 {
        return Vec::new();
    }

    let mut results: Vec<RetrievalResult> = chunks
        .iter()
        .zip(metadata)
        .filter_map(|(chunk, meta)| {
            let title = meta.title.to_lowercase();
            let text = chunk.to_lowercase();
            let score = if tokens.iter().any(|t| title.contains(t.as_str())) {
                TITLE_MATCH_SCORE
            } else if tokens.iter().any(|t| text.contains(t.as_str())) {
                CONTENT_MATCH_SCORE
            } else {
                return None;
            };
            Some(RetrievalResult::from_chunk(chunk, meta, score))
        })
        .collect();

    sort_by_score_desc(&mut results);
    results.truncate(top_k);
    results
}

/// Nearest-neighbour search through `index`, scored as `1 - distance`.
///
/// Ids that are negative or out of range for `metadata` are dropped.
pub fn search_vector<I: VectorIndex + ?Sized>(
    query_embedding: &[f32],
    index: &I,
    chunks: &[String],
    metadata: &[ChunkMetadata],
    top_k: usize,
) -> Result<Vec<RetrievalResult>> {
    if top_k == 0 {
        return Ok(Vec::new());
    }
    let neighbors = index.search(query_embedding, top_k)?;

    Ok(neighbors
        .ids
        .iter()
        .zip(&neighbors.distances)
        .filter_map(|(&id, &distance)| {
            let i = usize::try_from(id).ok()?;
            let (chunk, meta) = (chunks.get(i)?, metadata.get(i)?);
            Some(RetrievalResult::from_chunk(
                chunk,
                meta,
                1.0 - f64::from(distance),
            ))
        })
        .collect())
}

/// Stable descending sort on `score`.
pub fn sort_by_score_desc(results: &mut [RetrievalResult]) {
    results.sort_by(|a, b| b.score.partial_cmp(&a.score).unwrap_or(Ordering::Equal));
}
