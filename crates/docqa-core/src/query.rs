//! Query service: the single entry point for answering a query against a
//! loaded corpus.
//!
//! ```text
//! query ─► embed ─► vector search (top_k) ─┐
//!      └──────────► keyword search (max(top_k, keyword_candidates)) ─► fuse ─► top_k
//! ```

use std::sync::Arc;

use crate::corpus::Corpus;
use crate::embedding::Embedder;
use crate::error::{Error, Result};
use crate::fusion::fuse;
use crate::index::{FlatL2Index, VectorIndex};
use crate::models::RetrievalResult;
use crate::search::{search_keywords, search_vector};

/// Default number of results returned per query.
pub const DEFAULT_TOP_K: usize = 5;
/// Default floor for the number of keyword candidates.
pub const DEFAULT_KEYWORD_CANDIDATES: usize = 10;

/// Retrieval tuning parameters, decoupled from application config.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct QueryParams {
    /// Results returned when the caller does not ask for a specific count.
    pub top_k: usize,
    /// The keyword path fetches `max(top_k, keyword_candidates)` hits.
    pub keyword_candidates: usize,
}

impl Default for QueryParams {
    fn default() -> Self {
        Self {
            top_k: DEFAULT_TOP_K,
            keyword_candidates: DEFAULT_KEYWORD_CANDIDATES,
        }
    }
}

/// Answers queries against a shared, read-only corpus.
///
/// Cheap to clone; clones share the corpus and the embedder.
pub struct QueryService<I: VectorIndex = FlatL2Index> {
    corpus: Arc<Corpus<I>>,
    embedder: Arc<dyn Embedder>,
    params: QueryParams,
}

impl<I: VectorIndex> Clone for QueryService<I> {
    fn clone(&self) -> Self {
        Self {
            corpus: Arc::clone(&self.corpus),
            embedder: Arc::clone(&self.embedder),
            params: self.params,
        }
    }
}

impl<I: VectorIndex> QueryService<I> {
    pub fn new(corpus: Arc<Corpus<I>>, embedder: Arc<dyn Embedder>) -> Self {
        Self {
            corpus,
            embedder,
            params: QueryParams::default(),
        }
    }

    pub fn with_params(mut self, params: QueryParams) -> Self {
        self.params = params;
        self
    }

    pub fn corpus(&self) -> &Corpus<I> {
        &self.corpus
    }

    pub fn params(&self) -> QueryParams {
        self.params
    }

    /// Query with the configured default `top_k`.
    pub async fn query(&self, text: &str) -> Result<Vec<RetrievalResult>> {
        self.query_top_k(text, self.params.top_k).await
    }

    /// Embed `text`, run both retrievers, fuse and keep the best `top_k`.
    ///
    /// A blank query returns no results without calling the embedder.
    /// Embedding or index failures are returned as-is; there is no
    /// keyword-only fallback.
    pub async fn query_top_k(&self, text: &str, top_k: usize) -> Result<Vec<RetrievalResult>> {
        if text.trim().is_empty() || top_k == 0 {
            return Ok(Vec::new());
        }

        let query_vec = self
            .embedder
            .embed_query(text)
            .await
            .map_err(|e| Error::EmbeddingFailure(format!("{e:#}")))?;

        let corpus = &self.corpus;
        let vector_results = search_vector(
            &query_vec,
            corpus.index(),
            corpus.chunks(),
            corpus.metadata(),
            top_k,
        )?;
        let keyword_results = search_keywords(
            text,
            corpus.chunks(),
            corpus.metadata(),
            top_k.max(self.params.keyword_candidates),
        );

        let mut fused = fuse(vector_results, keyword_results);
        fused.truncate(top_k);
        Ok(fused)
    }
}
