//! Corpus construction.
//!
//! The builder walks the discovered sources one at a time:
//!
//! ```text
//! fetch → extract → chunk → metadata → embed (sub-batched) → append
//! ```
//!
//! Chunk texts, metadata and index vectors grow in lockstep. A source's
//! vectors are appended only once every sub-batch of that source embedded
//! successfully, so a failed source leaves nothing behind. Per-source
//! failures are logged and counted; they never abort the build. After the
//! last source the exact URL association runs once over all metadata.

use anyhow::Result;
use serde::Serialize;
use std::collections::BTreeMap;
use std::sync::Arc;

use docqa_core::catalog::UrlCatalog;
use docqa_core::chunk::TextSplitter;
use docqa_core::corpus::Corpus;
use docqa_core::embedding::Embedder;
use docqa_core::index::{FlatL2Index, VectorIndex};
use docqa_core::models::ChunkMetadata;
use docqa_core::Error;

use crate::extract::TextExtractor;
use crate::progress::{BuildEvent, NoProgress, ProgressReporter};
use crate::sources::SourceDescriptor;

/// Why a source contributed no chunks.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SkipReason {
    FetchFailed,
    ExtractionFailed,
    EmptyContent,
    NoChunks,
    EmbeddingFailed,
    DimensionMismatch,
}

impl SkipReason {
    /// Whether the skip counts as an error (as opposed to empty input).
    pub fn is_error(&self) -> bool {
        !matches!(self, SkipReason::EmptyContent | SkipReason::NoChunks)
    }

    fn of(err: &Error) -> Self {
        match err {
            Error::EmptyContent { .. } => SkipReason::EmptyContent,
            Error::NoChunks { .. } => SkipReason::NoChunks,
            Error::DimensionMismatch { .. } | Error::InvalidDimension(_) => {
                SkipReason::DimensionMismatch
            }
            Error::EmbeddingFailure(_) => SkipReason::EmbeddingFailed,
            _ => SkipReason::ExtractionFailed,
        }
    }
}

/// Summary of a finished build.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct BuildReport {
    /// Sources handed to the builder.
    pub total: usize,
    /// Sources that contributed at least one chunk.
    pub processed: usize,
    pub skipped: BTreeMap<SkipReason, usize>,
    /// Skips caused by failures rather than empty input.
    pub errors: usize,
    pub chunks: usize,
    /// Chunks that received a catalog URL.
    pub associated: usize,
    pub dims: Option<usize>,
}

impl BuildReport {
    fn skip(&mut self, reason: SkipReason) {
        *self.skipped.entry(reason).or_insert(0) += 1;
        if reason.is_error() {
            self.errors += 1;
        }
    }
}

/// Chunks and vectors of one source, ready to append.
struct SourceBatch {
    chunks: Vec<String>,
    metadata: Vec<ChunkMetadata>,
    vectors: Vec<Vec<f32>>,
}

/// Builds a [`Corpus`] from source descriptors.
pub struct CorpusBuilder<I: VectorIndex = FlatL2Index> {
    splitter: TextSplitter,
    embedder: Arc<dyn Embedder>,
    extractor: Arc<dyn TextExtractor>,
    index: I,
    catalog: Option<UrlCatalog>,
    batch_size: usize,
    progress: Box<dyn ProgressReporter>,
}

impl CorpusBuilder<FlatL2Index> {
    pub fn new(
        splitter: TextSplitter,
        embedder: Arc<dyn Embedder>,
        extractor: Arc<dyn TextExtractor>,
    ) -> Self {
        Self::with_index(splitter, embedder, extractor, FlatL2Index::new())
    }
}

impl<I: VectorIndex> CorpusBuilder<I> {
    /// Build into a caller-supplied, empty index.
    pub fn with_index(
        splitter: TextSplitter,
        embedder: Arc<dyn Embedder>,
        extractor: Arc<dyn TextExtractor>,
        index: I,
    ) -> Self {
        Self {
            splitter,
            embedder,
            extractor,
            index,
            catalog: None,
            batch_size: 32,
            progress: Box::new(NoProgress),
        }
    }

    pub fn catalog(mut self, catalog: Option<UrlCatalog>) -> Self {
        self.catalog = catalog;
        self
    }

    /// Maximum texts per embedding call. Zero is treated as one.
    pub fn batch_size(mut self, batch_size: usize) -> Self {
        self.batch_size = batch_size.max(1);
        self
    }

    pub fn progress(mut self, progress: Box<dyn ProgressReporter>) -> Self {
        self.progress = progress;
        self
    }

    /// Process every source and assemble the corpus.
    ///
    /// Fails with [`Error::NoContent`] when no source produced a chunk and
    /// with [`Error::IndexNotInitialized`] when no vectors were ever added.
    pub async fn build(mut self, sources: &[SourceDescriptor]) -> Result<(Corpus<I>, BuildReport)> {
        let mut report = BuildReport {
            total: sources.len(),
            ..Default::default()
        };
        let mut chunks: Vec<String> = Vec::new();
        let mut metadata: Vec<ChunkMetadata> = Vec::new();

        for (i, source) in sources.iter().enumerate() {
            self.progress.report(BuildEvent::Processing {
                n: i as u64 + 1,
                total: sources.len() as u64,
                source: source.name().to_string(),
            });

            let batch = match self.prepare_source(source).await {
                Ok(batch) => batch,
                Err(reason) => {
                    report.skip(reason);
                    continue;
                }
            };

            if let Err(err) = self.append(&batch.vectors) {
                tracing::error!(source = source.name(), error = %err, "index rejected vectors");
                report.skip(SkipReason::of(&err));
                continue;
            }
            tracing::debug!(source = source.name(), chunks = batch.chunks.len(), "source added");
            chunks.extend(batch.chunks);
            metadata.extend(batch.metadata);
            report.processed += 1;
        }

        if chunks.is_empty() {
            return Err(Error::NoContent.into());
        }
        if self.index.dims().is_none() {
            return Err(Error::IndexNotInitialized.into());
        }

        if let Some(catalog) = &self.catalog {
            report.associated = catalog.associate(&mut metadata);
        }

        report.chunks = chunks.len();
        report.dims = self.index.dims();
        let corpus = Corpus::new(chunks, metadata, self.index)?;

        tracing::info!(
            processed = report.processed,
            errors = report.errors,
            chunks = report.chunks,
            dims = report.dims.unwrap_or(0),
            index_size = corpus.index().len(),
            associated = report.associated,
            "corpus build finished"
        );
        Ok((corpus, report))
    }

    /// Fetch, extract, chunk and embed one source. Nothing is appended.
    async fn prepare_source(&self, source: &SourceDescriptor) -> std::result::Result<SourceBatch, SkipReason> {
        let name = source.name().to_string();

        let bytes = match source.fetch().await {
            Ok(bytes) => bytes,
            Err(e) => {
                tracing::warn!(source = %name, error = %e, "failed to fetch source");
                return Err(SkipReason::FetchFailed);
            }
        };

        let text = self.extract(&name, bytes).await.map_err(|e| {
            tracing::warn!(source = %name, error = %e, "skipping source");
            SkipReason::of(&e)
        })?;

        let doc = source.document(text);
        let pieces = self.splitter.split_text(&doc.content);
        if pieces.is_empty() {
            let err = Error::NoChunks { name };
            tracing::warn!(error = %err, "skipping source");
            return Err(SkipReason::of(&err));
        }

        let vectors = self.embed_all(&pieces).await.map_err(|e| {
            tracing::error!(source = %name, error = %e, "skipping source");
            SkipReason::of(&e)
        })?;

        let metadata = (0..pieces.len())
            .map(|i| ChunkMetadata::for_chunk(&doc, i))
            .collect();
        Ok(SourceBatch {
            chunks: pieces,
            metadata,
            vectors,
        })
    }

    async fn extract(&self, name: &str, bytes: Vec<u8>) -> docqa_core::Result<String> {
        let extractor = Arc::clone(&self.extractor);
        let owned_name = name.to_string();
        let text = tokio::task::spawn_blocking(move || extractor.extract(&owned_name, &bytes))
            .await
            .map_err(|e| Error::ExtractionFailure {
                name: name.to_string(),
                reason: e.to_string(),
            })?
            .map_err(|e| Error::ExtractionFailure {
                name: name.to_string(),
                reason: e.to_string(),
            })?;

        if text.trim().is_empty() {
            return Err(Error::EmptyContent {
                name: name.to_string(),
            });
        }
        Ok(text)
    }

    /// Embed all pieces in sub-batches, checking counts and widths.
    async fn embed_all(&self, pieces: &[String]) -> docqa_core::Result<Vec<Vec<f32>>> {
        let mut expected = self.index.dims();
        let mut vectors = Vec::with_capacity(pieces.len());

        for batch in pieces.chunks(self.batch_size) {
            let embedded = self
                .embedder
                .embed(batch)
                .await
                .map_err(|e| Error::EmbeddingFailure(format!("{e:#}")))?;
            if embedded.len() != batch.len() {
                return Err(Error::EmbeddingFailure(format!(
                    "{} vectors for {} texts",
                    embedded.len(),
                    batch.len()
                )));
            }
            for v in &embedded {
                let dims = *expected.get_or_insert(v.len());
                if v.len() != dims {
                    return Err(Error::DimensionMismatch {
                        expected: dims,
                        actual: v.len(),
                    });
                }
            }
            vectors.extend(embedded);
        }

        Ok(vectors)
    }

    fn append(&mut self, vectors: &[Vec<f32>]) -> docqa_core::Result<()> {
        if self.index.dims().is_none() {
            if let Some(first) = vectors.first() {
                self.index.initialize(first.len())?;
            }
        }
        self.index.append(vectors)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::extract::ExtractError;
    use crate::sources::LocalFile;
    use async_trait::async_trait;
    use std::path::PathBuf;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use tempfile::TempDir;

    struct Utf8Extractor;

    impl TextExtractor for Utf8Extractor {
        fn extract(&self, name: &str, bytes: &[u8]) -> std::result::Result<String, ExtractError> {
            if name.ends_with(".bin") {
                return Err(ExtractError::Unsupported(name.to_string()));
            }
            Ok(String::from_utf8_lossy(bytes).into_owned())
        }
    }

    /// Two-dimensional embedder counting its calls. Texts containing
    /// `explode` fail.
    struct LengthEmbedder {
        calls: AtomicUsize,
    }

    #[async_trait]
    impl Embedder for LengthEmbedder {
        fn model_name(&self) -> &str {
            "length"
        }

        async fn embed(&self, texts: &[String]) -> anyhow::Result<Vec<Vec<f32>>> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if texts.iter().any(|t| t.contains("explode")) {
                anyhow::bail!("model crashed");
            }
            Ok(texts.iter().map(|t| vec![t.len() as f32, 1.0]).collect())
        }
    }

    fn write_source(dir: &TempDir, relative: &str, body: &str) -> SourceDescriptor {
        let path: PathBuf = dir.path().join(relative);
        std::fs::create_dir_all(path.parent().unwrap()).unwrap();
        std::fs::write(&path, body).unwrap();
        let category = relative
            .rsplit_once('/')
            .map(|(dir, _)| dir.to_string())
            .unwrap_or_else(|| "general_local".into());
        SourceDescriptor::Local(LocalFile {
            name: relative.rsplit('/').next().unwrap().to_string(),
            relative: relative.to_string(),
            path,
            category,
        })
    }

    fn builder(embedder: Arc<LengthEmbedder>) -> CorpusBuilder {
        CorpusBuilder::new(
            TextSplitter::new(40, 10).unwrap(),
            embedder,
            Arc::new(Utf8Extractor),
        )
        .batch_size(2)
    }

    #[tokio::test]
    async fn test_build_skips_failures_and_stays_aligned() {
        let tmp = TempDir::new().unwrap();
        let sources = vec![
            write_source(&tmp, "a.txt", "alpha beta gamma delta epsilon zeta eta theta iota kappa"),
            write_source(&tmp, "blank.txt", "   \n  "),
            write_source(&tmp, "broken.bin", "ignored"),
            write_source(&tmp, "boom.txt", "first words here and then explode later on"),
            write_source(&tmp, "b.txt", "short body"),
        ];

        let embedder = Arc::new(LengthEmbedder { calls: AtomicUsize::new(0) });
        let (corpus, report) = builder(embedder).build(&sources).await.unwrap();

        assert_eq!(report.total, 5);
        assert_eq!(report.processed, 2);
        assert_eq!(report.errors, 2);
        assert_eq!(report.skipped.get(&SkipReason::EmptyContent), Some(&1));
        assert_eq!(report.skipped.get(&SkipReason::ExtractionFailed), Some(&1));
        assert_eq!(report.skipped.get(&SkipReason::EmbeddingFailed), Some(&1));
        assert_eq!(report.dims, Some(2));

        assert_eq!(corpus.chunks().len(), corpus.metadata().len());
        assert_eq!(corpus.chunks().len(), corpus.index().len());
        assert!(corpus.metadata().iter().all(|m| m.source != "boom.txt"));
        assert_eq!(corpus.metadata().last().unwrap().doc_id, "local_b.txt");
    }

    #[tokio::test]
    async fn test_sub_batching() {
        let tmp = TempDir::new().unwrap();
        let body = "one two three four five six seven eight nine ten eleven twelve thirteen fourteen";
        let sources = vec![write_source(&tmp, "long.txt", body)];
        let embedder = Arc::new(LengthEmbedder { calls: AtomicUsize::new(0) });

        let (corpus, _) = builder(Arc::clone(&embedder)).build(&sources).await.unwrap();
        let chunk_count = corpus.len();
        assert!(chunk_count > 2);
        assert_eq!(embedder.calls.load(Ordering::SeqCst), chunk_count.div_ceil(2));
        let ids: Vec<usize> = corpus.metadata().iter().map(|m| m.chunk_id).collect();
        assert_eq!(ids, (0..chunk_count).collect::<Vec<_>>());
    }

    #[tokio::test]
    async fn test_no_content_is_an_error() {
        let tmp = TempDir::new().unwrap();
        let sources = vec![write_source(&tmp, "blank.txt", " ")];
        let embedder = Arc::new(LengthEmbedder { calls: AtomicUsize::new(0) });

        let err = builder(embedder).build(&sources).await.err().unwrap();
        assert_eq!(err.downcast_ref::<Error>(), Some(&Error::NoContent));
    }

    #[tokio::test]
    async fn test_catalog_association_runs_after_build() {
        let tmp = TempDir::new().unwrap();
        let sources = vec![write_source(&tmp, "Budget Report.txt", "budget figures for the year")];
        let (catalog, _) = UrlCatalog::from_json(
            r#"[{"name": "budget report.txt", "url": "https://intra/budget", "category": "Finance"}]"#,
            "catalog",
        )
        .unwrap();
        let embedder = Arc::new(LengthEmbedder { calls: AtomicUsize::new(0) });

        let (corpus, report) = builder(embedder)
            .catalog(Some(catalog))
            .build(&sources)
            .await
            .unwrap();
        assert_eq!(report.associated, corpus.len());
        assert_eq!(corpus.metadata()[0].url.as_deref(), Some("https://intra/budget"));
        assert_eq!(corpus.metadata()[0].display_category(), "Finance");
    }

    #[tokio::test]
    async fn test_same_stem_in_different_folders_are_separate_documents() {
        let tmp = TempDir::new().unwrap();
        let sources = vec![
            write_source(&tmp, "finance/Report.txt", "quarterly budget numbers"),
            write_source(&tmp, "hr/Report.txt", "staff turnover numbers"),
            write_source(&tmp, "hr/Report.pdf.txt", "converted handbook text"),
        ];
        let embedder = Arc::new(LengthEmbedder { calls: AtomicUsize::new(0) });

        let (corpus, report) = builder(embedder).build(&sources).await.unwrap();
        assert_eq!(report.processed, 3);
        assert_eq!(corpus.document_count(), 3);

        let ids: Vec<&str> = corpus.metadata().iter().map(|m| m.doc_id.as_str()).collect();
        assert_eq!(
            ids,
            vec!["local_finance/Report.txt", "local_hr/Report.txt", "local_hr/Report.pdf.txt"]
        );
        assert_eq!(corpus.metadata()[0].title, "Report");
        assert_eq!(corpus.metadata()[0].category, "finance");
    }

    #[tokio::test]
    async fn test_every_position_matches_its_document_chunk_and_vector() {
        let tmp = TempDir::new().unwrap();
        let bodies = [
            ("a.txt", "alpha beta gamma delta epsilon zeta eta theta iota kappa lambda"),
            ("b.txt", "first words here and then explode later on"),
            ("c.txt", "one two three four five six seven eight nine ten eleven twelve"),
            ("d.txt", "short body"),
        ];
        let sources: Vec<SourceDescriptor> = bodies
            .iter()
            .map(|(name, body)| write_source(&tmp, name, body))
            .collect();
        let embedder = Arc::new(LengthEmbedder { calls: AtomicUsize::new(0) });

        let (corpus, report) = builder(embedder).build(&sources).await.unwrap();
        assert_eq!(report.processed, 3);
        assert_eq!(report.skipped.get(&SkipReason::EmbeddingFailed), Some(&1));

        let splitter = TextSplitter::new(40, 10).unwrap();
        let expected: Vec<(String, usize, String)> = bodies
            .iter()
            .filter(|(name, _)| *name != "b.txt")
            .flat_map(|(name, body)| {
                splitter
                    .split_text(body)
                    .into_iter()
                    .enumerate()
                    .map(move |(i, piece)| (format!("local_{name}"), i, piece))
            })
            .collect();
        assert_eq!(corpus.len(), expected.len());
        assert_eq!(corpus.index().len(), expected.len());

        for (i, (doc_id, chunk_id, piece)) in expected.iter().enumerate() {
            let meta = &corpus.metadata()[i];
            assert_eq!(&corpus.chunks()[i], piece);
            assert_eq!(&meta.doc_id, doc_id);
            assert_eq!(meta.chunk_id, *chunk_id);

            let vector = corpus.index().vector(i).unwrap();
            assert_eq!(vector, &[piece.len() as f32, 1.0][..]);
        }
    }
}
