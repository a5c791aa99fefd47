//! CLI command implementations.
//!
//! Each `run_*` function backs one `docqa` subcommand. Results go to
//! stdout; logs and progress go to stderr.

use anyhow::{bail, Result};
use std::sync::Arc;

use docqa_core::catalog::UrlCatalog;
use docqa_core::chunk::TextSplitter;
use docqa_core::index::VectorIndex;
use docqa_core::models::{RetrievalResult, FALLBACK_CATEGORY};
use docqa_core::query::{QueryParams, QueryService};

use crate::builder::CorpusBuilder;
use crate::catalog::load_catalog;
use crate::config::Config;
use crate::embedding::create_embedder;
use crate::extract::FormatExtractor;
use crate::prepare::prepare_documents;
use crate::progress::{BuildEvent, ProgressMode};
use crate::sources::discover_sources;
use crate::store::{check_model, load_corpus, save_corpus, BuildInfo};

/// Characters of each chunk shown by `docqa check`.
const PREVIEW_CHARS: usize = 200;
/// Chunks shown by `docqa check`.
const PREVIEW_COUNT: usize = 3;

/// `docqa build`: discover, build and persist the corpus.
pub async fn run_build(config: &Config, progress: ProgressMode) -> Result<()> {
    if config.sources.is_empty() {
        bail!("No sources configured. Add [sources.local], [sources.azure] or [sources.s3].");
    }

    let reporter = progress.reporter();
    reporter.report(BuildEvent::Discovering);
    let sources = discover_sources(config).await?;
    tracing::info!(count = sources.len(), "sources discovered");

    let embedder = create_embedder(&config.embedding)?;
    let catalog = load_catalog_or_warn(config).await;
    let splitter = TextSplitter::new(config.chunking.chunk_size, config.chunking.chunk_overlap)?;
    let model = embedder.model_name().to_string();

    let (corpus, report) = CorpusBuilder::new(
        splitter,
        embedder,
        Arc::new(FormatExtractor::from_config(&config.extraction)),
    )
    .catalog(catalog)
    .batch_size(config.embedding.batch_size)
    .progress(progress.reporter())
    .build(&sources)
    .await?;

    reporter.report(BuildEvent::Saving {
        chunks: corpus.len() as u64,
    });
    let manifest = save_corpus(
        &config.corpus.dir,
        &corpus,
        &BuildInfo {
            model,
            chunk_size: config.chunking.chunk_size,
            chunk_overlap: config.chunking.chunk_overlap,
        },
    )?;

    println!("build");
    println!("  sources: {}", report.total);
    println!("  processed: {}", report.processed);
    for (reason, count) in &report.skipped {
        println!("  skipped ({:?}): {}", reason, count);
    }
    println!("  errors: {}", report.errors);
    println!("  chunks: {}", report.chunks);
    println!("  with url: {}", report.associated);
    println!("  dimension: {}", manifest.dims);
    println!("  build id: {}", manifest.build_id);
    println!("  written to: {}", config.corpus.dir.display());
    println!("ok");
    Ok(())
}

/// `docqa search`: load the corpus once and run a single query.
pub async fn run_search(config: &Config, query: &str, top_k: Option<usize>, json: bool) -> Result<()> {
    let (corpus, manifest) = load_corpus(&config.corpus.dir)?;
    let embedder = create_embedder(&config.embedding)?;
    check_model(&manifest, embedder.model_name());

    let service = QueryService::new(Arc::new(corpus), embedder).with_params(QueryParams {
        top_k: config.retrieval.top_k,
        keyword_candidates: config.retrieval.keyword_candidates,
    });
    let top_k = top_k.unwrap_or(config.retrieval.top_k);
    let results = service.query_top_k(query, top_k).await?;

    if json {
        println!("{}", serde_json::to_string_pretty(&results)?);
    } else {
        print_results(&results);
    }
    Ok(())
}

fn print_results(results: &[RetrievalResult]) {
    if results.is_empty() {
        println!("No results.");
        return;
    }
    for (i, result) in results.iter().enumerate() {
        println!("{}. [{:.2}] {}", i + 1, result.score, result.title);
        println!(
            "    category: {}",
            result.category.as_deref().unwrap_or(FALLBACK_CATEGORY)
        );
        if let Some(url) = &result.url {
            println!("    url: {}", url);
        }
        println!(
            "    excerpt: \"{}\"",
            preview(&result.extract.replace('\n', " "), PREVIEW_CHARS).trim()
        );
        println!();
    }
}

/// `docqa check`: validate the persisted corpus and preview it.
pub fn run_check(config: &Config) -> Result<()> {
    let (corpus, manifest) = load_corpus(&config.corpus.dir)?;

    println!("corpus {}", config.corpus.dir.display());
    println!("  chunks:      {}", corpus.chunks().len());
    println!("  metadata:    {}", corpus.metadata().len());
    println!("  vectors:     {}", corpus.index().len());
    println!(
        "  dimension:   {}",
        corpus
            .dims()
            .map(|d| d.to_string())
            .unwrap_or_else(|| "-".to_string())
    );
    println!("  documents:   {}", corpus.document_count());
    println!("  model:       {}", manifest.model);
    println!(
        "  built:       {}",
        manifest.created_at.format("%Y-%m-%d %H:%M:%S UTC")
    );
    println!("  build id:    {}", manifest.build_id);

    println!();
    for (i, (chunk, meta)) in corpus
        .chunks()
        .iter()
        .zip(corpus.metadata())
        .take(PREVIEW_COUNT)
        .enumerate()
    {
        println!("[{}] {} ({})", i, meta.title, meta.display_category());
        println!("    {}", preview(chunk, PREVIEW_CHARS).replace('\n', " "));
    }
    println!("ok");
    Ok(())
}

/// `docqa prepare`: extract raw documents into the processed folder.
pub async fn run_prepare(config: &Config) -> Result<()> {
    let catalog = load_catalog_or_warn(config).await;
    let extractor = FormatExtractor::from_config(&config.extraction);
    let report = prepare_documents(
        &config.extraction.documents_dir,
        &config.extraction.processed_dir,
        &extractor,
        catalog.as_ref(),
    )?;
    report.print();
    Ok(())
}

/// A catalog that cannot be loaded only costs URLs, not the command.
async fn load_catalog_or_warn(config: &Config) -> Option<UrlCatalog> {
    match load_catalog(config).await {
        Ok(catalog) => catalog,
        Err(e) => {
            tracing::warn!(error = %format!("{e:#}"), "continuing without URL catalog");
            None
        }
    }
}

/// First `max` characters of `text`.
fn preview(text: &str, max: usize) -> String {
    match text.char_indices().nth(max) {
        Some((i, _)) => format!("{}...", &text[..i]),
        None => text.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_preview_is_char_safe() {
        assert_eq!(preview("short", 10), "short");
        assert_eq!(preview("ééééé", 3), "ééé...");
    }
}
