//! End-to-end tests for the build → persist → load → query pipeline,
//! using a deterministic vocabulary embedder instead of a real model.

use async_trait::async_trait;
use std::fs;
use std::path::Path;
use std::sync::Arc;
use tempfile::TempDir;

use docqa::builder::{CorpusBuilder, SkipReason};
use docqa::config::LocalSourceConfig;
use docqa::connector_fs::scan_local;
use docqa::extract::FormatExtractor;
use docqa::store::{load_corpus, save_corpus, BuildInfo, CHUNKS_FILE, INDEX_FILE};
use docqa_core::catalog::UrlCatalog;
use docqa_core::chunk::TextSplitter;
use docqa_core::embedding::Embedder;
use docqa_core::index::VectorIndex;
use docqa_core::query::QueryService;
use docqa_core::Error;

const VOCABULARY: [&str; 6] = ["budget", "planning", "employee", "conduct", "travel", "safety"];

/// Embeds text as per-word occurrence counts over a fixed vocabulary.
struct VocabEmbedder;

#[async_trait]
impl Embedder for VocabEmbedder {
    fn model_name(&self) -> &str {
        "vocab-test"
    }

    async fn embed(&self, texts: &[String]) -> anyhow::Result<Vec<Vec<f32>>> {
        Ok(texts
            .iter()
            .map(|t| {
                let lower = t.to_lowercase();
                VOCABULARY
                    .iter()
                    .map(|w| lower.matches(w).count() as f32)
                    .collect()
            })
            .collect())
    }
}

fn local_config(root: &Path, globs: &[&str]) -> LocalSourceConfig {
    LocalSourceConfig {
        root: root.to_path_buf(),
        include_globs: globs.iter().map(|g| g.to_string()).collect(),
        exclude_globs: vec![],
        follow_symlinks: false,
        default_category: "general_local".into(),
    }
}

fn builder() -> CorpusBuilder {
    CorpusBuilder::new(
        TextSplitter::default(),
        Arc::new(VocabEmbedder),
        Arc::new(FormatExtractor::default()),
    )
}

fn write_budget_and_handbook(root: &Path) {
    fs::write(
        root.join("Budget Report.txt"),
        "This report covers annual budget planning for the next fiscal year.",
    )
    .unwrap();
    fs::write(
        root.join("Staff Handbook.txt"),
        "Rules for employee conduct at the office.",
    )
    .unwrap();
}

#[tokio::test]
async fn budget_query_ranks_budget_report_first() {
    let tmp = TempDir::new().unwrap();
    write_budget_and_handbook(tmp.path());

    let sources = scan_local(&local_config(tmp.path(), &["**/*.txt"])).unwrap();
    let (corpus, report) = builder().build(&sources).await.unwrap();
    assert_eq!(report.processed, 2);
    assert_eq!(report.dims, Some(VOCABULARY.len()));

    let service = QueryService::new(Arc::new(corpus), Arc::new(VocabEmbedder));

    let top = service.query_top_k("budget planning", 1).await.unwrap();
    assert_eq!(top.len(), 1);
    assert_eq!(top[0].title, "Budget Report");
    assert!((top[0].score - 1.0).abs() < 1e-9);

    let all = service.query("budget planning").await.unwrap();
    assert_eq!(all[0].title, "Budget Report");
    if let Some(handbook) = all.iter().find(|r| r.title == "Staff Handbook") {
        assert!(handbook.score < all[0].score);
    }
}

#[tokio::test]
async fn build_survives_one_failing_source_of_five() {
    let tmp = TempDir::new().unwrap();
    for (name, body) in [
        ("a.txt", "budget figures"),
        ("b.txt", "travel policy"),
        ("c.txt", "safety rules"),
        ("d.txt", "employee onboarding"),
    ] {
        fs::write(tmp.path().join(name), body).unwrap();
    }
    fs::write(tmp.path().join("bad.docx"), b"not a zip archive").unwrap();

    let sources = scan_local(&local_config(tmp.path(), &["**/*.txt", "**/*.docx"])).unwrap();
    assert_eq!(sources.len(), 5);

    let (corpus, report) = builder().build(&sources).await.unwrap();
    assert_eq!(report.processed, 4);
    assert_eq!(report.errors, 1);
    assert_eq!(report.skipped.get(&SkipReason::ExtractionFailed), Some(&1));

    let mut docs: Vec<&str> = corpus.metadata().iter().map(|m| m.doc_id.as_str()).collect();
    docs.dedup();
    assert_eq!(docs, vec!["local_a.txt", "local_b.txt", "local_c.txt", "local_d.txt"]);
    assert_eq!(corpus.chunks().len(), corpus.index().len());
    assert_eq!(corpus.metadata().len(), corpus.index().len());
}

#[tokio::test]
async fn catalog_urls_survive_save_and_load() {
    let tmp = TempDir::new().unwrap();
    let docs = tmp.path().join("docs");
    fs::create_dir_all(docs.join("finance")).unwrap();
    write_budget_and_handbook(&docs.join("finance"));

    let (catalog, _) = UrlCatalog::from_json(
        r#"[{"Nom": "Budget Report.txt", "URL": "https://intra/budget", "Categorie": "Finance"}]"#,
        "catalog",
    )
    .unwrap();

    let sources = scan_local(&local_config(&docs, &["**/*.txt"])).unwrap();
    let (corpus, report) = builder()
        .catalog(Some(catalog))
        .build(&sources)
        .await
        .unwrap();
    assert_eq!(report.associated, 1);

    let out = tmp.path().join("models");
    let info = BuildInfo {
        model: "vocab-test".into(),
        chunk_size: 1000,
        chunk_overlap: 200,
    };
    save_corpus(&out, &corpus, &info).unwrap();
    let (loaded, manifest) = load_corpus(&out).unwrap();
    assert_eq!(manifest.model, "vocab-test");
    assert_eq!(loaded.metadata(), corpus.metadata());

    let service = QueryService::new(Arc::new(loaded), Arc::new(VocabEmbedder));
    let results = service.query_top_k("budget planning", 2).await.unwrap();
    assert_eq!(results[0].url.as_deref(), Some("https://intra/budget"));
    assert_eq!(results[0].category.as_deref(), Some("Finance"));
    let handbook = results.iter().find(|r| r.title == "Staff Handbook").unwrap();
    assert_eq!(handbook.url, None);
    assert_eq!(handbook.category.as_deref(), Some("finance"));
}

#[tokio::test]
async fn loading_misaligned_index_fails_before_any_query() {
    let tmp = TempDir::new().unwrap();
    write_budget_and_handbook(tmp.path());
    let sources = scan_local(&local_config(tmp.path(), &["**/*.txt"])).unwrap();
    let (corpus, _) = builder().build(&sources).await.unwrap();

    let out = tmp.path().join("models");
    let info = BuildInfo {
        model: "vocab-test".into(),
        chunk_size: 1000,
        chunk_overlap: 200,
    };
    save_corpus(&out, &corpus, &info).unwrap();

    // A third chunk with no vector behind it.
    fs::write(
        out.join(CHUNKS_FILE),
        r#"{"chunks": ["one", "two", "three"]}"#,
    )
    .unwrap();
    let err = load_corpus(&out).err().unwrap();
    assert!(matches!(
        err.downcast_ref::<Error>(),
        Some(Error::IndexMisalignment { chunks: 3, .. })
    ));

    // A truncated index blob.
    save_corpus(&out, &corpus, &info).unwrap();
    let bytes = fs::read(out.join(INDEX_FILE)).unwrap();
    fs::write(out.join(INDEX_FILE), &bytes[..bytes.len() - 3]).unwrap();
    let err = load_corpus(&out).err().unwrap();
    assert!(matches!(err.downcast_ref::<Error>(), Some(Error::MalformedIndex(_))));
}

#[tokio::test]
async fn building_from_only_empty_sources_fails() {
    let tmp = TempDir::new().unwrap();
    fs::write(tmp.path().join("blank.txt"), "\n\n   \n").unwrap();
    let sources = scan_local(&local_config(tmp.path(), &["**/*.txt"])).unwrap();

    let err = builder().build(&sources).await.err().unwrap();
    assert_eq!(err.downcast_ref::<Error>(), Some(&Error::NoContent));
}
