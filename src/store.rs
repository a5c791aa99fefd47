//! Corpus artifacts on disk.
//!
//! A corpus directory holds four files:
//!
//! | File | Content |
//! |------|---------|
//! | `chunks.json` | `{"chunks": [...]}`, chunk texts in index order |
//! | `metadata.json` | array of chunk metadata, same order |
//! | `index.bin` | flat L2 index bytes |
//! | `manifest.json` | build id, timestamp, model, dimension, counts, digests |
//!
//! Saving writes everything into a staging directory first. The previous
//! manifest is removed before the files are renamed into place and the new
//! manifest goes in last, so an interrupted swap leaves a directory without
//! a manifest rather than a mix of two builds. Loading requires the
//! manifest, validates that chunks, metadata and vectors agree, and checks
//! every artifact against the manifest digests before the corpus can be
//! queried.

use anyhow::{bail, Context, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::collections::BTreeMap;
use std::fs;
use std::path::Path;
use uuid::Uuid;

use docqa_core::corpus::Corpus;
use docqa_core::index::FlatL2Index;
use docqa_core::models::ChunkMetadata;

pub const CHUNKS_FILE: &str = "chunks.json";
pub const METADATA_FILE: &str = "metadata.json";
pub const INDEX_FILE: &str = "index.bin";
pub const MANIFEST_FILE: &str = "manifest.json";

#[derive(Serialize)]
struct ChunksOut<'a> {
    chunks: &'a [String],
}

#[derive(Deserialize)]
struct ChunksIn {
    chunks: Vec<String>,
}

/// Build parameters recorded alongside the artifacts.
#[derive(Debug, Clone, PartialEq)]
pub struct BuildInfo {
    pub model: String,
    pub chunk_size: usize,
    pub chunk_overlap: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Manifest {
    pub build_id: String,
    pub created_at: DateTime<Utc>,
    pub model: String,
    pub dims: usize,
    pub chunks: usize,
    pub documents: usize,
    pub chunk_size: usize,
    pub chunk_overlap: usize,
    /// SHA-256 of each artifact file, keyed by file name.
    pub sha256: BTreeMap<String, String>,
}

/// Write `corpus` into `dir`, replacing any previous artifacts.
pub fn save_corpus(dir: &Path, corpus: &Corpus, info: &BuildInfo) -> Result<Manifest> {
    fs::create_dir_all(dir)
        .with_context(|| format!("Failed to create corpus directory: {}", dir.display()))?;

    let build_id = Uuid::new_v4().to_string();
    let staging = dir.join(format!(".staging-{build_id}"));
    fs::create_dir_all(&staging)?;

    let result = write_staged(&staging, corpus, info, build_id).and_then(|manifest| {
        // No manifest while files are swapped; the new one lands last.
        remove_if_present(&dir.join(MANIFEST_FILE))?;
        for name in [CHUNKS_FILE, METADATA_FILE, INDEX_FILE, MANIFEST_FILE] {
            fs::rename(staging.join(name), dir.join(name))
                .with_context(|| format!("Failed to move {name} into {}", dir.display()))?;
        }
        Ok(manifest)
    });

    if let Err(e) = fs::remove_dir_all(&staging) {
        tracing::warn!(dir = %staging.display(), error = %e, "failed to remove staging directory");
    }
    let manifest = result?;
    tracing::info!(
        dir = %dir.display(),
        build_id = %manifest.build_id,
        chunks = manifest.chunks,
        "corpus saved"
    );
    Ok(manifest)
}

fn write_staged(staging: &Path, corpus: &Corpus, info: &BuildInfo, build_id: String) -> Result<Manifest> {
    let files: [(&str, Vec<u8>); 3] = [
        (
            CHUNKS_FILE,
            serde_json::to_vec(&ChunksOut {
                chunks: corpus.chunks(),
            })?,
        ),
        (METADATA_FILE, serde_json::to_vec_pretty(corpus.metadata())?),
        (INDEX_FILE, corpus.index().to_bytes()),
    ];

    let mut sha256 = BTreeMap::new();
    for (name, bytes) in &files {
        fs::write(staging.join(name), bytes)
            .with_context(|| format!("Failed to write {name}"))?;
        sha256.insert(name.to_string(), hex::encode(Sha256::digest(bytes)));
    }

    let manifest = Manifest {
        build_id,
        created_at: Utc::now(),
        model: info.model.clone(),
        dims: corpus.dims().unwrap_or(0),
        chunks: corpus.len(),
        documents: corpus.document_count(),
        chunk_size: info.chunk_size,
        chunk_overlap: info.chunk_overlap,
        sha256,
    };
    fs::write(
        staging.join(MANIFEST_FILE),
        serde_json::to_vec_pretty(&manifest)?,
    )?;
    Ok(manifest)
}

/// Load and validate the corpus in `dir`.
///
/// Misaligned artifacts fail with [`docqa_core::Error::IndexMisalignment`].
/// A missing manifest means the last save never finished, and an artifact
/// whose digest differs from the manifest belongs to another build; both
/// are errors.
pub fn load_corpus(dir: &Path) -> Result<(Corpus, Manifest)> {
    let chunks_bytes = read_artifact(dir, CHUNKS_FILE)?;
    let metadata_bytes = read_artifact(dir, METADATA_FILE)?;
    let index_bytes = read_artifact(dir, INDEX_FILE)?;

    let chunks: ChunksIn = serde_json::from_slice(&chunks_bytes).context("Invalid chunks.json")?;
    let metadata: Vec<ChunkMetadata> =
        serde_json::from_slice(&metadata_bytes).context("Invalid metadata.json")?;
    let index = FlatL2Index::from_bytes(&index_bytes)?;
    let corpus = Corpus::new(chunks.chunks, metadata, index)?;

    let manifest_bytes = fs::read(dir.join(MANIFEST_FILE)).with_context(|| {
        format!(
            "No {MANIFEST_FILE} in {}: the last build did not finish, rebuild the corpus",
            dir.display()
        )
    })?;
    let manifest: Manifest =
        serde_json::from_slice(&manifest_bytes).context("Invalid manifest.json")?;
    for (name, bytes) in [
        (CHUNKS_FILE, &chunks_bytes),
        (METADATA_FILE, &metadata_bytes),
        (INDEX_FILE, &index_bytes),
    ] {
        let actual = hex::encode(Sha256::digest(bytes));
        if manifest.sha256.get(name).is_some_and(|expected| *expected != actual) {
            bail!(
                "{name} does not match {MANIFEST_FILE} (build {}); rebuild the corpus",
                manifest.build_id
            );
        }
    }

    tracing::info!(
        dir = %dir.display(),
        chunks = corpus.len(),
        dims = corpus.dims().unwrap_or(0),
        "corpus loaded"
    );
    Ok((corpus, manifest))
}

/// Warn when the corpus was built with a different embedding model.
pub fn check_model(manifest: &Manifest, model: &str) -> bool {
    if manifest.model == model {
        return true;
    }
    tracing::warn!(
        built_with = %manifest.model,
        configured = %model,
        "corpus was built with a different embedding model"
    );
    false
}

fn remove_if_present(path: &Path) -> Result<()> {
    match fs::remove_file(path) {
        Ok(()) => Ok(()),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
        Err(e) => Err(e).with_context(|| format!("Failed to remove {}", path.display())),
    }
}

fn read_artifact(dir: &Path, name: &str) -> Result<Vec<u8>> {
    let path = dir.join(name);
    fs::read(&path).with_context(|| format!("Failed to read {}", path.display()))
}
