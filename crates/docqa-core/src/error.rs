//! Error taxonomy for corpus construction, loading and querying.
//!
//! Per-source variants ([`Error::ExtractionFailure`], [`Error::EmptyContent`],
//! [`Error::NoChunks`], [`Error::EmbeddingFailure`],
//! [`Error::DimensionMismatch`]) are recoverable during a build: the builder
//! logs them, counts them and moves on to the next source. The remaining
//! variants are terminal for the operation that raised them.

use thiserror::Error;

/// Errors raised by the core library.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum Error {
    /// A source could not be fetched or its text could not be extracted.
    #[error("extraction failed for {name}: {reason}")]
    ExtractionFailure { name: String, reason: String },

    /// Extraction succeeded but produced only whitespace.
    #[error("no text content in {name}")]
    EmptyContent { name: String },

    /// Text was present but chunking produced nothing.
    #[error("no chunks produced for {name}")]
    NoChunks { name: String },

    /// The embedding collaborator failed or returned a malformed batch.
    #[error("embedding failed: {0}")]
    EmbeddingFailure(String),

    /// A vector did not match the dimensionality of the index.
    #[error("dimension mismatch: index has {expected}, got {actual}")]
    DimensionMismatch { expected: usize, actual: usize },

    /// Chunk texts, chunk metadata and index vectors disagree in count.
    #[error("corpus misaligned: {chunks} chunks, {metadata} metadata entries, {vectors} vectors")]
    IndexMisalignment {
        chunks: usize,
        metadata: usize,
        vectors: usize,
    },

    /// No embedding batch ever succeeded, so the index has no dimension.
    #[error("vector index was never initialized")]
    IndexNotInitialized,

    /// The index was initialized twice, or with a zero dimension.
    #[error("invalid index dimension: {0}")]
    InvalidDimension(usize),

    /// No source produced a single chunk.
    #[error("no content: every source was skipped")]
    NoContent,

    /// Chunk size/overlap combination is unusable.
    #[error("invalid chunking parameters: {0}")]
    InvalidChunking(String),

    /// A persisted index blob could not be decoded.
    #[error("malformed index data: {0}")]
    MalformedIndex(String),
}

/// Convenience alias used throughout the core crate.
pub type Result<T> = std::result::Result<T, Error>;
