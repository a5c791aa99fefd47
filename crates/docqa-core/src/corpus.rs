//! The corpus handle: chunk texts, chunk metadata and vector index kept as
//! three aligned arrays.
//!
//! A [`Corpus`] can only be constructed through [`Corpus::new`], which
//! checks that all three agree in length. After construction it is
//! read-only; queries share it behind an `Arc` without locking.

use crate::error::{Error, Result};
use crate::index::{FlatL2Index, VectorIndex};
use crate::models::ChunkMetadata;

/// A validated, read-only corpus.
#[derive(Debug, Clone)]
pub struct Corpus<I: VectorIndex = FlatL2Index> {
    chunks: Vec<String>,
    metadata: Vec<ChunkMetadata>,
    index: I,
}

impl<I: VectorIndex> Corpus<I> {
    /// Assemble a corpus, failing with [`Error::IndexMisalignment`] when the
    /// chunk, metadata and vector counts differ.
    pub fn new(chunks: Vec<String>, metadata: Vec<ChunkMetadata>, index: I) -> Result<Self> {
        check_alignment(chunks.len(), metadata.len(), index.len())?;
        Ok(Self {
            chunks,
            metadata,
            index,
        })
    }

    pub fn chunks(&self) -> &[String] {
        &self.chunks
    }

    pub fn metadata(&self) -> &[ChunkMetadata] {
        &self.metadata
    }

    pub fn index(&self) -> &I {
        &self.index
    }

    /// Number of chunks (equal to metadata entries and vectors).
    pub fn len(&self) -> usize {
        self.chunks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.chunks.is_empty()
    }

    /// Vector dimensionality, if the index has one.
    pub fn dims(&self) -> Option<usize> {
        self.index.dims()
    }

    /// Number of distinct documents.
    pub fn document_count(&self) -> usize {
        let mut ids: Vec<&str> = self.metadata.iter().map(|m| m.doc_id.as_str()).collect();
        ids.sort_unstable();
        ids.dedup();
        ids.len()
    }

    /// Decompose into the three arrays.
    pub fn into_parts(self) -> (Vec<String>, Vec<ChunkMetadata>, I) {
        (self.chunks, self.metadata, self.index)
    }
}

/// Fail unless the three counts are equal.
pub fn check_alignment(chunks: usize, metadata: usize, vectors: usize) -> Result<()> {
    if chunks == metadata && metadata == vectors {
        Ok(())
    } else {
        Err(Error::IndexMisalignment {
            chunks,
            metadata,
            vectors,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn meta(doc: &str, chunk_id: usize) -> ChunkMetadata {
        ChunkMetadata {
            title: doc.into(),
            source: format!("{doc}.txt"),
            path: format!("/d/{doc}.txt"),
            category: "general_local".into(),
            chunk_id,
            doc_id: format!("local_{doc}"),
            url: None,
            url_category: None,
        }
    }

    fn index(n: usize) -> FlatL2Index {
        let mut index = FlatL2Index::new();
        index.initialize(2).unwrap();
        index.append(&vec![vec![0.0, 1.0]; n]).unwrap();
        index
    }

    #[test]
    fn test_aligned_corpus() {
        let corpus = Corpus::new(
            vec!["a".into(), "b".into(), "c".into()],
            vec![meta("x", 0), meta("x", 1), meta("y", 0)],
            index(3),
        )
        .unwrap();
        assert_eq!(corpus.len(), 3);
        assert_eq!(corpus.document_count(), 2);
        assert_eq!(corpus.dims(), Some(2));
    }

    #[test]
    fn test_misaligned_vectors() {
        let err = Corpus::new(
            vec!["a".into(), "b".into()],
            vec![meta("x", 0), meta("x", 1)],
            index(3),
        )
        .unwrap_err();
        assert_eq!(
            err,
            Error::IndexMisalignment {
                chunks: 2,
                metadata: 2,
                vectors: 3
            }
        );
    }

    #[test]
    fn test_misaligned_metadata() {
        assert!(Corpus::new(vec!["a".into()], vec![], index(1)).is_err());
    }
}
