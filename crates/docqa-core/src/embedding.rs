//! Embedding trait and vector byte helpers.
//!
//! Concrete providers (OpenAI, Ollama, fastembed) live in the `docqa` app
//! crate and implement [`Embedder`]. The core only needs a batch
//! text-to-vector function whose dimensionality is stable once discovered.

use async_trait::async_trait;

/// Batch text-to-vector function.
#[async_trait]
pub trait Embedder: Send + Sync {
    /// Model identifier (e.g. `"all-minilm-l6-v2"`).
    fn model_name(&self) -> &str;

    /// Embed a batch of texts. Must return exactly one vector per input.
    async fn embed(&self, texts: &[String]) -> anyhow::Result<Vec<Vec<f32>>>;

    /// Embed a single query string.
    async fn embed_query(&self, text: &str) -> anyhow::Result<Vec<f32>> {
        let mut vectors = self.embed(&[text.to_string()]).await?;
        if vectors.len() != 1 {
            anyhow::bail!("embedder returned {} vectors for 1 query", vectors.len());
        }
        Ok(vectors.remove(0))
    }
}

/// Encode a float vector as little-endian `f32` bytes.
///
/// ```rust
/// use docqa_core::embedding::{blob_to_vec, vec_to_blob};
///
/// let v = vec![1.0f32, -2.5, 3.125];
/// let blob = vec_to_blob(&v);
/// assert_eq!(blob.len(), 12);
/// assert_eq!(blob_to_vec(&blob), v);
/// ```
pub fn vec_to_blob(vec: &[f32]) -> Vec<u8> {
    let mut bytes = Vec::with_capacity(vec.len() * 4);
    for &v in vec {
        bytes.extend_from_slice(&v.to_le_bytes());
    }
    bytes
}

/// Decode bytes written by [`vec_to_blob`]. Trailing partial values are
/// ignored.
pub fn blob_to_vec(blob: &[u8]) -> Vec<f32> {
    blob.chunks_exact(4)
        .map(|c| f32::from_le_bytes([c[0], c[1], c[2], c[3]]))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Fixed(usize);

    #[async_trait]
    impl Embedder for Fixed {
        fn model_name(&self) -> &str {
            "fixed"
        }

        async fn embed(&self, _texts: &[String]) -> anyhow::Result<Vec<Vec<f32>>> {
            Ok(vec![vec![1.0, 2.0]; self.0])
        }
    }

    #[test]
    fn test_vec_blob_roundtrip() {
        let vec = vec![1.0f32, -2.5, 3.125, 0.0, -0.001];
        assert_eq!(blob_to_vec(&vec_to_blob(&vec)), vec);
    }

    #[tokio::test]
    async fn test_embed_query_single_vector() {
        assert_eq!(Fixed(1).embed_query("q").await.unwrap(), vec![1.0, 2.0]);
    }

    #[tokio::test]
    async fn test_embed_query_rejects_wrong_count() {
        assert!(Fixed(0).embed_query("q").await.is_err());
        assert!(Fixed(2).embed_query("q").await.is_err());
    }
}
