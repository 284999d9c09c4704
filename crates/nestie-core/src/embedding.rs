//! Embedder trait and vector utilities.
//!
//! Defines the [`Embedder`] trait that every embedding backend implements,
//! plus pure helpers for similarity computation and BLOB encoding.
//!
//! Concrete providers (Gemini, OpenAI, Ollama, hashed, fastembed) live in
//! the `nestie` app crate.

use async_trait::async_trait;

use crate::error::{Error, Result, ServiceErrorKind};

/// Maps text to fixed-dimension vectors.
///
/// Implementations are expected to retry transient failures internally
/// and to surface [`Error::Embedding`] once their retry budget is spent.
#[async_trait]
pub trait Embedder: Send + Sync {
    /// Returns the model identifier (e.g. `"models/embedding-001"`).
    fn model_name(&self) -> &str;

    /// Returns the embedding dimensionality (e.g. `768`).
    fn dims(&self) -> usize;

    /// Embed a batch of texts, returning one vector per input in order.
    async fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>>;

    /// Embed a single query string.
    async fn embed_query(&self, text: &str) -> Result<Vec<f32>> {
        let mut vectors = self.embed(&[text.to_string()]).await?;
        match vectors.pop() {
            Some(v) if vectors.is_empty() => Ok(v),
            _ => Err(Error::embedding(
                ServiceErrorKind::MalformedResponse,
                "expected exactly one vector for a single query",
            )),
        }
    }
}

/// Verify a provider response: one vector per input, each of `dims` length.
pub fn check_vectors(expected_count: usize, dims: usize, vectors: &[Vec<f32>]) -> Result<()> {
    if vectors.len() != expected_count {
        return Err(Error::embedding(
            ServiceErrorKind::MalformedResponse,
            format!("expected {} vectors, got {}", expected_count, vectors.len()),
        ));
    }
    if let Some(bad) = vectors.iter().find(|v| v.len() != dims) {
        return Err(Error::DimensionMismatch {
            expected: dims,
            actual: bad.len(),
        });
    }
    Ok(())
}

/// Encode a float vector as a BLOB (little-endian f32 bytes).
///
/// # Example
///
/// ```rust
/// use nestie_core::embedding::{vec_to_blob, blob_to_vec};
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

/// Decode a BLOB produced by [`vec_to_blob`].
pub fn blob_to_vec(blob: &[u8]) -> Vec<f32> {
    blob.chunks_exact(4)
        .map(|chunk| f32::from_le_bytes([chunk[0], chunk[1], chunk[2], chunk[3]]))
        .collect()
}

/// Cosine similarity in `[-1.0, 1.0]`.
///
/// Returns `0.0` for empty vectors, vectors of different lengths, or a
/// zero-norm operand.
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    if a.len() != b.len() || a.is_empty() {
        return 0.0;
    }

    let mut dot = 0.0f32;
    let mut norm_a = 0.0f32;
    let mut norm_b = 0.0f32;

    for (x, y) in a.iter().zip(b.iter()) {
        dot += x * y;
        norm_a += x * x;
        norm_b += y * y;
    }

    let denom = norm_a.sqrt() * norm_b.sqrt();
    if denom < f32::EPSILON {
        return 0.0;
    }

    dot / denom
}

#[cfg(test)]
mod tests {
    use super::*;

    struct FixedEmbedder(Vec<Vec<f32>>);

    #[async_trait]
    impl Embedder for FixedEmbedder {
        fn model_name(&self) -> &str {
            "fixed"
        }
        fn dims(&self) -> usize {
            2
        }
        async fn embed(&self, _texts: &[String]) -> Result<Vec<Vec<f32>>> {
            Ok(self.0.clone())
        }
    }

    #[test]
    fn test_vec_blob_roundtrip() {
        let vec = vec![1.0f32, -2.5, 3.125, 0.0, -0.001];
        assert_eq!(blob_to_vec(&vec_to_blob(&vec)), vec);
    }

    #[test]
    fn test_cosine_identical() {
        let v = vec![1.0, 2.0, 3.0];
        assert!((cosine_similarity(&v, &v) - 1.0).abs() < 1e-6);
    }

    #[test]
    fn test_cosine_orthogonal_and_opposite() {
        assert!(cosine_similarity(&[1.0, 0.0], &[0.0, 1.0]).abs() < 1e-6);
        assert!((cosine_similarity(&[1.0, 0.0], &[-1.0, 0.0]) + 1.0).abs() < 1e-6);
    }

    #[test]
    fn test_cosine_degenerate() {
        assert_eq!(cosine_similarity(&[], &[]), 0.0);
        assert_eq!(cosine_similarity(&[1.0, 2.0], &[1.0]), 0.0);
        assert_eq!(cosine_similarity(&[0.0, 0.0], &[1.0, 1.0]), 0.0);
    }

    #[test]
    fn test_check_vectors() {
        assert!(check_vectors(1, 2, &[vec![0.1, 0.2]]).is_ok());
        assert!(matches!(
            check_vectors(2, 2, &[vec![0.1, 0.2]]),
            Err(Error::Embedding {
                kind: ServiceErrorKind::MalformedResponse,
                ..
            })
        ));
        assert!(matches!(
            check_vectors(1, 3, &[vec![0.1, 0.2]]),
            Err(Error::DimensionMismatch {
                expected: 3,
                actual: 2
            })
        ));
    }

    #[tokio::test]
    async fn test_embed_query_requires_single_vector() {
        let one = FixedEmbedder(vec![vec![1.0, 0.0]]);
        assert_eq!(one.embed_query("q").await.unwrap(), vec![1.0, 0.0]);

        let two = FixedEmbedder(vec![vec![1.0, 0.0], vec![0.0, 1.0]]);
        assert!(two.embed_query("q").await.is_err());
    }
}
