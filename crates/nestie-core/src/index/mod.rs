//! Vector index abstraction.
//!
//! The [`VectorIndex`] trait is everything the ingestion and retrieval
//! pipeline needs from a nearest-neighbour store. Implementations must be
//! `Send + Sync` so one index can be shared across concurrently handled
//! requests.
//!
//! Every index has a fixed dimensionality chosen at construction. Vectors
//! of any other length are refused with [`Error::DimensionMismatch`].

pub mod memory;

use async_trait::async_trait;

use crate::error::{Error, Result};
use crate::models::{Chunk, ScoredChunk};

/// Nearest-neighbour store over chunk embeddings.
///
/// # Operations
///
/// | Method | Purpose |
/// |--------|---------|
/// | [`upsert`](VectorIndex::upsert) | Insert or replace one chunk by id |
/// | [`replace_document`](VectorIndex::replace_document) | Swap all chunks of a document at once |
/// | [`remove_document`](VectorIndex::remove_document) | Drop a document and its hash |
/// | [`document_hash`](VectorIndex::document_hash) | Content hash recorded at last ingestion |
/// | [`query`](VectorIndex::query) | Top-`k` chunks by cosine similarity |
#[async_trait]
pub trait VectorIndex: Send + Sync {
    /// Dimensionality every stored vector must have.
    fn dims(&self) -> usize;

    /// Insert a chunk, replacing any stored chunk with the same id.
    async fn upsert(&self, chunk: &Chunk, vector: &[f32]) -> Result<()>;

    /// Replace every chunk of `document` with `chunks` and record its
    /// content hash. `vectors[i]` belongs to `chunks[i]`.
    async fn replace_document(
        &self,
        document: &str,
        hash: &str,
        chunks: &[Chunk],
        vectors: &[Vec<f32>],
    ) -> Result<()>;

    /// Drop every chunk of `document` and its recorded hash. Unknown
    /// documents are a no-op.
    async fn remove_document(&self, document: &str) -> Result<()>;

    /// Content hash recorded by the last [`replace_document`](VectorIndex::replace_document).
    async fn document_hash(&self, document: &str) -> Result<Option<String>>;

    /// The `k` most similar chunks, highest score first.
    ///
    /// `k = 0` and an empty index both yield an empty result. A `k`
    /// larger than the index returns every chunk once.
    async fn query(&self, vector: &[f32], k: usize) -> Result<Vec<ScoredChunk>>;

    /// Number of stored chunks.
    async fn len(&self) -> Result<usize>;

    async fn is_empty(&self) -> Result<bool> {
        Ok(self.len().await? == 0)
    }

    /// Names of documents with at least one stored chunk, sorted.
    async fn document_names(&self) -> Result<Vec<String>>;
}

/// Fail unless `actual` matches the index dimensionality.
pub fn check_dimension(expected: usize, actual: usize) -> Result<()> {
    if expected != actual {
        return Err(Error::DimensionMismatch { expected, actual });
    }
    Ok(())
}

/// Validate a [`VectorIndex::replace_document`] batch before touching storage.
pub fn check_batch(dims: usize, chunks: &[Chunk], vectors: &[Vec<f32>]) -> Result<()> {
    if chunks.len() != vectors.len() {
        return Err(Error::VectorIndex(format!(
            "{} chunks but {} vectors",
            chunks.len(),
            vectors.len()
        )));
    }
    for v in vectors {
        check_dimension(dims, v.len())?;
    }
    Ok(())
}

/// Sort candidates by descending score and keep the first `k`.
///
/// Ties break on chunk id so results are stable across runs.
pub fn top_k(mut candidates: Vec<ScoredChunk>, k: usize) -> Vec<ScoredChunk> {
    candidates.sort_by(|a, b| {
        b.score
            .partial_cmp(&a.score)
            .unwrap_or(std::cmp::Ordering::Equal)
            .then_with(|| a.chunk.id.cmp(&b.chunk.id))
    });
    candidates.truncate(k);
    candidates
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::chunk::chunk_text;

    #[test]
    fn test_top_k_orders_and_truncates() {
        let chunks = chunk_text("doc", &"word ".repeat(40), 20, 5);
        let scored: Vec<ScoredChunk> = chunks
            .iter()
            .enumerate()
            .map(|(i, c)| ScoredChunk {
                chunk: c.clone(),
                score: (i % 4) as f32 / 4.0,
            })
            .collect();
        let top = top_k(scored, 3);
        assert_eq!(top.len(), 3);
        assert!(top.windows(2).all(|w| w[0].score >= w[1].score));
        assert_eq!(top[0].score, 0.75);
    }

    #[test]
    fn test_check_batch() {
        let chunks = chunk_text("doc", "short", 100, 10);
        assert!(check_batch(2, &chunks, &[vec![0.0, 1.0]]).is_ok());
        assert!(matches!(
            check_batch(2, &chunks, &[]),
            Err(Error::VectorIndex(_))
        ));
        assert!(matches!(
            check_batch(2, &chunks, &[vec![0.0]]),
            Err(Error::DimensionMismatch { .. })
        ));
    }
}
