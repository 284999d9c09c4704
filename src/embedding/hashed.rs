use anyhow::Result;
use async_trait::async_trait;
use nestie_core::embedding::Embedder;
use nestie_core::error::Result as CoreResult;
use sha2::{Digest, Sha256};

use super::require_dims;
use crate::config::EmbeddingConfig;

/// Deterministic bag-of-words embedder using the hashing trick.
///
/// Each lowercased alphanumeric token is hashed into one of `dims`
/// buckets with a ±1 sign, and the result is L2-normalized. Texts sharing
/// vocabulary land close together. Runs offline with no model download,
/// which makes it suitable for tests and air-gapped installs.
pub struct HashedEmbedder {
    dims: usize,
}

impl HashedEmbedder {
    pub fn new(config: &EmbeddingConfig) -> Result<Self> {
        Ok(Self::with_dims(require_dims(config, "hashed")?))
    }

    pub fn with_dims(dims: usize) -> Self {
        Self { dims: dims.max(1) }
    }

    pub fn embed_one(&self, text: &str) -> Vec<f32> {
        let mut vector = vec![0.0f32; self.dims];
        for token in tokens(text) {
            let digest = Sha256::digest(token.as_bytes());
            let mut bucket_bytes = [0u8; 8];
            bucket_bytes.copy_from_slice(&digest[..8]);
            let bucket = (u64::from_le_bytes(bucket_bytes) % self.dims as u64) as usize;
            let sign = if digest[8] & 1 == 0 { 1.0 } else { -1.0 };
            vector[bucket] += sign;
        }
        let norm = vector.iter().map(|x| x * x).sum::<f32>().sqrt();
        if norm > f32::EPSILON {
            for x in &mut vector {
                *x /= norm;
            }
        }
        vector
    }
}

fn tokens(text: &str) -> impl Iterator<Item = String> + '_ {
    text.split(|c: char| !c.is_alphanumeric())
        .filter(|t| !t.is_empty())
        .map(str::to_lowercase)
}

#[async_trait]
impl Embedder for HashedEmbedder {
    fn model_name(&self) -> &str {
        "hashed"
    }

    fn dims(&self) -> usize {
        self.dims
    }

    async fn embed(&self, texts: &[String]) -> CoreResult<Vec<Vec<f32>>> {
        Ok(texts.iter().map(|t| self.embed_one(t)).collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use nestie_core::embedding::cosine_similarity;

    #[test]
    fn test_deterministic_and_normalized() {
        let embedder = HashedEmbedder::with_dims(64);
        let a = embedder.embed_one("The Wi-Fi password is Blueberry42");
        assert_eq!(a, embedder.embed_one("The Wi-Fi password is Blueberry42"));
        let norm: f32 = a.iter().map(|x| x * x).sum::<f32>().sqrt();
        assert!((norm - 1.0).abs() < 1e-5);
    }

    #[test]
    fn test_shared_vocabulary_scores_higher() {
        let embedder = HashedEmbedder::with_dims(256);
        let query = embedder.embed_one("what is the wifi password");
        let related = embedder.embed_one("Office WiFi password: Blueberry42");
        let unrelated = embedder.embed_one("Quarterly revenue grew in Europe");
        assert!(cosine_similarity(&query, &related) > cosine_similarity(&query, &unrelated));
    }

    #[test]
    fn test_empty_text_is_zero_vector() {
        let embedder = HashedEmbedder::with_dims(8);
        assert!(embedder.embed_one("  ... ").iter().all(|x| *x == 0.0));
    }
}
