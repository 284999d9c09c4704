//! Embedding providers.
//!
//! Concrete [`Embedder`] implementations:
//! - **[`GeminiEmbedder`]**: Google `batchEmbedContents`, the default.
//! - **[`OpenAIEmbedder`]**: OpenAI `POST /v1/embeddings`.
//! - **[`OllamaEmbedder`]**: a local Ollama instance's `/api/embed`.
//! - **[`HashedEmbedder`]**: deterministic offline feature hashing; no network.
//! - **`LocalEmbedder`**: fastembed models run in-process (feature
//!   `local-embeddings-fastembed`).
//!
//! # Retry Strategy
//!
//! Network providers run every batch through the shared
//! [`RetryPolicy`](crate::retry::RetryPolicy):
//! - HTTP 429, 408 and 5xx, timeouts and network errors → retry
//! - HTTP 4xx (other) → fail immediately
//! - Backoff: 1s, 2s, 4s, 8s, 16s, 32s (capped at 2^5)

mod gemini;
mod hashed;
#[cfg(feature = "local-embeddings-fastembed")]
mod local;
mod ollama;
mod openai;

use std::sync::Arc;

use anyhow::{bail, Result};
use nestie_core::embedding::Embedder;

use crate::config::EmbeddingConfig;

pub use gemini::{GeminiEmbedder, MAX_BATCH_SIZE as GEMINI_MAX_BATCH_SIZE};
pub use hashed::HashedEmbedder;
#[cfg(feature = "local-embeddings-fastembed")]
pub use local::LocalEmbedder;
pub use ollama::OllamaEmbedder;
pub use openai::OpenAIEmbedder;

/// Create the configured [`Embedder`].
///
/// | Config Value | Provider |
/// |-------------|----------|
/// | `"gemini"` | [`GeminiEmbedder`] |
/// | `"openai"` | [`OpenAIEmbedder`] |
/// | `"ollama"` | [`OllamaEmbedder`] |
/// | `"hashed"` | [`HashedEmbedder`] |
/// | `"local"` | `LocalEmbedder` (requires `local-embeddings-fastembed`) |
pub fn create_embedder(config: &EmbeddingConfig) -> Result<Arc<dyn Embedder>> {
    match config.provider.as_str() {
        "gemini" => Ok(Arc::new(GeminiEmbedder::new(config)?)),
        "openai" => Ok(Arc::new(OpenAIEmbedder::new(config)?)),
        "ollama" => Ok(Arc::new(OllamaEmbedder::new(config)?)),
        "hashed" => Ok(Arc::new(HashedEmbedder::new(config)?)),
        #[cfg(feature = "local-embeddings-fastembed")]
        "local" => Ok(Arc::new(LocalEmbedder::new(config)?)),
        #[cfg(not(feature = "local-embeddings-fastembed"))]
        "local" => bail!("Local embedding provider requires --features local-embeddings-fastembed"),
        other => bail!("Unknown embedding provider: {}", other),
    }
}

fn require_model(config: &EmbeddingConfig, provider: &str) -> Result<String> {
    config
        .model
        .clone()
        .ok_or_else(|| anyhow::anyhow!("embedding.model required for {} provider", provider))
}

fn require_dims(config: &EmbeddingConfig, provider: &str) -> Result<usize> {
    match config.dims {
        Some(d) if d > 0 => Ok(d),
        _ => bail!("embedding.dims required for {} provider", provider),
    }
}

fn require_api_key(config: &EmbeddingConfig, var: &str) -> Result<String> {
    match config.api_key.as_deref().map(str::trim) {
        Some(key) if !key.is_empty() => Ok(key.to_string()),
        _ => bail!("embedding.api_key (or {}) not set", var),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config(provider: &str) -> EmbeddingConfig {
        EmbeddingConfig {
            provider: provider.to_string(),
            ..EmbeddingConfig::default()
        }
    }

    #[test]
    fn test_create_hashed() {
        let embedder = create_embedder(&EmbeddingConfig {
            dims: Some(32),
            ..config("hashed")
        })
        .unwrap();
        assert_eq!(embedder.dims(), 32);
        assert_eq!(embedder.model_name(), "hashed");
    }

    #[test]
    fn test_network_providers_need_keys() {
        assert!(create_embedder(&config("gemini")).is_err());
        assert!(create_embedder(&config("openai")).is_err());
        let gemini = create_embedder(&EmbeddingConfig {
            api_key: Some("k".to_string()),
            ..config("gemini")
        })
        .unwrap();
        assert_eq!(gemini.dims(), 768);
    }

    #[test]
    fn test_ollama_needs_no_key() {
        let embedder = create_embedder(&EmbeddingConfig {
            model: Some("nomic-embed-text".to_string()),
            ..config("ollama")
        })
        .unwrap();
        assert_eq!(embedder.model_name(), "nomic-embed-text");
    }

    #[test]
    fn test_unknown_provider() {
        assert!(create_embedder(&config("word2vec")).is_err());
    }
}
