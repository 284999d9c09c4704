use anyhow::Result;
use async_trait::async_trait;
use nestie_core::embedding::{check_vectors, Embedder};
use nestie_core::error::{Error, Result as CoreResult, ServiceErrorKind};

use super::{require_dims, require_model};
use crate::config::EmbeddingConfig;
use crate::http;
use crate::retry::RetryPolicy;

/// Embeddings from a local Ollama instance.
///
/// Calls `POST /api/embed` on the configured URL (default:
/// `http://localhost:11434`). The model must already be pulled
/// (e.g. `ollama pull nomic-embed-text`).
pub struct OllamaEmbedder {
    model: String,
    dims: usize,
    url: String,
    client: reqwest::Client,
    retry: RetryPolicy,
}

impl OllamaEmbedder {
    pub fn new(config: &EmbeddingConfig) -> Result<Self> {
        Ok(Self {
            model: require_model(config, "ollama")?,
            dims: require_dims(config, "ollama")?,
            url: config
                .url
                .clone()
                .unwrap_or_else(|| "http://localhost:11434".to_string()),
            client: http::client(config.timeout_secs)?,
            retry: RetryPolicy::from_config(&config.retry),
        })
    }
}

#[async_trait]
impl Embedder for OllamaEmbedder {
    fn model_name(&self) -> &str {
        &self.model
    }

    fn dims(&self) -> usize {
        self.dims
    }

    async fn embed(&self, texts: &[String]) -> CoreResult<Vec<Vec<f32>>> {
        if texts.is_empty() {
            return Ok(Vec::new());
        }
        let body = serde_json::json!({
            "model": self.model,
            "input": texts,
        });
        let endpoint = format!("{}/api/embed", self.url);
        let service = format!("Ollama at {}", self.url);

        let json = self
            .retry
            .run(
                |_| {
                    let request = self.client.post(&endpoint).json(&body);
                    http::send_json(request, &service, |kind, msg| Error::embedding(kind, msg))
                },
                Error::is_transient,
            )
            .await?;

        let vectors = parse_ollama_response(&json)?;
        check_vectors(texts.len(), self.dims, &vectors)?;
        Ok(vectors)
    }
}

fn parse_ollama_response(json: &serde_json::Value) -> CoreResult<Vec<Vec<f32>>> {
    let malformed = |msg: &str| Error::embedding(ServiceErrorKind::MalformedResponse, msg);
    json.get("embeddings")
        .and_then(|e| e.as_array())
        .ok_or_else(|| malformed("Invalid Ollama response: missing embeddings array"))?
        .iter()
        .map(|e| {
            http::parse_vector(e)
                .ok_or_else(|| malformed("Invalid Ollama response: embedding is not an array"))
        })
        .collect()
}
