use anyhow::Result;
use async_trait::async_trait;
use nestie_core::embedding::{check_vectors, Embedder};
use nestie_core::error::{Error, Result as CoreResult, ServiceErrorKind};

use super::{require_api_key, require_dims, require_model};
use crate::config::EmbeddingConfig;
use crate::http;
use crate::retry::RetryPolicy;

const DEFAULT_URL: &str = "https://api.openai.com/v1";

/// Embeddings from the OpenAI `POST /v1/embeddings` endpoint.
///
/// Batches are sent in one request; the response is reordered by its
/// `index` field before returning.
pub struct OpenAIEmbedder {
    model: String,
    dims: usize,
    api_key: String,
    base_url: String,
    client: reqwest::Client,
    retry: RetryPolicy,
}

impl OpenAIEmbedder {
    pub fn new(config: &EmbeddingConfig) -> Result<Self> {
        Ok(Self {
            model: require_model(config, "openai")?,
            dims: require_dims(config, "openai")?,
            api_key: require_api_key(config, "OPENAI_API_KEY")?,
            base_url: config
                .url
                .clone()
                .unwrap_or_else(|| DEFAULT_URL.to_string()),
            client: http::client(config.timeout_secs)?,
            retry: RetryPolicy::from_config(&config.retry),
        })
    }
}

#[async_trait]
impl Embedder for OpenAIEmbedder {
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
        let url = format!("{}/embeddings", self.base_url);

        let json = self
            .retry
            .run(
                |_| {
                    let request = self
                        .client
                        .post(&url)
                        .bearer_auth(&self.api_key)
                        .json(&body);
                    http::send_json(request, "OpenAI", |kind, msg| Error::embedding(kind, msg))
                },
                Error::is_transient,
            )
            .await?;

        let vectors = parse_openai_response(&json)?;
        check_vectors(texts.len(), self.dims, &vectors)?;
        Ok(vectors)
    }
}

/// Extract `data[].embedding`, ordered by `data[].index`.
fn parse_openai_response(json: &serde_json::Value) -> CoreResult<Vec<Vec<f32>>> {
    let malformed = |msg: &str| Error::embedding(ServiceErrorKind::MalformedResponse, msg);
    let data = json
        .get("data")
        .and_then(|d| d.as_array())
        .ok_or_else(|| malformed("Invalid OpenAI response: missing data array"))?;

    let mut indexed = Vec::with_capacity(data.len());
    for (position, item) in data.iter().enumerate() {
        let index = item
            .get("index")
            .and_then(|i| i.as_u64())
            .map(|i| i as usize)
            .unwrap_or(position);
        let vector = item
            .get("embedding")
            .and_then(http::parse_vector)
            .ok_or_else(|| malformed("Invalid OpenAI response: missing embedding"))?;
        indexed.push((index, vector));
    }
    indexed.sort_by_key(|(index, _)| *index);
    Ok(indexed.into_iter().map(|(_, v)| v).collect())
}
