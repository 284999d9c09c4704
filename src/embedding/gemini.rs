use anyhow::Result;
use async_trait::async_trait;
use nestie_core::embedding::{check_vectors, Embedder};
use nestie_core::error::{Error, Result as CoreResult, ServiceErrorKind};

use super::{require_api_key, require_dims, require_model};
use crate::config::EmbeddingConfig;
use crate::http;
use crate::retry::RetryPolicy;

const DEFAULT_URL: &str = "https://generativelanguage.googleapis.com/v1beta";

/// Most requests `batchEmbedContents` accepts in one call.
pub const MAX_BATCH_SIZE: usize = 100;

/// Google Generative Language embeddings.
///
/// Documents are embedded with task type `RETRIEVAL_DOCUMENT` and queries
/// with `RETRIEVAL_QUERY`.
pub struct GeminiEmbedder {
    model: String,
    dims: usize,
    api_key: String,
    base_url: String,
    client: reqwest::Client,
    retry: RetryPolicy,
}

impl GeminiEmbedder {
    pub fn new(config: &EmbeddingConfig) -> Result<Self> {
        let model = require_model(config, "gemini")?;
        // The API addresses models as `models/<id>`.
        let model = if model.starts_with("models/") {
            model
        } else {
            format!("models/{}", model)
        };
        Ok(Self {
            model,
            dims: require_dims(config, "gemini")?,
            api_key: require_api_key(config, "GOOGLE_API_KEY")?,
            base_url: config
                .url
                .clone()
                .unwrap_or_else(|| DEFAULT_URL.to_string()),
            client: http::client(config.timeout_secs)?,
            retry: RetryPolicy::from_config(&config.retry),
        })
    }

    async fn embed_with_task(&self, texts: &[String], task: &str) -> CoreResult<Vec<Vec<f32>>> {
        if texts.is_empty() {
            return Ok(Vec::new());
        }
        let requests: Vec<serde_json::Value> = texts
            .iter()
            .map(|t| {
                serde_json::json!({
                    "model": self.model,
                    "content": { "parts": [{ "text": t }] },
                    "taskType": task,
                })
            })
            .collect();
        let body = serde_json::json!({ "requests": requests });
        let url = format!("{}/{}:batchEmbedContents", self.base_url, self.model);

        let json = self
            .retry
            .run(
                |_| {
                    let request = self
                        .client
                        .post(&url)
                        .query(&[("key", self.api_key.as_str())])
                        .json(&body);
                    http::send_json(request, "Gemini", |kind, msg| Error::embedding(kind, msg))
                },
                Error::is_transient,
            )
            .await?;

        let vectors = parse_gemini_response(&json)?;
        check_vectors(texts.len(), self.dims, &vectors)?;
        Ok(vectors)
    }
}

#[async_trait]
impl Embedder for GeminiEmbedder {
    fn model_name(&self) -> &str {
        &self.model
    }

    fn dims(&self) -> usize {
        self.dims
    }

    async fn embed(&self, texts: &[String]) -> CoreResult<Vec<Vec<f32>>> {
        self.embed_with_task(texts, "RETRIEVAL_DOCUMENT").await
    }

    async fn embed_query(&self, text: &str) -> CoreResult<Vec<f32>> {
        let mut vectors = self
            .embed_with_task(&[text.to_string()], "RETRIEVAL_QUERY")
            .await?;
        vectors.pop().ok_or_else(|| {
            Error::embedding(ServiceErrorKind::MalformedResponse, "empty Gemini response")
        })
    }
}

/// Extract `embeddings[].values` in input order.
fn parse_gemini_response(json: &serde_json::Value) -> CoreResult<Vec<Vec<f32>>> {
    let malformed = |msg: &str| Error::embedding(ServiceErrorKind::MalformedResponse, msg);
    json.get("embeddings")
        .and_then(|e| e.as_array())
        .ok_or_else(|| malformed("Invalid Gemini response: missing embeddings array"))?
        .iter()
        .map(|item| {
            item.get("values")
                .and_then(http::parse_vector)
                .ok_or_else(|| malformed("Invalid Gemini response: missing values"))
        })
        .collect()
}
