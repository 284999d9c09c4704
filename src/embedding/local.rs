use std::sync::{Arc, Mutex};

use anyhow::{bail, Result};
use async_trait::async_trait;
use nestie_core::embedding::{check_vectors, Embedder};
use nestie_core::error::{Error, Result as CoreResult, ServiceErrorKind};

use crate::config::EmbeddingConfig;

/// In-process embeddings via fastembed.
///
/// The model is downloaded from Hugging Face on first use and cached.
/// After that no network calls are made.
pub struct LocalEmbedder {
    model_name: String,
    model: fastembed::EmbeddingModel,
    dims: usize,
    batch_size: usize,
    engine: Arc<Mutex<Option<fastembed::TextEmbedding>>>,
}

impl LocalEmbedder {
    pub fn new(config: &EmbeddingConfig) -> Result<Self> {
        let model_name = config
            .model
            .clone()
            .unwrap_or_else(|| "all-minilm-l6-v2".to_string());
        let (model, default_dims) = fastembed_model(&model_name)?;
        Ok(Self {
            model_name,
            model,
            dims: config.dims.unwrap_or(default_dims),
            batch_size: config.batch_size,
            engine: Arc::new(Mutex::new(None)),
        })
    }
}

fn fastembed_model(name: &str) -> Result<(fastembed::EmbeddingModel, usize)> {
    use fastembed::EmbeddingModel::*;
    match name {
        "all-minilm-l6-v2" => Ok((AllMiniLML6V2, 384)),
        "bge-small-en-v1.5" => Ok((BGESmallENV15, 384)),
        "bge-base-en-v1.5" => Ok((BGEBaseENV15, 768)),
        "bge-large-en-v1.5" => Ok((BGELargeENV15, 1024)),
        "nomic-embed-text-v1.5" => Ok((NomicEmbedTextV15, 768)),
        "multilingual-e5-small" => Ok((MultilingualE5Small, 384)),
        "multilingual-e5-base" => Ok((MultilingualE5Base, 768)),
        other => bail!(
            "Unknown local embedding model: '{}'. Supported models: \
             all-minilm-l6-v2, bge-small-en-v1.5, bge-base-en-v1.5, bge-large-en-v1.5, \
             nomic-embed-text-v1.5, multilingual-e5-small, multilingual-e5-base",
            other
        ),
    }
}

#[async_trait]
impl Embedder for LocalEmbedder {
    fn model_name(&self) -> &str {
        &self.model_name
    }

    fn dims(&self) -> usize {
        self.dims
    }

    async fn embed(&self, texts: &[String]) -> CoreResult<Vec<Vec<f32>>> {
        if texts.is_empty() {
            return Ok(Vec::new());
        }
        let engine = Arc::clone(&self.engine);
        let model = self.model.clone();
        let batch_size = self.batch_size;
        let inputs = texts.to_vec();
        let failed = |msg: String| Error::embedding(ServiceErrorKind::ServiceUnavailable, msg);

        let vectors = tokio::task::spawn_blocking(move || {
            let mut guard = engine
                .lock()
                .map_err(|_| "local embedding engine lock poisoned".to_string())?;
            if guard.is_none() {
                let created = fastembed::TextEmbedding::try_new(
                    fastembed::InitOptions::new(model).with_show_download_progress(false),
                )
                .map_err(|e| format!("Failed to initialize local embedding model: {}", e))?;
                *guard = Some(created);
            }
            match guard.as_mut() {
                Some(embedding) => embedding
                    .embed(inputs, Some(batch_size))
                    .map_err(|e| format!("Local embedding failed: {}", e)),
                None => Err("local embedding engine missing".to_string()),
            }
        })
        .await
        .map_err(|e| failed(format!("embedding task panicked: {}", e)))?
        .map_err(failed)?;

        check_vectors(texts.len(), self.dims, &vectors)?;
        Ok(vectors)
    }
}
