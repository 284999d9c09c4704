//! Language-model providers.
//!
//! A [`LanguageModel`] turns one fully assembled prompt into one reply.
//! Providers make a single attempt per call; the
//! [`ResponseGenerator`](crate::generator::ResponseGenerator) owns retry
//! and fallback.

mod gemini;
mod openai;

use std::sync::Arc;

use anyhow::{bail, Result};
use async_trait::async_trait;
use nestie_core::error::Result as CoreResult;

use crate::config::LlmConfig;

pub use gemini::GeminiModel;
pub use openai::OpenAIModel;

/// Text-completion backend.
///
/// Failures are reported as
/// [`Error::LanguageModel`](nestie_core::error::Error::LanguageModel) with a
/// [`ServiceErrorKind`](nestie_core::error::ServiceErrorKind) the retry
/// policy can inspect.
#[async_trait]
pub trait LanguageModel: Send + Sync {
    fn model_name(&self) -> &str;

    async fn complete(&self, prompt: &str) -> CoreResult<String>;
}

/// Create the configured [`LanguageModel`].
///
/// | Config Value | Provider |
/// |-------------|----------|
/// | `"gemini"` | [`GeminiModel`] (`generateContent`) |
/// | `"openai"` | [`OpenAIModel`] (`chat/completions`) |
pub fn create_language_model(config: &LlmConfig) -> Result<Arc<dyn LanguageModel>> {
    match config.provider.as_str() {
        "gemini" => Ok(Arc::new(GeminiModel::new(config)?)),
        "openai" => Ok(Arc::new(OpenAIModel::new(config)?)),
        other => bail!("Unknown llm provider: {}", other),
    }
}

fn require_api_key(config: &LlmConfig, var: &str) -> Result<String> {
    match config.api_key.as_deref().map(str::trim) {
        Some(key) if !key.is_empty() => Ok(key.to_string()),
        _ => bail!("llm.api_key (or {}) not set", var),
    }
}
