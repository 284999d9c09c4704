use anyhow::Result;
use async_trait::async_trait;
use nestie_core::error::{Error, Result as CoreResult, ServiceErrorKind};
use serde::{Deserialize, Serialize};

use super::{require_api_key, LanguageModel};
use crate::config::LlmConfig;
use crate::http;

const DEFAULT_URL: &str = "https://api.openai.com/v1";

/// OpenAI-compatible `chat/completions` endpoint.
pub struct OpenAIModel {
    model: String,
    api_key: String,
    base_url: String,
    temperature: f32,
    max_output_tokens: u32,
    client: reqwest::Client,
}

impl OpenAIModel {
    pub fn new(config: &LlmConfig) -> Result<Self> {
        Ok(Self {
            model: config.model.clone(),
            api_key: require_api_key(config, "OPENAI_API_KEY")?,
            base_url: config
                .url
                .clone()
                .unwrap_or_else(|| DEFAULT_URL.to_string()),
            temperature: config.temperature,
            max_output_tokens: config.max_output_tokens,
            client: http::client(config.timeout_secs)?,
        })
    }
}

#[derive(Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    temperature: f32,
    max_tokens: u32,
    messages: Vec<ChatMessage<'a>>,
}

#[derive(Serialize)]
struct ChatMessage<'a> {
    role: &'a str,
    content: &'a str,
}

#[derive(Deserialize)]
struct ChatResponse {
    choices: Vec<ChatChoice>,
}

#[derive(Deserialize)]
struct ChatChoice {
    message: ChatChoiceMessage,
}

#[derive(Deserialize)]
struct ChatChoiceMessage {
    #[serde(default)]
    content: Option<String>,
}

#[async_trait]
impl LanguageModel for OpenAIModel {
    fn model_name(&self) -> &str {
        &self.model
    }

    async fn complete(&self, prompt: &str) -> CoreResult<String> {
        let body = ChatRequest {
            model: &self.model,
            temperature: self.temperature,
            max_tokens: self.max_output_tokens,
            messages: vec![ChatMessage {
                role: "user",
                content: prompt,
            }],
        };
        let request = self
            .client
            .post(format!("{}/chat/completions", self.base_url))
            .bearer_auth(&self.api_key)
            .json(&body);
        let json = http::send_json(request, "OpenAI", |kind, msg| {
            Error::language_model(kind, msg)
        })
        .await?;
        parse_chat_response(json)
    }
}

fn parse_chat_response(json: serde_json::Value) -> CoreResult<String> {
    let parsed: ChatResponse = serde_json::from_value(json).map_err(|e| {
        Error::language_model(
            ServiceErrorKind::MalformedResponse,
            format!("Invalid OpenAI response: {}", e),
        )
    })?;
    parsed
        .choices
        .into_iter()
        .find_map(|choice| choice.message.content)
        .map(|content| content.trim().to_string())
        .filter(|content| !content.is_empty())
        .ok_or_else(|| {
            Error::language_model(
                ServiceErrorKind::MalformedResponse,
                "OpenAI returned an empty reply",
            )
        })
}
