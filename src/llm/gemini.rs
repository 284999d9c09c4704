use anyhow::Result;
use async_trait::async_trait;
use nestie_core::error::{Error, Result as CoreResult, ServiceErrorKind};

use super::{require_api_key, LanguageModel};
use crate::config::LlmConfig;
use crate::http;

const DEFAULT_URL: &str = "https://generativelanguage.googleapis.com/v1beta";

/// Google Gemini via `models/{model}:generateContent`.
pub struct GeminiModel {
    model: String,
    api_key: String,
    base_url: String,
    temperature: f32,
    max_output_tokens: u32,
    client: reqwest::Client,
}

impl GeminiModel {
    pub fn new(config: &LlmConfig) -> Result<Self> {
        Ok(Self {
            model: config.model.trim_start_matches("models/").to_string(),
            api_key: require_api_key(config, "GOOGLE_API_KEY")?,
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

#[async_trait]
impl LanguageModel for GeminiModel {
    fn model_name(&self) -> &str {
        &self.model
    }

    async fn complete(&self, prompt: &str) -> CoreResult<String> {
        let body = serde_json::json!({
            "contents": [{
                "role": "user",
                "parts": [{ "text": prompt }]
            }],
            "generationConfig": {
                "temperature": self.temperature,
                "maxOutputTokens": self.max_output_tokens,
            }
        });
        let request = self
            .client
            .post(format!(
                "{}/models/{}:generateContent",
                self.base_url, self.model
            ))
            .query(&[("key", self.api_key.as_str())])
            .json(&body);
        let json = http::send_json(request, "Gemini", |kind, msg| {
            Error::language_model(kind, msg)
        })
        .await?;
        parse_generate_response(&json)
    }
}

/// Join the text parts of the first candidate.
fn parse_generate_response(json: &serde_json::Value) -> CoreResult<String> {
    if let Some(reason) = json
        .pointer("/promptFeedback/blockReason")
        .and_then(|r| r.as_str())
    {
        return Err(Error::language_model(
            ServiceErrorKind::Rejected,
            format!("prompt blocked by Gemini: {}", reason),
        ));
    }

    let parts = json
        .pointer("/candidates/0/content/parts")
        .and_then(|p| p.as_array())
        .ok_or_else(|| {
            Error::language_model(
                ServiceErrorKind::MalformedResponse,
                "Invalid Gemini response: missing candidates[0].content.parts",
            )
        })?;

    let text: String = parts
        .iter()
        .filter_map(|p| p.get("text").and_then(|t| t.as_str()))
        .collect::<Vec<_>>()
        .join("");

    if text.trim().is_empty() {
        return Err(Error::language_model(
            ServiceErrorKind::MalformedResponse,
            "Gemini returned an empty reply",
        ));
    }
    Ok(text.trim().to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_parse_generate_response() {
        let json = json!({
            "candidates": [{
                "content": { "parts": [{ "text": "Hello " }, { "text": "there" }] }
            }]
        });
        assert_eq!(parse_generate_response(&json).unwrap(), "Hello there");
    }

    #[test]
    fn test_parse_blocked_prompt() {
        let json = json!({ "promptFeedback": { "blockReason": "SAFETY" } });
        assert!(matches!(
            parse_generate_response(&json),
            Err(Error::LanguageModel {
                kind: ServiceErrorKind::Rejected,
                ..
            })
        ));
    }

    #[test]
    fn test_parse_empty_reply() {
        let json = json!({ "candidates": [{ "content": { "parts": [{ "text": "  " }] } }] });
        assert!(matches!(
            parse_generate_response(&json),
            Err(Error::LanguageModel {
                kind: ServiceErrorKind::MalformedResponse,
                ..
            })
        ));
    }
}
