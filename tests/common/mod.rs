//! In-process fakes for the language model and the chat platform.

#![allow(dead_code)]

use std::sync::{Arc, Mutex};

use anyhow::{anyhow, Result};
use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use nestie::analysis::ChannelMessage;
use nestie::assistant::Assistant;
use nestie::config::{parse_config, Config};
use nestie::embedding::HashedEmbedder;
use nestie::generator::ResponseGenerator;
use nestie::ingest::ingest_document;
use nestie::llm::LanguageModel;
use nestie::platform::ChatPlatform;
use nestie::retrieval::{DocumentCatalog, Retriever};
use nestie_core::embedding::Embedder;
use nestie_core::error::{Error, Result as CoreResult, ServiceErrorKind};
use nestie_core::index::memory::InMemoryIndex;
use nestie_core::index::VectorIndex;
use nestie_core::models::Document;

pub const DIMS: usize = 256;

/// Replies according to a closure over the prompt and records every prompt.
pub struct FakeModel {
    reply: Box<dyn Fn(&str) -> CoreResult<String> + Send + Sync>,
    pub prompts: Mutex<Vec<String>>,
}

impl FakeModel {
    pub fn new(reply: impl Fn(&str) -> CoreResult<String> + Send + Sync + 'static) -> Arc<Self> {
        Arc::new(Self {
            reply: Box::new(reply),
            prompts: Mutex::new(Vec::new()),
        })
    }

    /// Answers document prompts with the retrieved context, everything
    /// else with a fixed chat line.
    pub fn echo_context() -> Arc<Self> {
        Self::new(|prompt| {
            Ok(match context_of(prompt) {
                Some(context) => context.to_string(),
                None => "Happy to chat!".to_string(),
            })
        })
    }

    pub fn always_unavailable() -> Arc<Self> {
        Self::new(|_| {
            Err(Error::language_model(
                ServiceErrorKind::ServiceUnavailable,
                "503 from upstream",
            ))
        })
    }

    pub fn calls(&self) -> usize {
        self.prompts.lock().unwrap().len()
    }

    pub fn last_prompt(&self) -> String {
        self.prompts.lock().unwrap().last().cloned().unwrap_or_default()
    }
}

#[async_trait]
impl LanguageModel for FakeModel {
    fn model_name(&self) -> &str {
        "fake"
    }

    async fn complete(&self, prompt: &str) -> CoreResult<String> {
        self.prompts.lock().unwrap().push(prompt.to_string());
        (self.reply)(prompt)
    }
}

/// An embedder whose provider is down; counts calls.
pub struct UnavailableEmbedder {
    pub calls: Mutex<usize>,
}

impl UnavailableEmbedder {
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            calls: Mutex::new(0),
        })
    }
}

#[async_trait]
impl Embedder for UnavailableEmbedder {
    fn model_name(&self) -> &str {
        "unavailable"
    }

    fn dims(&self) -> usize {
        DIMS
    }

    async fn embed(&self, _texts: &[String]) -> CoreResult<Vec<Vec<f32>>> {
        *self.calls.lock().unwrap() += 1;
        Err(Error::embedding(
            ServiceErrorKind::ServiceUnavailable,
            "503 from embedding provider",
        ))
    }
}

/// The `Context:` block of a document prompt.
pub fn context_of(prompt: &str) -> Option<&str> {
    let start = prompt.find("Context:\n")? + "Context:\n".len();
    let end = prompt[start..].find("\n\nQuestion:")? + start;
    Some(prompt[start..end].trim())
}

/// Serves canned channel history and records posted messages.
pub struct FakePlatform {
    pub messages: Vec<ChannelMessage>,
    pub fail_history: bool,
    pub history_requests: Mutex<Vec<(String, usize)>>,
    pub posted: Mutex<Vec<(String, String)>>,
}

impl FakePlatform {
    pub fn with_messages(messages: Vec<ChannelMessage>) -> Arc<Self> {
        Arc::new(Self {
            messages,
            fail_history: false,
            history_requests: Mutex::new(Vec::new()),
            posted: Mutex::new(Vec::new()),
        })
    }

    pub fn failing() -> Arc<Self> {
        Arc::new(Self {
            messages: Vec::new(),
            fail_history: true,
            history_requests: Mutex::new(Vec::new()),
            posted: Mutex::new(Vec::new()),
        })
    }
}

#[async_trait]
impl ChatPlatform for FakePlatform {
    async fn post_message(&self, channel: &str, text: &str) -> Result<()> {
        self.posted
            .lock()
            .unwrap()
            .push((channel.to_string(), text.to_string()));
        Ok(())
    }

    async fn channel_history(
        &self,
        channel: &str,
        _oldest: DateTime<Utc>,
        _latest: Option<DateTime<Utc>>,
        limit: usize,
    ) -> Result<Vec<ChannelMessage>> {
        self.history_requests
            .lock()
            .unwrap()
            .push((channel.to_string(), limit));
        if self.fail_history {
            return Err(anyhow!("channel_not_found"));
        }
        Ok(self.messages.iter().take(limit).cloned().collect())
    }
}

/// Messages a few minutes apart, starting one hour ago.
pub fn channel_messages(lines: &[(&str, &str)]) -> Vec<ChannelMessage> {
    let start = Utc::now() - Duration::hours(1);
    lines
        .iter()
        .enumerate()
        .map(|(i, (user, text))| ChannelMessage {
            user: user.to_string(),
            text: text.to_string(),
            timestamp: start + Duration::minutes(5 * i as i64),
        })
        .collect()
}

/// Defaults with millisecond backoff so retry tests stay fast.
pub fn test_config() -> Config {
    parse_config(
        r#"
[embedding]
provider = "hashed"
dims = 256

[llm.retry]
max_attempts = 3
backoff_base_ms = 1
backoff_max_ms = 4

[index]
backend = "memory"
"#,
    )
    .unwrap()
}

/// An in-memory index holding `docs` as `(name, text)`.
pub async fn index_with(docs: &[(&str, &str)]) -> Arc<InMemoryIndex> {
    let config = test_config();
    let embedder = HashedEmbedder::with_dims(DIMS);
    let index = Arc::new(InMemoryIndex::new(DIMS));
    for (name, text) in docs {
        let doc = Document::new(*name, format!("/srv/docs/{}.txt", name), "text/plain", *text);
        ingest_document(
            &doc,
            &config.chunking,
            config.embedding.batch_size,
            &embedder,
            index.as_ref(),
        )
        .await
        .unwrap();
    }
    index
}

/// A retriever over [`index_with`] `docs`.
pub async fn retriever_with(docs: &[(&str, &str)]) -> Retriever {
    let index: Arc<dyn VectorIndex> = index_with(docs).await;
    Retriever::new(
        Arc::new(HashedEmbedder::with_dims(DIMS)),
        index,
        DocumentCatalog::default(),
    )
    .unwrap()
}

pub async fn assistant_with(docs: &[(&str, &str)], model: Arc<FakeModel>) -> Assistant {
    let config = Arc::new(test_config());
    let generator = ResponseGenerator::new(model, &config);
    Assistant::new(config, retriever_with(docs).await, generator)
}

/// An assistant whose document index is populated but whose embedder
/// fails every query.
pub async fn assistant_with_embedder(
    docs: &[(&str, &str)],
    embedder: Arc<dyn Embedder>,
    model: Arc<FakeModel>,
) -> Assistant {
    let config = Arc::new(test_config());
    let index: Arc<dyn VectorIndex> = index_with(docs).await;
    let retriever = Retriever::new(embedder, index, DocumentCatalog::default()).unwrap();
    let generator = ResponseGenerator::new(model, &config);
    Assistant::new(config, retriever, generator)
}
