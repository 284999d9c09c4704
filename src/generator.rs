//! Reply generation with retry and fallback.
//!
//! [`ResponseGenerator::generate`] builds the prompt for a
//! [`GenerationRequest`], calls the language model through the retry
//! policy, and always returns text: either the model's reply
//! ([`Outcome::Replied`]) or the configured fallback message
//! ([`Outcome::Failed`]). Raw service errors are logged, never returned
//! to users.

use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;

use chrono::Local;
use nestie_core::error::Error;

use crate::analysis::{format_transcript, ChannelMessage, TimeWindow};
use crate::config::{Config, LlmConfig};
use crate::history::Turn;
use crate::llm::LanguageModel;
use crate::prompt;
use crate::retrieval::RetrievedChunk;
use crate::retry::RetryPolicy;

#[derive(Debug, Clone, Copy)]
pub enum GenerationRequest<'a> {
    /// Answer from retrieved context. An empty context falls back to the
    /// conversational prompt.
    Answer {
        question: &'a str,
        context: &'a [RetrievedChunk],
        history: &'a [Turn],
    },
    Chat {
        message: &'a str,
        history: &'a [Turn],
    },
    /// Summarize channel messages (oldest first).
    Analyze {
        instruction: &'a str,
        messages: &'a [ChannelMessage],
        window: TimeWindow,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    Replied,
    Failed,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Generation {
    pub text: String,
    pub outcome: Outcome,
    /// Language-model calls made, including the successful one.
    pub attempts: u32,
}

impl Generation {
    pub fn failed(&self) -> bool {
        self.outcome == Outcome::Failed
    }
}

pub struct ResponseGenerator {
    model: Arc<dyn LanguageModel>,
    retry: RetryPolicy,
    fallback_message: String,
    bot_name: String,
    analysis_char_budget: usize,
}

impl ResponseGenerator {
    pub fn new(model: Arc<dyn LanguageModel>, config: &Config) -> Self {
        Self::with_retry(model, &config.llm, RetryPolicy::from_config(&config.llm.retry))
            .bot_name(&config.slack.bot_name)
            .analysis_char_budget(config.conversation.analysis_char_budget)
    }

    pub fn with_retry(model: Arc<dyn LanguageModel>, llm: &LlmConfig, retry: RetryPolicy) -> Self {
        Self {
            model,
            retry,
            fallback_message: llm.fallback_message.clone(),
            bot_name: "Nestie".to_string(),
            analysis_char_budget: 8000,
        }
    }

    pub fn bot_name(mut self, name: &str) -> Self {
        self.bot_name = name.to_string();
        self
    }

    pub fn analysis_char_budget(mut self, budget: usize) -> Self {
        self.analysis_char_budget = budget;
        self
    }

    pub fn fallback_message(&self) -> &str {
        &self.fallback_message
    }

    pub fn prompt_for(&self, request: &GenerationRequest<'_>) -> String {
        match *request {
            GenerationRequest::Answer {
                question,
                context,
                history,
            } if !context.is_empty() => prompt::document_prompt(question, context, history),
            GenerationRequest::Answer {
                question, history, ..
            } => prompt::chat_prompt(&self.bot_name, question, history),
            GenerationRequest::Chat { message, history } => {
                prompt::chat_prompt(&self.bot_name, message, history)
            }
            GenerationRequest::Analyze {
                instruction,
                messages,
                window,
            } => {
                let transcript = format_transcript(messages, &Local, self.analysis_char_budget);
                prompt::analysis_prompt(instruction, &transcript, window)
            }
        }
    }

    pub async fn generate(&self, request: GenerationRequest<'_>) -> Generation {
        let prompt = self.prompt_for(&request);
        let attempts = AtomicU32::new(0);

        let result = self
            .retry
            .run(
                |attempt| {
                    attempts.store(attempt, Ordering::SeqCst);
                    self.model.complete(&prompt)
                },
                Error::is_transient,
            )
            .await;
        let attempts = attempts.load(Ordering::SeqCst);

        match result {
            Ok(reply) => {
                tracing::debug!(attempts, model = self.model.model_name(), "generated reply");
                let text = match request {
                    GenerationRequest::Answer { context, .. } => with_sources(reply, context),
                    _ => reply,
                };
                Generation {
                    text,
                    outcome: Outcome::Replied,
                    attempts,
                }
            }
            Err(e) => {
                tracing::error!(attempts, error = %e, "language model failed; sending fallback");
                Generation {
                    text: self.fallback_message.clone(),
                    outcome: Outcome::Failed,
                    attempts,
                }
            }
        }
    }
}

/// Whether a document-backed reply says the context had no answer.
pub fn reports_no_information(reply: &str) -> bool {
    let lower = reply.to_lowercase();
    lower.contains("don't find relevant information")
        || lower.contains("don't find any relevant information")
}

/// Append `_Sources: A, B_` naming each cited document once.
fn with_sources(reply: String, context: &[RetrievedChunk]) -> String {
    if context.is_empty() || reports_no_information(&reply) {
        return reply;
    }
    let mut names: Vec<&str> = Vec::new();
    for c in context {
        if !names.contains(&c.document.name.as_str()) {
            names.push(&c.document.name);
        }
    }
    format!("{}\n\n_Sources: {}_", reply, names.join(", "))
}
