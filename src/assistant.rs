//! Per-request orchestration.
//!
//! Every request walks the same states:
//!
//! ```text
//! Received → Classifying → Retrieving (document Q&A, mixed) → Generating → Replied | Failed
//! ```
//!
//! Transitions are logged at debug level inside a span carrying a random
//! request id. The finished turn is appended to the conversation history
//! whether or not generation succeeded.

use std::fmt;
use std::sync::Arc;

use chrono::{Local, Utc};
use tracing::Instrument;
use uuid::Uuid;

use crate::analysis::{
    activity_stats, format_activity, format_summary, AnalysisMode, ChannelCommand,
    NO_MESSAGES_REPLY,
};
use crate::classify::{Classifier, ClassifyContext, KeywordClassifier, QueryKind, RequestKind};
use crate::config::Config;
use crate::generator::{reports_no_information, Generation, GenerationRequest, Outcome, ResponseGenerator};
use crate::history::{ConversationHistory, ConversationKey, Turn};
use crate::platform::ChatPlatform;
use crate::retrieval::Retriever;

pub const EMPTY_INPUT_REPLY: &str =
    "Please ask me something! I can help with documents or just chat.";
pub const REPHRASE_REPLY: &str =
    "🤔 Please try rephrasing your question so that I can understand you better.";
pub const CHANNEL_ERROR_REPLY: &str = "😅 Sorry, I encountered an error processing the channel command. Please try again or contact support.";
pub const NO_PLATFORM_REPLY: &str =
    "Channel analysis is only available when I'm connected to Slack.";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RequestState {
    Received,
    Classifying,
    Retrieving,
    Generating,
    Replied,
    Failed,
}

impl fmt::Display for RequestState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            RequestState::Received => "received",
            RequestState::Classifying => "classifying",
            RequestState::Retrieving => "retrieving",
            RequestState::Generating => "generating",
            RequestState::Replied => "replied",
            RequestState::Failed => "failed",
        };
        f.write_str(s)
    }
}

/// One incoming message, already stripped of any bot mention.
#[derive(Debug, Clone)]
pub struct Request {
    pub channel: String,
    pub user: String,
    pub text: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Reply {
    pub text: String,
    pub kind: QueryKind,
    pub state: RequestState,
}

struct Tracker {
    state: RequestState,
}

impl Tracker {
    fn new() -> Self {
        tracing::debug!(state = %RequestState::Received, "request state");
        Self {
            state: RequestState::Received,
        }
    }

    fn advance(&mut self, next: RequestState) {
        tracing::debug!(from = %self.state, to = %next, "request state");
        self.state = next;
    }

    fn finish(&mut self, generation: &Generation) {
        self.advance(match generation.outcome {
            Outcome::Replied => RequestState::Replied,
            Outcome::Failed => RequestState::Failed,
        });
    }
}

pub struct Assistant {
    config: Arc<Config>,
    classifier: Box<dyn Classifier>,
    retriever: Retriever,
    generator: ResponseGenerator,
    history: ConversationHistory,
    platform: Option<Arc<dyn ChatPlatform>>,
}

impl Assistant {
    pub fn new(config: Arc<Config>, retriever: Retriever, generator: ResponseGenerator) -> Self {
        let history = ConversationHistory::new(
            config.conversation.max_history,
            config.conversation.max_conversations,
        );
        Self {
            config,
            classifier: Box::new(KeywordClassifier::new()),
            retriever,
            generator,
            history,
            platform: None,
        }
    }

    pub fn with_classifier(mut self, classifier: Box<dyn Classifier>) -> Self {
        self.classifier = classifier;
        self
    }

    pub fn with_platform(mut self, platform: Arc<dyn ChatPlatform>) -> Self {
        self.platform = Some(platform);
        self
    }

    pub fn history(&self) -> &ConversationHistory {
        &self.history
    }

    pub fn retriever(&self) -> &Retriever {
        &self.retriever
    }

    /// Handle one request end to end. Never fails: errors become replies.
    pub async fn handle(&self, request: &Request) -> Reply {
        let span = tracing::info_span!(
            "request",
            id = %Uuid::new_v4(),
            channel = %request.channel,
            user = %request.user
        );
        self.handle_inner(request).instrument(span).await
    }

    async fn handle_inner(&self, request: &Request) -> Reply {
        let mut tracker = Tracker::new();
        let text = request.text.trim();
        if text.is_empty() {
            tracker.advance(RequestState::Replied);
            return Reply {
                text: EMPTY_INPUT_REPLY.to_string(),
                kind: QueryKind::Chitchat,
                state: tracker.state,
            };
        }

        let key = ConversationKey::new(&request.channel, &request.user);
        let document_names = self.document_names().await;

        tracker.advance(RequestState::Classifying);
        let kind = self.classifier.classify(
            text,
            &ClassifyContext {
                last_kind: self.history.last_kind(&key),
                document_names: &document_names,
            },
        );
        tracing::info!(kind = kind.query_kind().as_str(), "classified request");

        let recent = self
            .history
            .recent(&key, self.config.conversation.history_in_prompt);

        let reply_text = match &kind {
            RequestKind::ChannelAnalysis(command) => {
                self.analyze_channel(&mut tracker, command, &request.channel, text)
                    .await
            }
            RequestKind::DocumentQa => self.answer_from_documents(&mut tracker, text, &recent).await,
            RequestKind::Mixed => {
                self.answer_mixed(&mut tracker, text, &recent, &document_names)
                    .await
            }
            RequestKind::Chitchat => {
                tracker.advance(RequestState::Generating);
                let generation = self
                    .generator
                    .generate(GenerationRequest::Chat {
                        message: text,
                        history: &recent,
                    })
                    .await;
                tracker.finish(&generation);
                generation.text
            }
        };

        let mut turn = Turn::new(text, reply_text.clone(), kind.query_kind());
        turn.failed = tracker.state == RequestState::Failed;
        self.history.append(&key, turn);

        Reply {
            text: reply_text,
            kind: kind.query_kind(),
            state: tracker.state,
        }
    }

    async fn document_names(&self) -> Vec<String> {
        match self.retriever.document_names().await {
            Ok(names) => names,
            Err(e) => {
                tracing::warn!(error = %e, "could not list indexed documents");
                self.retriever.catalog().names()
            }
        }
    }

    async fn answer_from_documents(&self, tracker: &mut Tracker, text: &str, recent: &[Turn]) -> String {
        tracker.advance(RequestState::Retrieving);
        let context = match self
            .retriever
            .retrieve(text, self.config.retrieval.top_k)
            .await
        {
            Ok(context) => context,
            Err(e) => {
                tracing::error!(error = %e, "retrieval failed");
                tracker.advance(RequestState::Failed);
                return self.generator.fallback_message().to_string();
            }
        };

        tracker.advance(RequestState::Generating);
        let generation = self
            .generator
            .generate(GenerationRequest::Answer {
                question: text,
                context: &context,
                history: recent,
            })
            .await;
        tracker.finish(&generation);

        if !generation.failed() && reports_no_information(&generation.text) {
            return REPHRASE_REPLY.to_string();
        }
        generation.text
    }

    async fn answer_mixed(
        &self,
        tracker: &mut Tracker,
        text: &str,
        recent: &[Turn],
        document_names: &[String],
    ) -> String {
        tracker.advance(RequestState::Retrieving);
        let context = match self
            .retriever
            .retrieve(text, self.config.retrieval.top_k)
            .await
        {
            Ok(context) => context,
            Err(e) => {
                tracing::warn!(error = %e, "retrieval failed; answering conversationally");
                Vec::new()
            }
        };

        tracker.advance(RequestState::Generating);
        if !context.is_empty() {
            let generation = self
                .generator
                .generate(GenerationRequest::Answer {
                    question: text,
                    context: &context,
                    history: recent,
                })
                .await;
            if generation.failed() || !reports_no_information(&generation.text) {
                tracker.finish(&generation);
                return generation.text;
            }
        }

        let generation = self
            .generator
            .generate(GenerationRequest::Chat {
                message: text,
                history: recent,
            })
            .await;
        tracker.finish(&generation);
        if generation.failed() || document_names.is_empty() {
            return generation.text;
        }
        format!(
            "{}\n\n💡 _If you're looking for specific information, try asking about: {}_",
            generation.text,
            document_names.join(", ")
        )
    }

    async fn analyze_channel(
        &self,
        tracker: &mut Tracker,
        command: &ChannelCommand,
        current_channel: &str,
        instruction: &str,
    ) -> String {
        let Some(platform) = &self.platform else {
            tracker.advance(RequestState::Replied);
            return NO_PLATFORM_REPLY.to_string();
        };

        let channel = command.channel_id(current_channel);
        let (oldest, latest) = command.window.bounds(&Local::now());
        tracing::info!(channel, window = command.window.label(), "analyzing channel");

        let messages = match platform
            .channel_history(
                channel,
                oldest,
                latest,
                self.config.conversation.max_channel_messages,
            )
            .await
        {
            Ok(messages) => messages,
            Err(e) => {
                tracing::error!(channel, error = %e, "could not read channel history");
                tracker.advance(RequestState::Failed);
                return CHANNEL_ERROR_REPLY.to_string();
            }
        };

        if messages.is_empty() {
            tracker.advance(RequestState::Replied);
            return NO_MESSAGES_REPLY.to_string();
        }

        match command.mode {
            AnalysisMode::Activity => {
                tracker.advance(RequestState::Replied);
                match activity_stats(&messages, &Local) {
                    Some(stats) => format_activity(&stats, command.window),
                    None => NO_MESSAGES_REPLY.to_string(),
                }
            }
            AnalysisMode::Summarize => {
                tracker.advance(RequestState::Generating);
                let generation = self
                    .generator
                    .generate(GenerationRequest::Analyze {
                        instruction,
                        messages: &messages,
                        window: command.window,
                    })
                    .await;
                tracker.finish(&generation);
                if generation.failed() {
                    generation.text
                } else {
                    format_summary(&generation.text, command.window, messages.len())
                }
            }
        }
    }

    pub fn hello_text(&self, user: &str) -> String {
        format!(
            "Hello <@{}> :wave:! I'm {} - your assistant and companion at work. Ask me anything about our company!",
            user, self.config.slack.bot_name
        )
    }

    pub fn help_text(&self) -> String {
        format!(
            "🤖 *{} Help*

I can answer questions about the company internal documents and channels, and talk with you as a friend too. Here are some examples:

• \"Tell me about our company policies\"
• \"What are the core values in our company culture?\"
• \"Summarize #channel-name today\"

📝 *Available Commands:*
• `hello` - Say hi
• `help` - Show this help
• `status` - Check system status
• `summarize #channel-name` - Get a summary of recent content
• `what's happening in #channel-name today?` - Recent activity overview
• `/nestie your question` - Ask from any channel
• Just ask any question naturally!

⌛ *Time Filters for asking about channels:*
• today, yesterday, last week, last month

💡 *Tips:*
• Be specific in your questions
• I'll show you which documents I found the information in
• If I can't find something, try rephrasing your question",
            self.config.slack.bot_name
        )
    }

    pub async fn status_text(&self) -> String {
        let names = self.document_names().await;
        match self.retriever.index().len().await {
            Ok(chunks) => format!(
                "📊 *System Status*\n\n✅ Status: Ready\n📚 Documents loaded: {}\n📄 Available documents: {}\n🧩 Indexed chunks: {}\n🕒 Checked at: {}\n\nReady to answer your questions!",
                names.len(),
                if names.is_empty() { "none".to_string() } else { names.join(", ") },
                chunks,
                Utc::now().format("%Y-%m-%d %H:%M UTC")
            ),
            Err(e) => {
                tracing::error!(error = %e, "status check failed");
                "📊 *System Status*\n\n❌ Status: Not Ready\nThe document system is currently unavailable. Please contact an admin.".to_string()
            }
        }
    }
}
