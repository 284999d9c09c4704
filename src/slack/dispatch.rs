//! Event dispatch table.
//!
//! The Socket Mode loop hands each [`IncomingEvent`] to
//! [`Dispatcher::dispatch`], which looks up the handler registered for its
//! [`EventKind`] and posts whatever reply the handler produces. Handler
//! and posting failures are logged; they never reach the event loop.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;

use super::events::{EventKind, IncomingEvent};
use crate::assistant::{Assistant, Request};
use crate::platform::ChatPlatform;

pub const MENTION_GREETING: &str = "👋 Hi, you can ask me any question!";

pub const SLASH_USAGE: &str =
    "Hi! You can ask me questions using the slash command. For example: `/nestie what are our working hours?`";

#[async_trait]
pub trait Handler: Send + Sync {
    /// The reply to post in the event's channel, if any.
    async fn handle(&self, event: &IncomingEvent) -> Option<String>;
}

/// Built-in text commands, matched on the whole message.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Command {
    Hello,
    Help,
    Status,
}

impl Command {
    pub fn parse(text: &str) -> Option<Self> {
        let word = text
            .trim()
            .trim_end_matches(|c: char| c.is_ascii_punctuation())
            .to_lowercase();
        match word.as_str() {
            "hello" => Some(Command::Hello),
            "help" => Some(Command::Help),
            "status" => Some(Command::Status),
            _ => None,
        }
    }
}

/// Drop the leading `<@BOT>` mention: everything up to the first `>`.
pub fn strip_mention(text: &str) -> &str {
    text.split_once('>').map_or(text, |(_, rest)| rest).trim()
}

/// Answers direct messages, mentions, and slash commands through the
/// [`Assistant`]. Slash command replies are not addressed to the user.
pub struct AssistantHandler {
    assistant: Arc<Assistant>,
}

impl AssistantHandler {
    pub fn new(assistant: Arc<Assistant>) -> Self {
        Self { assistant }
    }
}

#[async_trait]
impl Handler for AssistantHandler {
    async fn handle(&self, event: &IncomingEvent) -> Option<String> {
        let text = match event.kind {
            EventKind::AppMention => strip_mention(&event.text),
            EventKind::DirectMessage | EventKind::SlashCommand => event.text.trim(),
        };

        if event.kind == EventKind::SlashCommand {
            if text.is_empty() {
                return Some(SLASH_USAGE.to_string());
            }
            let reply = self.assistant.handle(&self.request(event, text)).await;
            return Some(reply.text);
        }

        if let Some(command) = Command::parse(text) {
            tracing::info!(user = %event.user, ?command, "built-in command");
            return Some(match command {
                Command::Hello => self.assistant.hello_text(&event.user),
                Command::Help => self.assistant.help_text(),
                Command::Status => self.assistant.status_text().await,
            });
        }

        if text.is_empty() && event.kind == EventKind::AppMention {
            return Some(format!("<@{}> {}", event.user, MENTION_GREETING));
        }

        let reply = self.assistant.handle(&self.request(event, text)).await;
        Some(format!("<@{}> {}", event.user, reply.text))
    }
}

impl AssistantHandler {
    fn request(&self, event: &IncomingEvent, text: &str) -> Request {
        Request {
            channel: event.channel.clone(),
            user: event.user.clone(),
            text: text.to_string(),
        }
    }
}

pub struct Dispatcher {
    handlers: HashMap<EventKind, Arc<dyn Handler>>,
    platform: Arc<dyn ChatPlatform>,
}

impl Dispatcher {
    pub fn new(platform: Arc<dyn ChatPlatform>) -> Self {
        Self {
            handlers: HashMap::new(),
            platform,
        }
    }

    /// Direct messages, mentions, and slash commands all routed to `assistant`.
    pub fn for_assistant(assistant: Arc<Assistant>, platform: Arc<dyn ChatPlatform>) -> Self {
        let handler: Arc<dyn Handler> = Arc::new(AssistantHandler::new(assistant));
        Self::new(platform)
            .register(EventKind::DirectMessage, Arc::clone(&handler))
            .register(EventKind::AppMention, Arc::clone(&handler))
            .register(EventKind::SlashCommand, handler)
    }

    pub fn register(mut self, kind: EventKind, handler: Arc<dyn Handler>) -> Self {
        self.handlers.insert(kind, handler);
        self
    }

    pub async fn dispatch(&self, event: IncomingEvent) {
        let Some(handler) = self.handlers.get(&event.kind) else {
            tracing::debug!(kind = ?event.kind, "no handler registered");
            return;
        };

        let Some(reply) = handler.handle(&event).await else {
            return;
        };

        if let Err(e) = self.platform.post_message(&event.channel, &reply).await {
            tracing::error!(channel = %event.channel, error = %e, "failed to post reply");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_commands() {
        assert_eq!(Command::parse("hello"), Some(Command::Hello));
        assert_eq!(Command::parse(" Help! "), Some(Command::Help));
        assert_eq!(Command::parse("STATUS"), Some(Command::Status));
        assert_eq!(Command::parse("hello there"), None);
        assert_eq!(Command::parse("what is the status of the build"), None);
    }

    #[test]
    fn test_strip_mention() {
        assert_eq!(strip_mention("<@U123> what is up"), "what is up");
        assert_eq!(strip_mention("<@U123>"), "");
        assert_eq!(strip_mention("no mention"), "no mention");
    }
}
