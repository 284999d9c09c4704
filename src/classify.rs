//! Request classification.
//!
//! [`KeywordClassifier`] decides in this order:
//!
//! 1. A channel command → [`RequestKind::ChannelAnalysis`].
//! 2. Continuation phrasing ("what about", "tell me more", a leading "and")
//!    with an earlier question in the conversation → that question's kind.
//! 3. Small talk (greetings, thanks, "who are you", bare "ok") → chitchat.
//! 4. Document keywords, counted by substring over a built-in list plus the
//!    lowercased document names: 2 or more → document Q&A, exactly 1 →
//!    mixed, none → chitchat.

use regex::Regex;

use crate::analysis::{parse_channel_command, ChannelCommand};

/// Label stored in conversation history.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QueryKind {
    DocumentQa,
    Mixed,
    Chitchat,
    ChannelAnalysis,
}

impl QueryKind {
    pub fn as_str(self) -> &'static str {
        match self {
            QueryKind::DocumentQa => "document_qa",
            QueryKind::Mixed => "mixed",
            QueryKind::Chitchat => "chitchat",
            QueryKind::ChannelAnalysis => "channel_analysis",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RequestKind {
    ChannelAnalysis(ChannelCommand),
    DocumentQa,
    Mixed,
    Chitchat,
}

impl RequestKind {
    pub fn query_kind(&self) -> QueryKind {
        match self {
            RequestKind::ChannelAnalysis(_) => QueryKind::ChannelAnalysis,
            RequestKind::DocumentQa => QueryKind::DocumentQa,
            RequestKind::Mixed => QueryKind::Mixed,
            RequestKind::Chitchat => QueryKind::Chitchat,
        }
    }
}

/// Conversation state a classifier may consult.
#[derive(Debug, Clone, Copy, Default)]
pub struct ClassifyContext<'a> {
    pub last_kind: Option<QueryKind>,
    pub document_names: &'a [String],
}

pub trait Classifier: Send + Sync {
    fn classify(&self, text: &str, ctx: &ClassifyContext<'_>) -> RequestKind;
}

const DOCUMENT_KEYWORDS: &[&str] = &[
    "document",
    "doc",
    "file",
    "paper",
    "text",
    "pdf",
    "summarize",
    "summary",
    "main topic",
    "key points",
    "information",
    "data",
    "content",
    "source",
    "reference",
    "what does",
    "according to",
    "mentioned in",
    "states that",
    "chapter",
    "section",
    "page",
    "paragraph",
    "policy",
    "rule",
];

const SMALL_TALK_PATTERNS: &[&str] = &[
    r"\b(hello|hi|hey|good morning|good afternoon|good evening)\b",
    r"\b(how are you|what's up|how's it going)\b",
    r"\b(thank you|thanks|appreciate)\b",
    r"\b(goodbye|bye|see you|talk to you later)\b",
    r"\b(who are you|what are you|tell me about yourself)\b",
    r"^\s*(yes|no|okay|ok|sure|maybe|perhaps)\s*$",
    r"\b(weather|time|date|joke|story)\b",
];

const CONTINUATION_PATTERNS: &[&str] = &[
    r"\b(also|and|furthermore|additionally|moreover)\b",
    r"\b(what about|how about|tell me more)\b",
    r"\b(continue|more|further|elaborate)\b",
    r"\b(that|this|it|they)\b",
    r"^\s*(and|but|however|although|though)\b",
];

pub struct KeywordClassifier {
    small_talk: Vec<Regex>,
    continuation: Vec<Regex>,
    help: Regex,
    about_documents: Regex,
}

impl KeywordClassifier {
    pub fn new() -> Self {
        let compile = |patterns: &[&str]| -> Vec<Regex> {
            patterns
                .iter()
                .map(|p| Regex::new(p).expect("valid classifier pattern"))
                .collect()
        };
        Self {
            small_talk: compile(SMALL_TALK_PATTERNS),
            continuation: compile(CONTINUATION_PATTERNS),
            help: Regex::new(r"\b(can you help|help me)\b").expect("valid classifier pattern"),
            about_documents: Regex::new(r"\b(document|file|pdf)\b")
                .expect("valid classifier pattern"),
        }
    }

    fn is_small_talk(&self, lower: &str) -> bool {
        if self.small_talk.iter().any(|re| re.is_match(lower)) {
            return true;
        }
        // "help me" counts as small talk unless it goes on to mention documents.
        self.help
            .find(lower)
            .is_some_and(|m| !self.about_documents.is_match(&lower[m.end()..]))
    }

    fn is_continuation(&self, lower: &str) -> bool {
        self.continuation.iter().any(|re| re.is_match(lower))
    }

    /// Number of document keywords and names occurring in `lower`.
    pub fn document_score(&self, lower: &str, document_names: &[String]) -> usize {
        let builtin = DOCUMENT_KEYWORDS
            .iter()
            .filter(|k| lower.contains(*k))
            .count();
        let names = document_names
            .iter()
            .map(|n| n.to_lowercase())
            .filter(|n| !n.is_empty() && lower.contains(n.as_str()))
            .count();
        builtin + names
    }
}

impl Default for KeywordClassifier {
    fn default() -> Self {
        Self::new()
    }
}

impl Classifier for KeywordClassifier {
    fn classify(&self, text: &str, ctx: &ClassifyContext<'_>) -> RequestKind {
        if let Some(command) = parse_channel_command(text) {
            return RequestKind::ChannelAnalysis(command);
        }

        let lower = text.trim().to_lowercase();

        match ctx.last_kind {
            Some(QueryKind::DocumentQa) if self.is_continuation(&lower) => {
                return RequestKind::DocumentQa
            }
            Some(QueryKind::Mixed) if self.is_continuation(&lower) => return RequestKind::Mixed,
            Some(QueryKind::Chitchat) if self.is_continuation(&lower) => {
                return RequestKind::Chitchat
            }
            _ => {}
        }

        if self.is_small_talk(&lower) {
            return RequestKind::Chitchat;
        }

        match self.document_score(&lower, ctx.document_names) {
            0 => RequestKind::Chitchat,
            1 => RequestKind::Mixed,
            _ => RequestKind::DocumentQa,
        }
    }
}
