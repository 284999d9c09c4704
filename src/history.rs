//! Bounded per-conversation history.
//!
//! A conversation is one user in one channel. Each keeps at most
//! `max_turns` turns; the oldest is evicted first. At most
//! `max_conversations` are kept; a new conversation beyond that evicts the
//! one least recently appended to. Appends from concurrently handled
//! events are serialized by a mutex.

use std::collections::{HashMap, VecDeque};
use std::sync::{Mutex, MutexGuard};

use chrono::{DateTime, Utc};

use crate::classify::QueryKind;

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ConversationKey {
    pub channel: String,
    pub user: String,
}

impl ConversationKey {
    pub fn new(channel: impl Into<String>, user: impl Into<String>) -> Self {
        Self {
            channel: channel.into(),
            user: user.into(),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Turn {
    pub question: String,
    pub answer: String,
    pub kind: QueryKind,
    /// The reply was the fallback message.
    pub failed: bool,
    pub at: DateTime<Utc>,
}

impl Turn {
    pub fn new(question: impl Into<String>, answer: impl Into<String>, kind: QueryKind) -> Self {
        Self {
            question: question.into(),
            answer: answer.into(),
            kind,
            failed: false,
            at: Utc::now(),
        }
    }
}

#[derive(Default)]
struct Conversation {
    turns: VecDeque<Turn>,
    /// Append sequence number of the latest turn.
    touched: u64,
}

#[derive(Default)]
struct Conversations {
    by_key: HashMap<ConversationKey, Conversation>,
    next_seq: u64,
}

pub struct ConversationHistory {
    max_turns: usize,
    max_conversations: usize,
    conversations: Mutex<Conversations>,
}

impl ConversationHistory {
    pub fn new(max_turns: usize, max_conversations: usize) -> Self {
        Self {
            max_turns,
            max_conversations,
            conversations: Mutex::new(Conversations::default()),
        }
    }

    fn lock(&self) -> MutexGuard<'_, Conversations> {
        // Every deque is consistent between calls; poisoning is ignored.
        self.conversations
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    pub fn append(&self, key: &ConversationKey, turn: Turn) {
        if self.max_turns == 0 || self.max_conversations == 0 {
            return;
        }
        let mut state = self.lock();
        if !state.by_key.contains_key(key) && state.by_key.len() >= self.max_conversations {
            let stalest = state
                .by_key
                .iter()
                .min_by_key(|(_, c)| c.touched)
                .map(|(k, _)| k.clone());
            if let Some(stalest) = stalest {
                tracing::debug!(channel = %stalest.channel, user = %stalest.user, "evicting idle conversation");
                state.by_key.remove(&stalest);
            }
        }

        let seq = state.next_seq;
        state.next_seq += 1;
        let conversation = state.by_key.entry(key.clone()).or_default();
        conversation.touched = seq;
        conversation.turns.push_back(turn);
        while conversation.turns.len() > self.max_turns {
            conversation.turns.pop_front();
        }
    }

    /// The last `n` turns, oldest first.
    pub fn recent(&self, key: &ConversationKey, n: usize) -> Vec<Turn> {
        self.lock()
            .by_key
            .get(key)
            .map(|c| {
                c.turns
                    .iter()
                    .skip(c.turns.len().saturating_sub(n))
                    .cloned()
                    .collect()
            })
            .unwrap_or_default()
    }

    pub fn last_kind(&self, key: &ConversationKey) -> Option<QueryKind> {
        self.lock()
            .by_key
            .get(key)
            .and_then(|c| c.turns.back())
            .map(|t| t.kind)
    }

    pub fn len(&self, key: &ConversationKey) -> usize {
        self.lock().by_key.get(key).map_or(0, |c| c.turns.len())
    }

    pub fn is_empty(&self, key: &ConversationKey) -> bool {
        self.len(key) == 0
    }

    /// Number of conversations with at least one turn.
    pub fn conversation_count(&self) -> usize {
        self.lock().by_key.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    #[test]
    fn test_bounded_oldest_evicted() {
        let history = ConversationHistory::new(3, 100);
        let key = ConversationKey::new("C1", "U1");
        for i in 0..5 {
            history.append(&key, Turn::new(format!("q{}", i), "a", QueryKind::Chitchat));
        }
        assert_eq!(history.len(&key), 3);
        let recent = history.recent(&key, 10);
        assert_eq!(recent[0].question, "q2");
        assert_eq!(recent[2].question, "q4");
        assert_eq!(history.recent(&key, 2)[0].question, "q3");
    }

    #[test]
    fn test_keys_isolated() {
        let history = ConversationHistory::new(10, 100);
        let a = ConversationKey::new("C1", "U1");
        let b = ConversationKey::new("C1", "U2");
        history.append(&a, Turn::new("policy?", "yes", QueryKind::DocumentQa));
        assert_eq!(history.last_kind(&a), Some(QueryKind::DocumentQa));
        assert_eq!(history.last_kind(&b), None);
        assert!(history.is_empty(&b));
        assert_eq!(history.conversation_count(), 1);
    }

    #[test]
    fn test_least_recent_conversation_evicted() {
        let history = ConversationHistory::new(5, 2);
        let a = ConversationKey::new("C1", "U1");
        let b = ConversationKey::new("C1", "U2");
        let c = ConversationKey::new("C2", "U1");
        history.append(&a, Turn::new("first", "", QueryKind::Chitchat));
        history.append(&b, Turn::new("second", "", QueryKind::Chitchat));
        history.append(&a, Turn::new("third", "", QueryKind::Chitchat));

        history.append(&c, Turn::new("fourth", "", QueryKind::Chitchat));
        assert_eq!(history.conversation_count(), 2);
        assert!(history.is_empty(&b));
        assert_eq!(history.len(&a), 2);
        assert_eq!(history.len(&c), 1);

        // Appending to an existing conversation never evicts.
        history.append(&c, Turn::new("fifth", "", QueryKind::Chitchat));
        assert_eq!(history.len(&a), 2);
    }

    #[test]
    fn test_concurrent_appends() {
        let history = Arc::new(ConversationHistory::new(1000, 100));
        let key = ConversationKey::new("C1", "U1");
        let handles: Vec<_> = (0..8)
            .map(|t| {
                let history = Arc::clone(&history);
                let key = key.clone();
                std::thread::spawn(move || {
                    for i in 0..50 {
                        history.append(&key, Turn::new(format!("{}-{}", t, i), "", QueryKind::Chitchat));
                    }
                })
            })
            .collect();
        for h in handles {
            h.join().unwrap();
        }
        assert_eq!(history.len(&key), 400);
    }
}
