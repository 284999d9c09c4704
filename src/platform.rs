//! The messaging-platform operations the assistant depends on.
//!
//! [`SlackClient`](crate::slack::api::SlackClient) implements this for
//! Slack; tests substitute an in-memory fake.

use anyhow::Result;
use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::analysis::ChannelMessage;

#[async_trait]
pub trait ChatPlatform: Send + Sync {
    /// Post `text` to a channel or DM.
    async fn post_message(&self, channel: &str, text: &str) -> Result<()>;

    /// Messages in `[oldest, latest)` with author names resolved, oldest
    /// first, at most `limit` of them.
    async fn channel_history(
        &self,
        channel: &str,
        oldest: DateTime<Utc>,
        latest: Option<DateTime<Utc>>,
        limit: usize,
    ) -> Result<Vec<ChannelMessage>>;
}
