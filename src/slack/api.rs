//! Slack Web API client.
//!
//! Every call goes through the shared [`RetryPolicy`]. Slack reports most
//! failures as HTTP 200 with `{"ok": false, "error": "..."}`; those are
//! mapped onto [`ServiceErrorKind`] as well:
//!
//! | `error` | Kind |
//! |---------|------|
//! | `ratelimited` | `RateLimited` |
//! | `internal_error`, `fatal_error`, `service_unavailable` | `ServiceUnavailable` |
//! | `request_timeout` | `Timeout` |
//! | anything else | `Rejected` |
//!
//! `chat.postMessage` is not idempotent, so it is retried only on rate
//! limits and outages, never after a timeout.

use std::collections::{BTreeSet, HashMap};

use anyhow::Result;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use nestie_core::error::{Error, ServiceErrorKind};
use serde::Deserialize;
use serde_json::{json, Value};
use tokio::sync::RwLock;

use crate::analysis::ChannelMessage;
use crate::config::{SlackConfig, SlackCredentials};
use crate::http;
use crate::platform::ChatPlatform;
use crate::retry::RetryPolicy;

/// Largest page `conversations.history` accepts.
const HISTORY_PAGE_SIZE: usize = 200;

pub struct SlackClient {
    http: reqwest::Client,
    api_url: String,
    bot_token: String,
    app_token: String,
    retry: RetryPolicy,
    user_names: UserNames,
}

/// Source of user display names.
#[async_trait]
pub trait UserDirectory: Send + Sync {
    /// Display name for `user`, or `None` when the profile has none.
    async fn lookup(&self, user: &str) -> Result<Option<String>, Error>;
}

/// User id → display name cache, kept for the life of the process.
///
/// A failed lookup caches the raw id, so an unreachable directory costs
/// one lookup per user rather than one per message.
#[derive(Default)]
pub struct UserNames {
    names: RwLock<HashMap<String, String>>,
}

impl UserNames {
    pub async fn resolve(&self, directory: &dyn UserDirectory, user: &str) -> String {
        if let Some(name) = self.names.read().await.get(user) {
            return name.clone();
        }

        let name = match directory.lookup(user).await {
            Ok(name) => name.unwrap_or_else(|| user.to_string()),
            Err(e) => {
                tracing::warn!(user, error = %e, "user lookup failed; using raw id");
                user.to_string()
            }
        };
        self.names
            .write()
            .await
            .insert(user.to_string(), name.clone());
        name
    }

    /// Resolve each distinct id in `users` once.
    pub async fn resolve_all<'a>(
        &self,
        directory: &dyn UserDirectory,
        users: impl IntoIterator<Item = &'a str>,
    ) -> HashMap<String, String> {
        let unique: BTreeSet<&str> = users.into_iter().collect();
        let mut resolved = HashMap::with_capacity(unique.len());
        for user in unique {
            resolved.insert(user.to_string(), self.resolve(directory, user).await);
        }
        resolved
    }
}

#[derive(Debug, Deserialize)]
struct HistoryPage {
    #[serde(default)]
    messages: Vec<RawMessage>,
    #[serde(default)]
    has_more: bool,
    #[serde(default)]
    response_metadata: Option<ResponseMetadata>,
}

#[derive(Debug, Deserialize)]
struct ResponseMetadata {
    #[serde(default)]
    next_cursor: Option<String>,
}

#[derive(Debug, Deserialize)]
struct RawMessage {
    #[serde(default)]
    user: Option<String>,
    #[serde(default)]
    text: String,
    ts: String,
    #[serde(default)]
    subtype: Option<String>,
    #[serde(default)]
    bot_id: Option<String>,
}

#[derive(Debug, Deserialize)]
struct UserInfo {
    #[serde(default)]
    name: Option<String>,
    #[serde(default)]
    real_name: Option<String>,
    #[serde(default)]
    profile: Option<UserProfile>,
}

#[derive(Debug, Deserialize)]
struct UserProfile {
    #[serde(default)]
    display_name: Option<String>,
    #[serde(default)]
    real_name: Option<String>,
}

impl UserInfo {
    fn display_name(&self) -> Option<String> {
        let profile = self.profile.as_ref();
        [
            profile.and_then(|p| p.display_name.as_deref()),
            profile.and_then(|p| p.real_name.as_deref()),
            self.real_name.as_deref(),
            self.name.as_deref(),
        ]
        .into_iter()
        .flatten()
        .map(str::trim)
        .find(|n| !n.is_empty())
        .map(str::to_string)
    }
}

impl SlackClient {
    pub fn new(config: &SlackConfig, credentials: SlackCredentials, retry: RetryPolicy) -> Result<Self> {
        Ok(Self {
            http: http::client(config.timeout_secs)?,
            api_url: config.api_url.trim_end_matches('/').to_string(),
            bot_token: credentials.bot_token,
            app_token: credentials.app_token,
            retry,
            user_names: UserNames::default(),
        })
    }

    async fn get(&self, method: &str, query: &[(&str, String)]) -> Result<Value, Error> {
        let url = format!("{}/{}", self.api_url, method);
        self.retry
            .run(
                |_| {
                    let request = self.http.get(&url).bearer_auth(&self.bot_token).query(query);
                    checked(method, request)
                },
                Error::is_transient,
            )
            .await
    }

    async fn post(
        &self,
        method: &str,
        token: &str,
        body: &Value,
        is_retryable: fn(&Error) -> bool,
    ) -> Result<Value, Error> {
        let url = format!("{}/{}", self.api_url, method);
        self.retry
            .run(
                |_| {
                    let request = self.http.post(&url).bearer_auth(token).json(body);
                    checked(method, request)
                },
                is_retryable,
            )
            .await
    }

    /// The bot's own user id, used to ignore its own messages.
    pub async fn auth_test(&self) -> Result<String, Error> {
        let body = self
            .post("auth.test", &self.bot_token, &json!({}), Error::is_transient)
            .await?;
        body.get("user_id")
            .and_then(Value::as_str)
            .map(str::to_string)
            .ok_or_else(|| malformed("auth.test", "missing user_id"))
    }

    /// A fresh Socket Mode WebSocket URL.
    pub async fn open_connection(&self) -> Result<String, Error> {
        let body = self
            .post(
                "apps.connections.open",
                &self.app_token,
                &json!({}),
                Error::is_transient,
            )
            .await?;
        body.get("url")
            .and_then(Value::as_str)
            .map(str::to_string)
            .ok_or_else(|| malformed("apps.connections.open", "missing url"))
    }

    /// Display name for a user id, cached for the life of the process.
    /// Falls back to the id when the lookup fails.
    pub async fn user_name(&self, user: &str) -> String {
        self.user_names.resolve(self, user).await
    }

    async fn history_pages(
        &self,
        channel: &str,
        oldest: DateTime<Utc>,
        latest: Option<DateTime<Utc>>,
        limit: usize,
    ) -> Result<Vec<RawMessage>, Error> {
        let mut raw = Vec::new();
        let mut cursor: Option<String> = None;

        while raw.len() < limit {
            let mut query = vec![
                ("channel", channel.to_string()),
                ("oldest", format_ts(oldest)),
                ("limit", (limit - raw.len()).min(HISTORY_PAGE_SIZE).to_string()),
            ];
            if let Some(latest) = latest {
                query.push(("latest", format_ts(latest)));
            }
            if let Some(cursor) = &cursor {
                query.push(("cursor", cursor.clone()));
            }

            let body = self.get("conversations.history", &query).await?;
            let page: HistoryPage = serde_json::from_value(body)
                .map_err(|e| malformed("conversations.history", e))?;
            raw.extend(page.messages);

            cursor = page
                .response_metadata
                .and_then(|m| m.next_cursor)
                .filter(|c| !c.is_empty());
            if !page.has_more || cursor.is_none() {
                break;
            }
        }

        raw.truncate(limit);
        Ok(raw)
    }
}

#[async_trait]
impl UserDirectory for SlackClient {
    async fn lookup(&self, user: &str) -> Result<Option<String>, Error> {
        let body = self.get("users.info", &[("user", user.to_string())]).await?;
        Ok(body
            .get("user")
            .cloned()
            .and_then(|u| serde_json::from_value::<UserInfo>(u).ok())
            .and_then(|u| u.display_name()))
    }
}

#[async_trait]
impl ChatPlatform for SlackClient {
    async fn post_message(&self, channel: &str, text: &str) -> Result<()> {
        self.post(
            "chat.postMessage",
            &self.bot_token,
            &json!({ "channel": channel, "text": text }),
            safe_to_repost,
        )
        .await?;
        Ok(())
    }

    async fn channel_history(
        &self,
        channel: &str,
        oldest: DateTime<Utc>,
        latest: Option<DateTime<Utc>>,
        limit: usize,
    ) -> Result<Vec<ChannelMessage>> {
        let raw = self.history_pages(channel, oldest, latest, limit).await?;

        let kept: Vec<(String, String, DateTime<Utc>)> = raw
            .into_iter()
            .filter(|m| m.subtype.is_none() && m.bot_id.is_none() && !m.text.trim().is_empty())
            .filter_map(|m| {
                let timestamp = parse_ts(&m.ts)?;
                Some((m.user?, m.text, timestamp))
            })
            .collect();

        let names = self
            .user_names
            .resolve_all(self, kept.iter().map(|(user, _, _)| user.as_str()))
            .await;
        let mut messages: Vec<ChannelMessage> = kept
            .into_iter()
            .map(|(user, text, timestamp)| ChannelMessage {
                user: names.get(&user).cloned().unwrap_or(user),
                text,
                timestamp,
            })
            .collect();

        // Slack returns newest first.
        messages.sort_by_key(|m| m.timestamp);
        tracing::debug!(channel, count = messages.len(), "fetched channel history");
        Ok(messages)
    }
}

async fn checked(method: &str, request: reqwest::RequestBuilder) -> Result<Value, Error> {
    let body = http::send_json(request, "Slack", |kind, msg| Error::platform(kind, msg)).await?;
    if body.get("ok").and_then(Value::as_bool) == Some(true) {
        return Ok(body);
    }
    let code = body
        .get("error")
        .and_then(Value::as_str)
        .unwrap_or("unknown_error");
    Err(Error::platform(
        slack_error_kind(code),
        format!("{} failed: {}", method, code),
    ))
}

/// Retry predicate for calls that must not be applied twice. A timeout
/// may mean Slack already accepted the request.
fn safe_to_repost(e: &Error) -> bool {
    matches!(
        e.service_kind(),
        Some(ServiceErrorKind::RateLimited | ServiceErrorKind::ServiceUnavailable)
    )
}

fn slack_error_kind(code: &str) -> ServiceErrorKind {
    match code {
        "ratelimited" => ServiceErrorKind::RateLimited,
        "internal_error" | "fatal_error" | "service_unavailable" => {
            ServiceErrorKind::ServiceUnavailable
        }
        "request_timeout" => ServiceErrorKind::Timeout,
        _ => ServiceErrorKind::Rejected,
    }
}

fn malformed(method: &str, detail: impl std::fmt::Display) -> Error {
    Error::platform(
        ServiceErrorKind::MalformedResponse,
        format!("{}: {}", method, detail),
    )
}

/// Slack timestamps are `"<seconds>.<microseconds>"`.
pub fn parse_ts(ts: &str) -> Option<DateTime<Utc>> {
    let (secs, frac) = ts.split_once('.').unwrap_or((ts, "0"));
    let secs: i64 = secs.parse().ok()?;
    let micros: u32 = format!("{:0<6}", frac).get(..6)?.parse().ok()?;
    DateTime::from_timestamp(secs, micros * 1000)
}

pub fn format_ts(at: DateTime<Utc>) -> String {
    format!("{}.{:06}", at.timestamp(), at.timestamp_subsec_micros())
}
