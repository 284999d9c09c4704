//! Socket Mode envelopes and the events Nestie reacts to.
//!
//! ```json
//! {"type": "events_api", "envelope_id": "...", "payload": {"event": {...}}}
//! ```
//!
//! Consumed shapes: a `message` in an IM channel, an `app_mention`, and a
//! `slash_commands` envelope. Messages with a `subtype` (edits, joins, bot
//! posts), a `bot_id`, or authored by the bot itself are dropped.

use serde::Deserialize;
use serde_json::Value;

#[derive(Debug, Clone, Deserialize)]
pub struct Envelope {
    #[serde(rename = "type")]
    pub kind: String,
    #[serde(default)]
    pub envelope_id: Option<String>,
    #[serde(default)]
    pub payload: Option<Value>,
    /// Set on `disconnect` messages.
    #[serde(default)]
    pub reason: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EventKind {
    DirectMessage,
    AppMention,
    SlashCommand,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IncomingEvent {
    pub kind: EventKind,
    pub channel: String,
    pub user: String,
    pub text: String,
}

#[derive(Debug, Deserialize)]
struct RawEvent {
    #[serde(rename = "type")]
    kind: String,
    #[serde(default)]
    channel: Option<String>,
    #[serde(default)]
    channel_type: Option<String>,
    #[serde(default)]
    user: Option<String>,
    #[serde(default)]
    text: Option<String>,
    #[serde(default)]
    subtype: Option<String>,
    #[serde(default)]
    bot_id: Option<String>,
}

/// Payload of a `slash_commands` envelope.
#[derive(Debug, Deserialize)]
struct RawSlashCommand {
    #[serde(default)]
    command: Option<String>,
    #[serde(default)]
    text: String,
    user_id: String,
    channel_id: String,
}

pub fn parse_envelope(text: &str) -> serde_json::Result<Envelope> {
    serde_json::from_str(text)
}

/// The acknowledgement Slack expects for an envelope.
pub fn ack(envelope_id: &str) -> String {
    serde_json::json!({ "envelope_id": envelope_id }).to_string()
}

impl Envelope {
    /// The event this envelope carries, if it is one Nestie handles.
    pub fn event(&self, bot_user_id: Option<&str>) -> Option<IncomingEvent> {
        match self.kind.as_str() {
            "events_api" => {}
            "slash_commands" => return self.slash_command(),
            _ => return None,
        }
        let raw = self.payload.as_ref()?.get("event")?;
        let raw: RawEvent = serde_json::from_value(raw.clone()).ok()?;

        if raw.subtype.is_some() || raw.bot_id.is_some() {
            return None;
        }
        let user = raw.user?;
        if bot_user_id == Some(user.as_str()) {
            return None;
        }

        let kind = match (raw.kind.as_str(), raw.channel_type.as_deref()) {
            ("app_mention", _) => EventKind::AppMention,
            ("message", Some("im")) => EventKind::DirectMessage,
            _ => return None,
        };

        Some(IncomingEvent {
            kind,
            channel: raw.channel?,
            user,
            text: raw.text.unwrap_or_default(),
        })
    }
}

impl Envelope {
    fn slash_command(&self) -> Option<IncomingEvent> {
        let raw: RawSlashCommand = serde_json::from_value(self.payload.clone()?).ok()?;
        tracing::debug!(command = ?raw.command, user = %raw.user_id, "slash command");
        Some(IncomingEvent {
            kind: EventKind::SlashCommand,
            channel: raw.channel_id,
            user: raw.user_id,
            text: raw.text,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn envelope(event: Value) -> Envelope {
        parse_envelope(
            &serde_json::json!({
                "type": "events_api",
                "envelope_id": "env-1",
                "payload": { "event": event },
                "accepts_response_payload": false
            })
            .to_string(),
        )
        .unwrap()
    }

    #[test]
    fn test_app_mention() {
        let env = envelope(serde_json::json!({
            "type": "app_mention",
            "channel": "C1",
            "user": "U1",
            "text": "<@UBOT> what is the vacation policy?"
        }));
        assert_eq!(env.envelope_id.as_deref(), Some("env-1"));
        assert_eq!(
            env.event(Some("UBOT")),
            Some(IncomingEvent {
                kind: EventKind::AppMention,
                channel: "C1".to_string(),
                user: "U1".to_string(),
                text: "<@UBOT> what is the vacation policy?".to_string(),
            })
        );
    }

    #[test]
    fn test_direct_message() {
        let env = envelope(serde_json::json!({
            "type": "message",
            "channel_type": "im",
            "channel": "D1",
            "user": "U1",
            "text": "hi"
        }));
        let event = env.event(Some("UBOT")).unwrap();
        assert_eq!(event.kind, EventKind::DirectMessage);
        assert_eq!(event.channel, "D1");
    }

    #[test]
    fn test_ignored_events() {
        let channel_message = envelope(serde_json::json!({
            "type": "message", "channel_type": "channel", "channel": "C1", "user": "U1", "text": "x"
        }));
        assert!(channel_message.event(None).is_none());

        let edit = envelope(serde_json::json!({
            "type": "message", "subtype": "message_changed", "channel_type": "im", "channel": "D1"
        }));
        assert!(edit.event(None).is_none());

        let bot = envelope(serde_json::json!({
            "type": "message", "channel_type": "im", "channel": "D1", "bot_id": "B1", "text": "x"
        }));
        assert!(bot.event(None).is_none());

        let own = envelope(serde_json::json!({
            "type": "message", "channel_type": "im", "channel": "D1", "user": "UBOT", "text": "x"
        }));
        assert!(own.event(Some("UBOT")).is_none());
    }

    #[test]
    fn test_control_messages() {
        let hello = parse_envelope(r#"{"type":"hello","num_connections":1}"#).unwrap();
        assert_eq!(hello.kind, "hello");
        assert!(hello.event(None).is_none());

        let disconnect =
            parse_envelope(r#"{"type":"disconnect","reason":"refresh_requested"}"#).unwrap();
        assert_eq!(disconnect.reason.as_deref(), Some("refresh_requested"));
        assert_eq!(ack("env-9"), r#"{"envelope_id":"env-9"}"#);
    }

    #[test]
    fn test_slash_command() {
        let env = parse_envelope(
            r#"{
                "type": "slash_commands",
                "envelope_id": "env-2",
                "payload": {
                    "command": "/nestie",
                    "text": "what are our working hours?",
                    "user_id": "U1",
                    "channel_id": "C5"
                }
            }"#,
        )
        .unwrap();
        assert_eq!(
            env.event(Some("UBOT")),
            Some(IncomingEvent {
                kind: EventKind::SlashCommand,
                channel: "C5".to_string(),
                user: "U1".to_string(),
                text: "what are our working hours?".to_string(),
            })
        );

        let missing_user = parse_envelope(
            r#"{"type": "slash_commands", "envelope_id": "e", "payload": {"channel_id": "C5"}}"#,
        )
        .unwrap();
        assert!(missing_user.event(None).is_none());
    }
}
