//! Dispatch of parsed Slack events to the assistant.

mod common;

use std::sync::Arc;

use common::*;
use nestie::slack::dispatch::{MENTION_GREETING, SLASH_USAGE};
use nestie::slack::events::{parse_envelope, EventKind, IncomingEvent};
use nestie::slack::Dispatcher;

fn event(kind: EventKind, text: &str) -> IncomingEvent {
    IncomingEvent {
        kind,
        channel: "C1".to_string(),
        user: "U1".to_string(),
        text: text.to_string(),
    }
}

async fn dispatcher(platform: Arc<FakePlatform>) -> Dispatcher {
    let assistant = Arc::new(
        assistant_with(
            &[("IT Guide", "The office Wi-Fi password is Blueberry42")],
            FakeModel::echo_context(),
        )
        .await,
    );
    Dispatcher::for_assistant(assistant, platform)
}

#[tokio::test]
async fn mention_is_stripped_and_reply_addressed() {
    let platform = FakePlatform::with_messages(Vec::new());
    let dispatcher = dispatcher(platform.clone()).await;

    dispatcher
        .dispatch(event(
            EventKind::AppMention,
            "<@UBOT> according to the document, what is the Wi-Fi password?",
        ))
        .await;

    let posted = platform.posted.lock().unwrap().clone();
    assert_eq!(posted.len(), 1);
    assert_eq!(posted[0].0, "C1");
    assert!(posted[0].1.starts_with("<@U1> "));
    assert!(posted[0].1.contains("Blueberry42"));
}

#[tokio::test]
async fn built_in_commands() {
    let platform = FakePlatform::with_messages(Vec::new());
    let dispatcher = dispatcher(platform.clone()).await;

    dispatcher.dispatch(event(EventKind::DirectMessage, "hello")).await;
    dispatcher.dispatch(event(EventKind::DirectMessage, "help")).await;
    dispatcher.dispatch(event(EventKind::AppMention, "<@UBOT> status")).await;

    let posted = platform.posted.lock().unwrap().clone();
    assert_eq!(posted.len(), 3);
    assert!(posted[0].1.starts_with("Hello <@U1> :wave:! I'm Nestie"));
    assert!(posted[1].1.contains("*Available Commands:*"));
    assert!(posted[2].1.contains("📊 *System Status*"));
    assert!(posted[2].1.contains("Documents loaded: 1"));
    assert!(posted[2].1.contains("IT Guide"));
}

#[tokio::test]
async fn bare_mention_gets_greeting() {
    let platform = FakePlatform::with_messages(Vec::new());
    let dispatcher = dispatcher(platform.clone()).await;

    dispatcher.dispatch(event(EventKind::AppMention, "<@UBOT>")).await;

    let posted = platform.posted.lock().unwrap().clone();
    assert_eq!(posted[0].1, format!("<@U1> {}", MENTION_GREETING));
}

#[tokio::test]
async fn envelope_to_dispatch() {
    let platform = FakePlatform::with_messages(Vec::new());
    let dispatcher = dispatcher(platform.clone()).await;

    let envelope = parse_envelope(
        r#"{
            "type": "events_api",
            "envelope_id": "abc",
            "payload": {"event": {
                "type": "message", "channel_type": "im", "channel": "D9",
                "user": "U1", "text": "tell me a joke"
            }}
        }"#,
    )
    .unwrap();
    let event = envelope.event(Some("UBOT")).unwrap();
    dispatcher.dispatch(event).await;

    let posted = platform.posted.lock().unwrap().clone();
    assert_eq!(posted, vec![("D9".to_string(), "<@U1> Happy to chat!".to_string())]);
}

#[tokio::test]
async fn slash_command_is_answered_in_its_channel() {
    let platform = FakePlatform::with_messages(Vec::new());
    let dispatcher = dispatcher(platform.clone()).await;

    let envelope = parse_envelope(
        r#"{
            "type": "slash_commands",
            "envelope_id": "cmd-1",
            "payload": {
                "command": "/nestie",
                "text": "According to the document, what is the Wi-Fi password?",
                "user_id": "U1",
                "channel_id": "C77"
            }
        }"#,
    )
    .unwrap();
    dispatcher.dispatch(envelope.event(Some("UBOT")).unwrap()).await;
    dispatcher
        .dispatch(IncomingEvent {
            kind: EventKind::SlashCommand,
            channel: "C77".to_string(),
            user: "U1".to_string(),
            text: "  ".to_string(),
        })
        .await;

    let posted = platform.posted.lock().unwrap().clone();
    assert_eq!(posted.len(), 2);
    assert_eq!(posted[0].0, "C77");
    assert!(posted[0].1.contains("Blueberry42"), "{}", posted[0].1);
    assert!(!posted[0].1.starts_with("<@U1>"));
    assert_eq!(posted[1], ("C77".to_string(), SLASH_USAGE.to_string()));
}
