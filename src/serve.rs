//! `nestie run` and `nestie ask`.

use std::sync::Arc;

use anyhow::{Context, Result};

use crate::app::App;
use crate::assistant::Request;
use crate::platform::ChatPlatform;
use crate::retry::RetryPolicy;
use crate::slack::{Dispatcher, SlackClient, SocketModeClient};

/// Ingest, then serve Slack Socket Mode until Ctrl-C.
pub async fn run_serve(app: &App) -> Result<()> {
    let credentials = app.config.slack_credentials()?;

    let report = app.ingest(false).await.context("startup ingestion failed")?;
    report.print();

    let slack = Arc::new(SlackClient::new(
        &app.config.slack,
        credentials,
        RetryPolicy::default(),
    )?);
    let bot_user_id = slack
        .auth_test()
        .await
        .context("auth.test failed; check slack.bot_token")?;
    tracing::info!(bot_user_id = %bot_user_id, "authenticated with Slack");

    let platform: Arc<dyn ChatPlatform> = slack.clone();
    let assistant = Arc::new(app.assistant()?.with_platform(Arc::clone(&platform)));
    let dispatcher = Arc::new(Dispatcher::for_assistant(assistant, platform));
    let socket = SocketModeClient::new(slack, dispatcher, Some(bot_user_id), RetryPolicy::default());

    println!("{} is listening. Press Ctrl-C to stop.", app.config.slack.bot_name);
    tokio::select! {
        result = socket.run() => result,
        _ = tokio::signal::ctrl_c() => {
            tracing::info!("shutting down");
            Ok(())
        }
    }
}

/// Run one question through the assistant and print the reply.
pub async fn run_ask(app: &App, question: &str) -> Result<()> {
    app.ensure_populated().await?;
    let assistant = app.assistant()?;
    let reply = assistant
        .handle(&Request {
            channel: "cli".to_string(),
            user: "cli".to_string(),
            text: question.to_string(),
        })
        .await;
    tracing::debug!(kind = reply.kind.as_str(), state = %reply.state, "answered");
    println!("{}", reply.text);
    Ok(())
}
