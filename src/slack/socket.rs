//! Socket Mode event loop.
//!
//! Opens a WebSocket URL with `apps.connections.open`, acknowledges each
//! envelope as soon as it arrives, and hands events to the
//! [`Dispatcher`] on spawned tasks so a slow reply never delays the next
//! acknowledgement. When Slack asks us to disconnect, or the socket
//! drops, the loop reconnects with exponential backoff.

use std::sync::Arc;

use anyhow::{Context, Result};
use futures_util::{SinkExt, StreamExt};
use tokio_tungstenite::tungstenite::Message;

use super::api::SlackClient;
use super::dispatch::Dispatcher;
use super::events::{ack, parse_envelope};
use crate::retry::RetryPolicy;

pub struct SocketModeClient {
    api: Arc<SlackClient>,
    dispatcher: Arc<Dispatcher>,
    bot_user_id: Option<String>,
    reconnect: RetryPolicy,
}

impl SocketModeClient {
    pub fn new(
        api: Arc<SlackClient>,
        dispatcher: Arc<Dispatcher>,
        bot_user_id: Option<String>,
        reconnect: RetryPolicy,
    ) -> Self {
        Self {
            api,
            dispatcher,
            bot_user_id,
            reconnect,
        }
    }

    /// Serve events until the task is cancelled.
    pub async fn run(&self) -> Result<()> {
        let mut failures = 0u32;
        loop {
            match self.connect_once().await {
                Ok(()) => {
                    failures = 0;
                    tracing::info!("socket closed; reconnecting");
                }
                Err(e) => {
                    failures += 1;
                    tracing::warn!(failures, error = %e, "socket mode connection failed");
                }
            }
            tokio::time::sleep(self.reconnect.delay_for(failures.max(1))).await;
        }
    }

    /// One connection lifetime. `Ok` means Slack closed it normally.
    async fn connect_once(&self) -> Result<()> {
        let url = self
            .api
            .open_connection()
            .await
            .context("apps.connections.open failed")?;
        let (socket, _) = tokio_tungstenite::connect_async(url.as_str())
            .await
            .context("WebSocket handshake failed")?;
        let (mut sink, mut stream) = socket.split();

        while let Some(message) = stream.next().await {
            let text = match message.context("WebSocket read failed")? {
                Message::Text(text) => text,
                Message::Close(frame) => {
                    tracing::info!(?frame, "socket closed by Slack");
                    return Ok(());
                }
                _ => continue,
            };

            let envelope = match parse_envelope(&text) {
                Ok(envelope) => envelope,
                Err(e) => {
                    tracing::warn!(error = %e, "unparseable socket message");
                    continue;
                }
            };

            match envelope.kind.as_str() {
                "hello" => tracing::info!("connected to Slack Socket Mode"),
                "disconnect" => {
                    tracing::info!(reason = ?envelope.reason, "Slack requested disconnect");
                    return Ok(());
                }
                _ => {
                    if let Some(id) = &envelope.envelope_id {
                        sink.send(Message::Text(ack(id)))
                            .await
                            .context("failed to acknowledge envelope")?;
                    }
                    if let Some(event) = envelope.event(self.bot_user_id.as_deref()) {
                        tracing::info!(kind = ?event.kind, channel = %event.channel, "event received");
                        let dispatcher = Arc::clone(&self.dispatcher);
                        tokio::spawn(async move { dispatcher.dispatch(event).await });
                    }
                }
            }
        }

        Ok(())
    }
}
