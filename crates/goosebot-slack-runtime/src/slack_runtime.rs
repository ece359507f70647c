//! Slack Socket Mode loop that acknowledges envelopes and relays
//! `app_mention` events to the mention handler, one task per event.

use std::time::Duration;

use anyhow::{Context, Result};
use futures_util::{SinkExt, StreamExt};
use goosebot_core::current_unix_timestamp_ms;
use goosebot_runtime::{MentionEvent, MentionHandler, MentionOutcome};
use serde::Deserialize;
use serde_json::{json, Value};
use tokio::task::{JoinError, JoinSet};
use tokio_tungstenite::{connect_async, tungstenite::Message as WsMessage};

use crate::slack_api_client::SlackApiClient;

mod event_cache;

use event_cache::ProcessedEventCache;

pub const DEFAULT_SLACK_RECONNECT_DELAY: Duration = Duration::from_millis(1_000);
pub const DEFAULT_SLACK_PROCESSED_EVENT_CAP: usize = 10_000;
pub const DEFAULT_SLACK_MAX_EVENT_AGE_SECONDS: u64 = 7_200;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SlackBridgeConfig {
    pub reconnect_delay: Duration,
    pub processed_event_cap: usize,
    /// Events older than this are dropped; 0 disables the check.
    pub max_event_age_seconds: u64,
}

impl Default for SlackBridgeConfig {
    fn default() -> Self {
        Self {
            reconnect_delay: DEFAULT_SLACK_RECONNECT_DELAY,
            processed_event_cap: DEFAULT_SLACK_PROCESSED_EVENT_CAP,
            max_event_age_seconds: DEFAULT_SLACK_MAX_EVENT_AGE_SECONDS,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
struct SlackSocketEnvelope {
    #[serde(default)]
    envelope_id: String,
    #[serde(rename = "type")]
    envelope_type: String,
    #[serde(default)]
    payload: Value,
    #[serde(default)]
    reason: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
struct SlackMentionDelivery {
    key: String,
    occurred_unix_ms: u64,
    event: MentionEvent,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum SessionEnd {
    Shutdown,
    Reconnect,
}

/// Runs the Socket Mode loop until Ctrl-C, reconnecting after failures.
pub async fn run_slack_bridge(
    config: SlackBridgeConfig,
    client: SlackApiClient,
    handler: MentionHandler,
) -> Result<()> {
    let mut runtime = SlackBridgeRuntime::new(config, client, handler);
    runtime.run().await
}

struct SlackBridgeRuntime {
    config: SlackBridgeConfig,
    client: SlackApiClient,
    handler: MentionHandler,
    processed: ProcessedEventCache,
    runs: JoinSet<MentionOutcome>,
}

impl SlackBridgeRuntime {
    fn new(config: SlackBridgeConfig, client: SlackApiClient, handler: MentionHandler) -> Self {
        let processed = ProcessedEventCache::new(config.processed_event_cap);
        Self {
            config,
            client,
            handler,
            processed,
            runs: JoinSet::new(),
        }
    }

    async fn run(&mut self) -> Result<()> {
        let mut failure_streak = 0_usize;
        loop {
            match self.client.open_socket_connection().await {
                Ok(socket_url) => {
                    tracing::info!("slack socket connected");
                    match self.run_socket_session(&socket_url).await {
                        Ok(SessionEnd::Shutdown) => break,
                        Ok(SessionEnd::Reconnect) => failure_streak = 0,
                        Err(error) => {
                            failure_streak = failure_streak.saturating_add(1);
                            tracing::warn!(
                                failure_streak,
                                error = %format!("{error:#}"),
                                "slack socket session error"
                            );
                        }
                    }
                }
                Err(error) => {
                    failure_streak = failure_streak.saturating_add(1);
                    tracing::warn!(
                        failure_streak,
                        error = %format!("{error:#}"),
                        "slack socket open failed"
                    );
                }
            }

            tokio::select! {
                _ = tokio::signal::ctrl_c() => break,
                _ = tokio::time::sleep(self.config.reconnect_delay) => {}
            }
        }

        tracing::info!(
            in_flight_runs = self.runs.len(),
            "slack bridge shutdown requested"
        );
        Ok(())
    }

    async fn run_socket_session(&mut self, socket_url: &str) -> Result<SessionEnd> {
        let (stream, _response) = connect_async(socket_url)
            .await
            .context("failed to connect slack socket mode websocket")?;
        let (mut sink, mut source) = stream.split();

        loop {
            tokio::select! {
                _ = tokio::signal::ctrl_c() => return Ok(SessionEnd::Shutdown),
                Some(joined) = self.runs.join_next(), if !self.runs.is_empty() => {
                    record_finished_run(joined);
                }
                maybe_message = source.next() => {
                    let Some(message_result) = maybe_message else {
                        tracing::info!("slack socket closed by peer");
                        return Ok(SessionEnd::Reconnect);
                    };
                    let message = message_result.context("failed reading slack websocket message")?;
                    if let Some(end) = self.on_socket_message(&mut sink, message).await? {
                        return Ok(end);
                    }
                }
            }
        }
    }

    async fn on_socket_message<S>(
        &mut self,
        sink: &mut S,
        message: WsMessage,
    ) -> Result<Option<SessionEnd>>
    where
        S: futures_util::Sink<WsMessage> + Unpin,
        S::Error: std::error::Error + Send + Sync + 'static,
    {
        let envelope = match parse_socket_envelope(message) {
            Ok(Some(envelope)) => envelope,
            Ok(None) => return Ok(None),
            Err(error) => {
                tracing::warn!(error = %format!("{error:#}"), "ignoring malformed slack envelope");
                return Ok(None);
            }
        };
        if !envelope.envelope_id.is_empty() {
            ack_envelope(sink, &envelope.envelope_id).await?;
        }

        match envelope.envelope_type.as_str() {
            "hello" => {
                tracing::debug!("slack socket hello received");
                Ok(None)
            }
            "disconnect" => {
                tracing::info!(
                    reason = envelope.reason.as_deref().unwrap_or("unspecified"),
                    "slack requested socket refresh"
                );
                Ok(Some(SessionEnd::Reconnect))
            }
            _ => {
                self.handle_envelope(&envelope, current_unix_timestamp_ms());
                Ok(None)
            }
        }
    }

    fn handle_envelope(&mut self, envelope: &SlackSocketEnvelope, now_unix_ms: u64) {
        if let Some(event) = self.accept_envelope(envelope, now_unix_ms) {
            self.dispatch_mention(event);
        }
    }

    fn accept_envelope(
        &mut self,
        envelope: &SlackSocketEnvelope,
        now_unix_ms: u64,
    ) -> Option<MentionEvent> {
        let delivery = match normalize_socket_envelope(envelope, self.handler.bot_user_id()) {
            Ok(Some(delivery)) => delivery,
            Ok(None) => return None,
            Err(error) => {
                tracing::warn!(error = %format!("{error:#}"), "ignoring undecodable slack event");
                return None;
            }
        };

        if self.processed.contains(&delivery.key) {
            tracing::debug!(key = %delivery.key, "skipping duplicate slack event");
            return None;
        }
        self.processed.mark_processed(&delivery.key);

        if delivery_is_stale(&delivery, self.config.max_event_age_seconds, now_unix_ms) {
            tracing::info!(key = %delivery.key, "skipping stale slack event");
            return None;
        }

        tracing::info!(
            key = %delivery.key,
            channel_id = %delivery.event.channel_id,
            user_id = %delivery.event.user_id,
            "app mention received"
        );
        Some(delivery.event)
    }

    fn dispatch_mention(&mut self, event: MentionEvent) {
        let handler = self.handler.clone();
        self.runs
            .spawn(async move { handler.handle(&event).await });
    }

    #[cfg(test)]
    async fn wait_for_runs(&mut self) -> Vec<MentionOutcome> {
        let mut outcomes = Vec::new();
        while let Some(joined) = self.runs.join_next().await {
            if let Ok(outcome) = joined {
                outcomes.push(outcome);
            }
        }
        outcomes
    }
}

fn record_finished_run(joined: Result<MentionOutcome, JoinError>) {
    match joined {
        Ok(outcome) => tracing::info!(outcome = outcome.as_str(), "mention run finished"),
        Err(error) => tracing::error!(%error, "mention run task failed"),
    }
}

async fn ack_envelope<S>(sink: &mut S, envelope_id: &str) -> Result<()>
where
    S: futures_util::Sink<WsMessage> + Unpin,
    S::Error: std::error::Error + Send + Sync + 'static,
{
    let ack = json!({ "envelope_id": envelope_id }).to_string();
    sink.send(WsMessage::Text(ack.into()))
        .await
        .context("failed to send slack socket ack")
}

fn parse_socket_envelope(message: WsMessage) -> Result<Option<SlackSocketEnvelope>> {
    let text = match message {
        WsMessage::Text(text) => text.as_str().to_string(),
        WsMessage::Binary(bytes) => {
            String::from_utf8(bytes.to_vec()).context("invalid utf-8 slack socket payload")?
        }
        WsMessage::Ping(_) | WsMessage::Pong(_) | WsMessage::Close(_) | WsMessage::Frame(_) => {
            return Ok(None)
        }
    };
    serde_json::from_str::<SlackSocketEnvelope>(&text)
        .map(Some)
        .context("failed to parse slack socket envelope")
}

#[derive(Debug, Deserialize)]
struct SlackEventCallbackEnvelope {
    #[serde(rename = "type")]
    callback_type: String,
    #[serde(default)]
    event_id: String,
    #[serde(default)]
    event_time: u64,
    event: SlackEventPayload,
}

#[derive(Debug, Deserialize)]
struct SlackEventPayload {
    #[serde(rename = "type")]
    event_type: String,
    #[serde(default)]
    subtype: Option<String>,
    #[serde(default)]
    bot_id: Option<String>,
    #[serde(default)]
    user: Option<String>,
    #[serde(default)]
    text: Option<String>,
    #[serde(default)]
    channel: Option<String>,
    #[serde(default)]
    ts: Option<String>,
    #[serde(default)]
    thread_ts: Option<String>,
}

fn non_blank(value: Option<String>) -> Option<String> {
    value.filter(|value| !value.trim().is_empty())
}

fn normalize_socket_envelope(
    envelope: &SlackSocketEnvelope,
    bot_user_id: &str,
) -> Result<Option<SlackMentionDelivery>> {
    if envelope.envelope_type != "events_api" {
        return Ok(None);
    }

    let callback = serde_json::from_value::<SlackEventCallbackEnvelope>(envelope.payload.clone())
        .context("failed to decode slack event callback payload")?;
    if callback.callback_type != "event_callback" {
        return Ok(None);
    }

    let event = callback.event;
    if event.event_type != "app_mention"
        || event.subtype.as_deref() == Some("bot_message")
        || event.bot_id.is_some()
    {
        return Ok(None);
    }
    let Some(user_id) = non_blank(event.user) else {
        return Ok(None);
    };
    if user_id == bot_user_id {
        return Ok(None);
    }
    let Some(channel_id) = non_blank(event.channel) else {
        return Ok(None);
    };
    let Some(ts) = non_blank(event.ts) else {
        return Ok(None);
    };

    let key = format!("{}:{}:{}", callback.event_id, channel_id, ts);
    Ok(Some(SlackMentionDelivery {
        key,
        occurred_unix_ms: callback.event_time.saturating_mul(1_000),
        event: MentionEvent {
            channel_id,
            ts,
            thread_ts: non_blank(event.thread_ts),
            user_id,
            text: event.text.unwrap_or_default(),
        },
    }))
}

fn delivery_is_stale(
    delivery: &SlackMentionDelivery,
    max_event_age_seconds: u64,
    now_unix_ms: u64,
) -> bool {
    if max_event_age_seconds == 0 {
        return false;
    }
    let max_age_ms = max_event_age_seconds.saturating_mul(1_000);
    now_unix_ms.saturating_sub(delivery.occurred_unix_ms) > max_age_ms
}
