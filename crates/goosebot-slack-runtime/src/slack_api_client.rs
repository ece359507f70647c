//! Slack Web API client: identity lookup, Socket Mode handshake, and the
//! post/update calls behind the notification sink.

use std::time::Duration;

use anyhow::{anyhow, bail, Context, Result};
use async_trait::async_trait;
use goosebot_core::truncate_for_log;
use goosebot_runtime::{Destination, MessageRef, NotificationError, NotificationSink};
use serde::de::DeserializeOwned;
use serde::Deserialize;
use serde_json::{json, Value};

use crate::slack_helpers::{
    is_retryable_slack_status, is_retryable_transport_error, parse_retry_after, retry_delay,
};

pub const DEFAULT_SLACK_API_BASE: &str = "https://slack.com/api";

#[derive(Debug, Clone, Deserialize)]
struct SlackAuthTestResponse {
    ok: bool,
    user_id: Option<String>,
    error: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
struct SlackOpenSocketResponse {
    ok: bool,
    url: Option<String>,
    error: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
struct SlackChatMessageResponse {
    ok: bool,
    ts: Option<String>,
    channel: Option<String>,
    error: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SlackPostedMessage {
    pub channel: String,
    pub ts: String,
}

#[derive(Clone)]
pub struct SlackApiClient {
    http: reqwest::Client,
    api_base: String,
    app_token: String,
    bot_token: String,
    retry_max_attempts: usize,
    retry_base_delay_ms: u64,
}

impl SlackApiClient {
    pub fn new(
        api_base: String,
        app_token: String,
        bot_token: String,
        request_timeout_ms: u64,
        retry_max_attempts: usize,
        retry_base_delay_ms: u64,
    ) -> Result<Self> {
        let mut headers = reqwest::header::HeaderMap::new();
        headers.insert(
            reqwest::header::USER_AGENT,
            reqwest::header::HeaderValue::from_static("goosebot"),
        );
        headers.insert(
            reqwest::header::ACCEPT,
            reqwest::header::HeaderValue::from_static("application/json"),
        );
        let http = reqwest::Client::builder()
            .default_headers(headers)
            .timeout(Duration::from_millis(request_timeout_ms.max(1)))
            .build()
            .context("failed to create slack api client")?;

        Ok(Self {
            http,
            api_base: api_base.trim_end_matches('/').to_string(),
            app_token: app_token.trim().to_string(),
            bot_token: bot_token.trim().to_string(),
            retry_max_attempts: retry_max_attempts.max(1),
            retry_base_delay_ms: retry_base_delay_ms.max(1),
        })
    }

    /// Looks up the bot's own user id via `auth.test`.
    pub async fn resolve_bot_user_id(&self) -> Result<String> {
        let response: SlackAuthTestResponse = self
            .request_json("auth.test", || {
                self.http
                    .post(format!("{}/auth.test", self.api_base))
                    .bearer_auth(&self.bot_token)
            })
            .await?;
        ensure_slack_ok("auth.test", response.ok, response.error)?;
        response
            .user_id
            .filter(|value| !value.trim().is_empty())
            .ok_or_else(|| anyhow!("slack auth.test did not return user_id"))
    }

    /// Requests a fresh Socket Mode websocket URL with the app-level token.
    pub async fn open_socket_connection(&self) -> Result<String> {
        let response: SlackOpenSocketResponse = self
            .request_json("apps.connections.open", || {
                self.http
                    .post(format!("{}/apps.connections.open", self.api_base))
                    .bearer_auth(&self.app_token)
            })
            .await?;
        ensure_slack_ok("apps.connections.open", response.ok, response.error)?;
        response
            .url
            .filter(|value| !value.trim().is_empty())
            .ok_or_else(|| anyhow!("slack apps.connections.open did not return url"))
    }

    pub async fn post_message(
        &self,
        channel: &str,
        text: &str,
        thread_ts: Option<&str>,
    ) -> Result<SlackPostedMessage, NotificationError> {
        let mut payload = json!({
            "channel": channel,
            "text": text,
            "mrkdwn": true,
            "unfurl_links": false,
            "unfurl_media": false,
        });
        if let Some(thread_ts) = thread_ts.map(str::trim).filter(|value| !value.is_empty()) {
            payload["thread_ts"] = Value::String(thread_ts.to_string());
        }

        let response = self.call_chat_method("chat.postMessage", &payload).await?;
        let ts = response.ts.ok_or_else(|| NotificationError::Transport {
            method: "chat.postMessage".to_string(),
            message: "response missing ts".to_string(),
        })?;
        Ok(SlackPostedMessage {
            channel: response.channel.unwrap_or_else(|| channel.to_string()),
            ts,
        })
    }

    pub async fn update_message(
        &self,
        channel: &str,
        ts: &str,
        text: &str,
    ) -> Result<SlackPostedMessage, NotificationError> {
        let payload = json!({
            "channel": channel,
            "ts": ts,
            "text": text,
        });
        let response = self.call_chat_method("chat.update", &payload).await?;
        Ok(SlackPostedMessage {
            channel: response.channel.unwrap_or_else(|| channel.to_string()),
            ts: response.ts.unwrap_or_else(|| ts.to_string()),
        })
    }

    async fn call_chat_method(
        &self,
        method: &str,
        payload: &Value,
    ) -> Result<SlackChatMessageResponse, NotificationError> {
        let response: SlackChatMessageResponse = self
            .request_json(method, || {
                self.http
                    .post(format!("{}/{method}", self.api_base))
                    .bearer_auth(&self.bot_token)
                    .json(payload)
            })
            .await
            .map_err(|error| NotificationError::Transport {
                method: method.to_string(),
                message: format!("{error:#}"),
            })?;
        if !response.ok {
            return Err(NotificationError::Rejected {
                method: method.to_string(),
                error: slack_error_code(response.error),
            });
        }
        Ok(response)
    }

    /// Sends the request built by `builder` and decodes a 2xx JSON body.
    ///
    /// HTTP 429, 5xx and connect/timeout failures are resent up to
    /// `retry_max_attempts` times with exponential backoff, honouring
    /// `Retry-After`. Slack's own `ok: false` replies arrive as 200 and are
    /// returned untouched, so callers decide whether they are fatal. These are
    /// the only resends a message ever gets; the runtimes above the sink never
    /// repost.
    async fn request_json<T, F>(&self, operation: &str, mut builder: F) -> Result<T>
    where
        T: DeserializeOwned,
        F: FnMut() -> reqwest::RequestBuilder,
    {
        let mut attempt = 0_usize;
        loop {
            attempt = attempt.saturating_add(1);
            let response = builder()
                .header("x-goosebot-retry-attempt", attempt.saturating_sub(1).to_string())
                .send()
                .await;
            match response {
                Ok(response) => {
                    let status = response.status();
                    if status.is_success() {
                        return response
                            .json::<T>()
                            .await
                            .with_context(|| format!("failed to decode slack {operation}"));
                    }

                    let retry_after = parse_retry_after(response.headers());
                    let body = response.text().await.unwrap_or_default();
                    if attempt < self.retry_max_attempts
                        && is_retryable_slack_status(status.as_u16())
                    {
                        let delay = retry_delay(self.retry_base_delay_ms, attempt, retry_after);
                        tracing::warn!(
                            operation,
                            status = status.as_u16(),
                            attempt,
                            delay_ms = u64::try_from(delay.as_millis()).unwrap_or(u64::MAX),
                            "retrying slack api call"
                        );
                        tokio::time::sleep(delay).await;
                        continue;
                    }

                    bail!(
                        "slack api {operation} failed with status {}: {}",
                        status.as_u16(),
                        truncate_for_log(&body, 800)
                    );
                }
                Err(error) => {
                    if attempt < self.retry_max_attempts && is_retryable_transport_error(&error) {
                        tracing::warn!(operation, attempt, %error, "retrying slack api call");
                        tokio::time::sleep(retry_delay(self.retry_base_delay_ms, attempt, None))
                            .await;
                        continue;
                    }
                    return Err(error)
                        .with_context(|| format!("slack api {operation} request failed"));
                }
            }
        }
    }
}

fn slack_error_code(error: Option<String>) -> String {
    error.unwrap_or_else(|| "unknown error".to_string())
}

fn ensure_slack_ok(method: &str, ok: bool, error: Option<String>) -> Result<()> {
    if !ok {
        bail!("slack {method} failed: {}", slack_error_code(error));
    }
    Ok(())
}

#[async_trait]
impl NotificationSink for SlackApiClient {
    async fn post(
        &self,
        destination: &Destination,
        body: &str,
    ) -> Result<MessageRef, NotificationError> {
        let posted = self
            .post_message(
                &destination.channel_id,
                body,
                destination.thread_ts.as_deref(),
            )
            .await?;
        Ok(MessageRef {
            channel_id: posted.channel,
            ts: posted.ts,
        })
    }

    async fn update(&self, message: &MessageRef, body: &str) -> Result<(), NotificationError> {
        self.update_message(&message.channel_id, &message.ts, body)
            .await
            .map(|_| ())
    }
}

#[cfg(test)]
mod tests {
    use httpmock::prelude::*;
    use serde_json::json;

    use goosebot_runtime::{Destination, MessageRef, NotificationError, NotificationSink};

    use super::SlackApiClient;

    fn test_client(base_url: String) -> SlackApiClient {
        SlackApiClient::new(
            base_url,
            "xapp-test".to_string(),
            "xoxb-test".to_string(),
            3_000,
            3,
            5,
        )
        .expect("slack client")
    }

    #[tokio::test]
    async fn functional_post_message_sends_thread_and_mrkdwn_fields() {
        let server = MockServer::start();
        let post = server.mock(|when, then| {
            when.method(POST)
                .path("/chat.postMessage")
                .header("authorization", "Bearer xoxb-test")
                .body_includes("\"channel\":\"C1\"")
                .body_includes("\"thread_ts\":\"9.0\"")
                .body_includes("\"mrkdwn\":true");
            then.status(200)
                .json_body(json!({"ok": true, "channel": "C1", "ts": "10.5"}));
        });

        let client = test_client(server.base_url());
        let message = client
            .post(&Destination::thread("C1", "9.0"), "*bold*")
            .await
            .expect("post");

        post.assert();
        assert_eq!(
            message,
            MessageRef {
                channel_id: "C1".to_string(),
                ts: "10.5".to_string(),
            }
        );
    }

    #[tokio::test]
    async fn integration_post_message_retries_rate_limit_then_succeeds() {
        let server = MockServer::start();
        let first = server.mock(|when, then| {
            when.method(POST)
                .path("/chat.postMessage")
                .header("x-goosebot-retry-attempt", "0");
            then.status(429)
                .header("retry-after", "0")
                .body("rate limit");
        });
        let second = server.mock(|when, then| {
            when.method(POST)
                .path("/chat.postMessage")
                .header("x-goosebot-retry-attempt", "1");
            then.status(200)
                .json_body(json!({"ok": true, "channel": "C1", "ts": "1.2"}));
        });

        let client = test_client(server.base_url());
        let posted = client
            .post_message("C1", "hello", None)
            .await
            .expect("post after retry");

        assert_eq!(posted.ts, "1.2");
        first.assert_calls(1);
        second.assert_calls(1);
    }

    #[tokio::test]
    async fn regression_ok_false_maps_to_rejected_notification_error() {
        let server = MockServer::start();
        server.mock(|when, then| {
            when.method(POST).path("/chat.postMessage");
            then.status(200)
                .json_body(json!({"ok": false, "error": "channel_not_found"}));
        });

        let client = test_client(server.base_url());
        let error = client
            .post(&Destination::channel("CMISSING"), "hello")
            .await
            .expect_err("rejected post");

        match error {
            NotificationError::Rejected { method, error } => {
                assert_eq!(method, "chat.postMessage");
                assert_eq!(error, "channel_not_found");
            }
            other => panic!("expected rejection, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn regression_persistent_server_error_maps_to_transport_error() {
        let server = MockServer::start();
        let failing = server.mock(|when, then| {
            when.method(POST).path("/chat.update");
            then.status(503).body("unavailable");
        });

        let client = test_client(server.base_url());
        let error = client
            .update(
                &MessageRef {
                    channel_id: "C1".to_string(),
                    ts: "1.0".to_string(),
                },
                "done",
            )
            .await
            .expect_err("server error");

        failing.assert_calls(3);
        assert!(matches!(error, NotificationError::Transport { .. }));
        assert!(error.to_string().contains("status 503"));
    }

    #[tokio::test]
    async fn functional_update_message_targets_placeholder_ts() {
        let server = MockServer::start();
        let update = server.mock(|when, then| {
            when.method(POST)
                .path("/chat.update")
                .body_includes("\"ts\":\"2.0\"")
                .body_includes("\"text\":\"final summary\"");
            then.status(200)
                .json_body(json!({"ok": true, "channel": "C1", "ts": "2.0"}));
        });

        let client = test_client(server.base_url());
        let updated = client
            .update_message("C1", "2.0", "final summary")
            .await
            .expect("update");

        update.assert();
        assert_eq!(updated.ts, "2.0");
    }

    #[tokio::test]
    async fn functional_resolve_bot_user_id_and_socket_url() {
        let server = MockServer::start();
        server.mock(|when, then| {
            when.method(POST)
                .path("/auth.test")
                .header("authorization", "Bearer xoxb-test");
            then.status(200)
                .json_body(json!({"ok": true, "user_id": "UBOT"}));
        });
        server.mock(|when, then| {
            when.method(POST)
                .path("/apps.connections.open")
                .header("authorization", "Bearer xapp-test");
            then.status(200)
                .json_body(json!({"ok": true, "url": "wss://example.invalid/link"}));
        });

        let client = test_client(format!("{}/", server.base_url()));
        assert_eq!(client.resolve_bot_user_id().await.expect("auth"), "UBOT");
        assert_eq!(
            client.open_socket_connection().await.expect("socket url"),
            "wss://example.invalid/link"
        );
    }

    #[tokio::test]
    async fn regression_auth_test_failure_is_reported() {
        let server = MockServer::start();
        server.mock(|when, then| {
            when.method(POST).path("/auth.test");
            then.status(200)
                .json_body(json!({"ok": false, "error": "invalid_auth"}));
        });

        let error = test_client(server.base_url())
            .resolve_bot_user_id()
            .await
            .expect_err("auth failure");
        assert!(error.to_string().contains("invalid_auth"));
    }
}
