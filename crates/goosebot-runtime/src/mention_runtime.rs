//! Mention relay: turns an `@bot <prompt>` message into a goose run and edits
//! the placeholder reply with the extracted `<slack>` block.

use std::path::PathBuf;
use std::sync::Arc;

use goosebot_agent::{extract_slack_block, AgentInvoker, InvocationRequest};
use goosebot_core::{truncate_for_log, ScratchSlot};
use tokio::sync::Semaphore;

use crate::notification::{Destination, MessageRef, NotificationSink};

pub const DEFAULT_MENTION_SYSTEM_PROMPT_PATH: &str = "custom-prompt.txt";
pub const DEFAULT_MENTION_OUTPUT_PATH: &str = "output/goose-prompt-output.txt";
pub const DEFAULT_MAX_CONCURRENT_MENTION_RUNS: usize = 2;

pub const MENTION_USAGE_HINT: &str = "Please provide a prompt after mentioning me. For example: `@botname summarize the latest OKD release`";
pub const MENTION_BLOCK_MISSING_MESSAGE: &str =
    "Could not find a <slack> block in the output from your prompt.";
pub const MENTION_FAILURE_MESSAGE: &str = "Failed to run goose with your prompt.";

pub fn mention_in_progress_message(instruction: &str) -> String {
    format!("Running goose with your prompt: {instruction}")
}

/// Removes every `<@bot_user_id>` token from `text` and trims the remainder.
pub fn strip_self_mention(text: &str, bot_user_id: &str) -> String {
    let mention = format!("<@{bot_user_id}>");
    text.replace(&mention, "").trim().to_string()
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MentionEvent {
    pub channel_id: String,
    pub ts: String,
    pub thread_ts: Option<String>,
    pub user_id: String,
    pub text: String,
}

impl MentionEvent {
    /// Replies land in the mention's channel, inside its thread when it has one.
    pub fn reply_destination(&self) -> Destination {
        Destination {
            channel_id: self.channel_id.clone(),
            thread_ts: self.thread_ts.clone(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MentionHandlerConfig {
    pub bot_user_id: String,
    pub system_prompt_path: PathBuf,
    pub transcript_slot: Option<ScratchSlot>,
    pub max_concurrent_runs: usize,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MentionOutcome {
    UsageHintSent,
    Answered,
    BlockMissing,
    InvocationFailed,
    /// The placeholder could not be posted, so nothing else was attempted.
    PlaceholderFailed,
    /// The final reply (or usage hint) was rejected by the sink.
    NotificationFailed,
}

impl MentionOutcome {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::UsageHintSent => "usage_hint_sent",
            Self::Answered => "answered",
            Self::BlockMissing => "block_missing",
            Self::InvocationFailed => "invocation_failed",
            Self::PlaceholderFailed => "placeholder_failed",
            Self::NotificationFailed => "notification_failed",
        }
    }
}

/// Handles mention events; cheap to clone into one task per event.
#[derive(Clone)]
pub struct MentionHandler {
    config: Arc<MentionHandlerConfig>,
    invoker: Arc<dyn AgentInvoker>,
    sink: Arc<dyn NotificationSink>,
    run_permits: Arc<Semaphore>,
}

impl MentionHandler {
    pub fn new(
        config: MentionHandlerConfig,
        invoker: Arc<dyn AgentInvoker>,
        sink: Arc<dyn NotificationSink>,
    ) -> Self {
        let permits = config.max_concurrent_runs.max(1);
        Self {
            config: Arc::new(config),
            invoker,
            sink,
            run_permits: Arc::new(Semaphore::new(permits)),
        }
    }

    pub fn bot_user_id(&self) -> &str {
        &self.config.bot_user_id
    }

    pub async fn handle(&self, event: &MentionEvent) -> MentionOutcome {
        let destination = event.reply_destination();
        let instruction = strip_self_mention(&event.text, &self.config.bot_user_id);
        if instruction.is_empty() {
            return match self.sink.post(&destination, MENTION_USAGE_HINT).await {
                Ok(_) => MentionOutcome::UsageHintSent,
                Err(error) => {
                    tracing::error!(channel_id = %event.channel_id, %error, "usage hint post failed");
                    MentionOutcome::NotificationFailed
                }
            };
        }

        let placeholder = match self
            .sink
            .post(&destination, &mention_in_progress_message(&instruction))
            .await
        {
            Ok(message) => message,
            Err(error) => {
                tracing::error!(channel_id = %event.channel_id, %error, "placeholder post failed");
                return MentionOutcome::PlaceholderFailed;
            }
        };

        let _permit = match self.run_permits.acquire().await {
            Ok(permit) => permit,
            Err(error) => {
                tracing::error!(%error, "mention run limiter closed");
                return self.reply_failure(&destination).await;
            }
        };

        let system_preamble = match tokio::fs::read_to_string(&self.config.system_prompt_path).await
        {
            Ok(preamble) => preamble,
            Err(error) => {
                tracing::error!(
                    path = %self.config.system_prompt_path.display(),
                    %error,
                    "failed to read mention system prompt"
                );
                return self.reply_failure(&destination).await;
            }
        };

        let request = InvocationRequest::new(instruction).with_system_preamble(system_preamble);
        let result = match self.invoker.invoke(&request).await {
            Ok(result) => result,
            Err(error) => {
                tracing::error!(channel_id = %event.channel_id, %error, "mention goose run failed");
                return self.reply_failure(&destination).await;
            }
        };

        let output = result.stdout.trim();
        self.record_transcript(output);
        if output.is_empty() {
            tracing::warn!(channel_id = %event.channel_id, "mention goose run produced no output");
            return self.reply_failure(&destination).await;
        }

        match extract_slack_block(output) {
            Some(block) => self.replace_placeholder(&placeholder, &block).await,
            None => {
                tracing::warn!(
                    channel_id = %event.channel_id,
                    output = %truncate_for_log(output, 200),
                    "mention goose output has no <slack> block"
                );
                match self
                    .sink
                    .post(&destination, MENTION_BLOCK_MISSING_MESSAGE)
                    .await
                {
                    Ok(_) => MentionOutcome::BlockMissing,
                    Err(error) => {
                        tracing::error!(%error, "missing-block reply failed");
                        MentionOutcome::NotificationFailed
                    }
                }
            }
        }
    }

    async fn replace_placeholder(&self, placeholder: &MessageRef, block: &str) -> MentionOutcome {
        match self.sink.update(placeholder, block).await {
            Ok(()) => MentionOutcome::Answered,
            Err(error) => {
                tracing::error!(
                    channel_id = %placeholder.channel_id,
                    ts = %placeholder.ts,
                    %error,
                    "placeholder update failed"
                );
                MentionOutcome::NotificationFailed
            }
        }
    }

    async fn reply_failure(&self, destination: &Destination) -> MentionOutcome {
        match self.sink.post(destination, MENTION_FAILURE_MESSAGE).await {
            Ok(_) => MentionOutcome::InvocationFailed,
            Err(error) => {
                tracing::error!(%error, "failure reply post failed");
                MentionOutcome::NotificationFailed
            }
        }
    }

    fn record_transcript(&self, output: &str) {
        let Some(slot) = &self.config.transcript_slot else {
            return;
        };
        if let Err(error) = slot.overwrite(output) {
            tracing::warn!(error = %format!("{error:#}"), "failed to record mention transcript");
        }
    }
}
