//! Startup wiring: validates CLI input into one immutable [`BridgeConfig`]
//! and runs the scheduler next to the Socket Mode bridge.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use anyhow::{bail, Context, Result};
use goosebot_agent::{AgentInvoker, GooseCliConfig, GooseCliInvoker};
use goosebot_core::ScratchSlot;
use goosebot_runtime::{
    start_release_poll_scheduler, MentionHandler, MentionHandlerConfig, NotificationSink,
    ReleasePollConfig, DEFAULT_RELEASE_STATUS_INSTRUCTION,
};
use goosebot_slack_runtime::{run_slack_bridge, SlackApiClient, SlackBridgeConfig};

use crate::cli_args::Cli;

#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct SlackConnectionConfig {
    pub(crate) api_base: String,
    pub(crate) app_token: String,
    pub(crate) bot_token: String,
    pub(crate) bot_user_id: Option<String>,
    pub(crate) request_timeout_ms: u64,
    pub(crate) retry_max_attempts: usize,
    pub(crate) retry_base_delay_ms: u64,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct MentionSettings {
    pub(crate) system_prompt_path: PathBuf,
    pub(crate) output_path: PathBuf,
    pub(crate) max_concurrent_runs: usize,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct BridgeConfig {
    pub(crate) slack: SlackConnectionConfig,
    pub(crate) socket: SlackBridgeConfig,
    pub(crate) goose: GooseCliConfig,
    /// `None` when the scheduler is disabled.
    pub(crate) release_poll: Option<ReleasePollConfig>,
    pub(crate) mention: MentionSettings,
}

impl BridgeConfig {
    pub(crate) fn from_cli(cli: &Cli) -> Result<Self> {
        let bot_token = require_token(&cli.slack_bot_token, "--slack-bot-token")?;
        let app_token = require_token(&cli.slack_app_token, "--slack-app-token")?;

        let release_poll = if cli.disable_scheduler {
            None
        } else {
            let instruction = match &cli.release_instruction_file {
                Some(path) => load_instruction_file(path)?,
                None => DEFAULT_RELEASE_STATUS_INSTRUCTION.to_string(),
            };
            if cli.poll_interval_seconds == 0 {
                bail!("--poll-interval-seconds must be greater than 0");
            }
            Some(ReleasePollConfig {
                instruction,
                interval: Duration::from_secs(cli.poll_interval_seconds),
                scratch_slot: ScratchSlot::new(cli.release_output_path.clone()),
                broadcast_channel_id: non_blank(cli.slack_channel_id.as_deref()),
            })
        };

        Ok(Self {
            slack: SlackConnectionConfig {
                api_base: cli.slack_api_base.trim().to_string(),
                app_token,
                bot_token,
                bot_user_id: non_blank(cli.slack_bot_user_id.as_deref()),
                request_timeout_ms: cli.slack_request_timeout_ms,
                retry_max_attempts: cli.slack_retry_max_attempts,
                retry_base_delay_ms: cli.slack_retry_base_delay_ms,
            },
            socket: SlackBridgeConfig {
                reconnect_delay: Duration::from_millis(cli.slack_reconnect_delay_ms),
                processed_event_cap: cli.slack_processed_event_cap,
                max_event_age_seconds: cli.slack_max_event_age_seconds,
            },
            goose: GooseCliConfig {
                executable: cli.goose_bin.trim().to_string(),
                extra_args: cli
                    .goose_extra_arg
                    .iter()
                    .map(|arg| arg.trim())
                    .filter(|arg| !arg.is_empty())
                    .map(str::to_string)
                    .collect(),
                timeout: (cli.goose_timeout_seconds > 0)
                    .then(|| Duration::from_secs(cli.goose_timeout_seconds)),
            },
            release_poll,
            mention: MentionSettings {
                system_prompt_path: cli.mention_system_prompt_file.clone(),
                output_path: cli.mention_output_path.clone(),
                max_concurrent_runs: cli.max_concurrent_mentions,
            },
        })
    }

    pub(crate) fn mention_handler_config(&self, bot_user_id: String) -> MentionHandlerConfig {
        MentionHandlerConfig {
            bot_user_id,
            system_prompt_path: self.mention.system_prompt_path.clone(),
            transcript_slot: Some(ScratchSlot::new(self.mention.output_path.clone())),
            max_concurrent_runs: self.mention.max_concurrent_runs,
        }
    }
}

fn require_token(value: &str, flag: &str) -> Result<String> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        bail!("{flag} cannot be empty");
    }
    Ok(trimmed.to_string())
}

fn non_blank(value: Option<&str>) -> Option<String> {
    value
        .map(str::trim)
        .filter(|value| !value.is_empty())
        .map(str::to_string)
}

fn load_instruction_file(path: &Path) -> Result<String> {
    let raw = std::fs::read_to_string(path)
        .with_context(|| format!("failed to read release instruction file {}", path.display()))?;
    let instruction = raw.trim();
    if instruction.is_empty() {
        bail!("release instruction file {} is empty", path.display());
    }
    Ok(instruction.to_string())
}

pub(crate) async fn run_bridge(config: BridgeConfig) -> Result<()> {
    let client = SlackApiClient::new(
        config.slack.api_base.clone(),
        config.slack.app_token.clone(),
        config.slack.bot_token.clone(),
        config.slack.request_timeout_ms,
        config.slack.retry_max_attempts,
        config.slack.retry_base_delay_ms,
    )?;
    let bot_user_id = match &config.slack.bot_user_id {
        Some(bot_user_id) => bot_user_id.clone(),
        None => client
            .resolve_bot_user_id()
            .await
            .context("failed to resolve slack bot user id")?,
    };
    tracing::info!(%bot_user_id, goose_bin = %config.goose.executable, "goosebot starting");

    let invoker: Arc<dyn AgentInvoker> = Arc::new(GooseCliInvoker::new(config.goose.clone()));
    let sink: Arc<dyn NotificationSink> = Arc::new(client.clone());

    let mut scheduler = match &config.release_poll {
        Some(release_poll) => {
            if release_poll.broadcast_channel_id.is_none() {
                tracing::warn!("no broadcast channel configured; release summaries will only be logged");
            }
            Some(start_release_poll_scheduler(
                release_poll.clone(),
                Arc::clone(&invoker),
                Arc::clone(&sink),
            )?)
        }
        None => {
            tracing::info!("release poll scheduler disabled");
            None
        }
    };

    let handler = MentionHandler::new(config.mention_handler_config(bot_user_id), invoker, sink);
    let result = run_slack_bridge(config.socket.clone(), client, handler).await;

    if let Some(handle) = scheduler.as_mut() {
        handle.shutdown().await;
    }
    result
}
