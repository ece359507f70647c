use std::path::PathBuf;

use clap::{ArgAction, Parser};
use goosebot_runtime::{
    DEFAULT_MAX_CONCURRENT_MENTION_RUNS, DEFAULT_MENTION_OUTPUT_PATH,
    DEFAULT_MENTION_SYSTEM_PROMPT_PATH, DEFAULT_RELEASE_OUTPUT_PATH,
};
use goosebot_slack_runtime::{
    DEFAULT_SLACK_API_BASE, DEFAULT_SLACK_MAX_EVENT_AGE_SECONDS, DEFAULT_SLACK_PROCESSED_EVENT_CAP,
};

fn parse_positive_usize(value: &str) -> Result<usize, String> {
    let parsed = value
        .parse::<usize>()
        .map_err(|error| format!("failed to parse integer: {error}"))?;
    if parsed == 0 {
        return Err("value must be greater than 0".to_string());
    }
    Ok(parsed)
}

fn parse_positive_u64(value: &str) -> Result<u64, String> {
    let parsed = value
        .parse::<u64>()
        .map_err(|error| format!("failed to parse integer: {error}"))?;
    if parsed == 0 {
        return Err("value must be greater than 0".to_string());
    }
    Ok(parsed)
}

#[derive(Debug, Parser)]
#[command(
    name = "goosebot",
    about = "Slack bot that relays scheduled and on-demand goose runs into a channel",
    version
)]
pub(crate) struct Cli {
    #[arg(
        long = "slack-bot-token",
        env = "SLACK_BOT_TOKEN",
        hide_env_values = true,
        help = "Slack bot token for Web API calls (xoxb-...)"
    )]
    pub(crate) slack_bot_token: String,

    #[arg(
        long = "slack-app-token",
        env = "SLACK_APP_TOKEN",
        hide_env_values = true,
        help = "Slack Socket Mode app token (xapp-...)"
    )]
    pub(crate) slack_app_token: String,

    #[arg(
        long = "slack-channel-id",
        env = "SLACK_CHANNEL_ID",
        help = "Channel that receives scheduled release summaries. Without it the scheduler only logs its results"
    )]
    pub(crate) slack_channel_id: Option<String>,

    #[arg(
        long = "slack-bot-user-id",
        env = "GOOSEBOT_SLACK_BOT_USER_ID",
        help = "Bot user id used to strip self-mentions and ignore own messages. Resolved via auth.test when omitted"
    )]
    pub(crate) slack_bot_user_id: Option<String>,

    #[arg(
        long = "slack-api-base",
        env = "GOOSEBOT_SLACK_API_BASE",
        default_value = DEFAULT_SLACK_API_BASE,
        help = "Slack Web API base URL"
    )]
    pub(crate) slack_api_base: String,

    #[arg(
        long = "slack-request-timeout-ms",
        env = "GOOSEBOT_SLACK_REQUEST_TIMEOUT_MS",
        default_value_t = 10_000,
        value_parser = parse_positive_u64,
        help = "HTTP timeout for Slack Web API requests in milliseconds"
    )]
    pub(crate) slack_request_timeout_ms: u64,

    #[arg(
        long = "slack-retry-max-attempts",
        env = "GOOSEBOT_SLACK_RETRY_MAX_ATTEMPTS",
        default_value_t = 3,
        value_parser = parse_positive_usize,
        help = "Maximum attempts per Slack Web API request for 429 and 5xx responses (1 disables retries)"
    )]
    pub(crate) slack_retry_max_attempts: usize,

    #[arg(
        long = "slack-retry-base-delay-ms",
        env = "GOOSEBOT_SLACK_RETRY_BASE_DELAY_MS",
        default_value_t = 500,
        help = "Base backoff delay for Slack Web API retries in milliseconds"
    )]
    pub(crate) slack_retry_base_delay_ms: u64,

    #[arg(
        long = "slack-reconnect-delay-ms",
        env = "GOOSEBOT_SLACK_RECONNECT_DELAY_MS",
        default_value_t = 1_000,
        value_parser = parse_positive_u64,
        help = "Delay before reopening the Socket Mode connection after it drops"
    )]
    pub(crate) slack_reconnect_delay_ms: u64,

    #[arg(
        long = "slack-processed-event-cap",
        env = "GOOSEBOT_SLACK_PROCESSED_EVENT_CAP",
        default_value_t = DEFAULT_SLACK_PROCESSED_EVENT_CAP,
        value_parser = parse_positive_usize,
        help = "Number of recent Slack event keys remembered for duplicate suppression"
    )]
    pub(crate) slack_processed_event_cap: usize,

    #[arg(
        long = "slack-max-event-age-seconds",
        env = "GOOSEBOT_SLACK_MAX_EVENT_AGE_SECONDS",
        default_value_t = DEFAULT_SLACK_MAX_EVENT_AGE_SECONDS,
        help = "Ignore Slack events older than this many seconds (0 disables age checks)"
    )]
    pub(crate) slack_max_event_age_seconds: u64,

    #[arg(
        long = "goose-bin",
        env = "GOOSEBOT_GOOSE_BIN",
        default_value = "goose",
        help = "goose executable name or path"
    )]
    pub(crate) goose_bin: String,

    #[arg(
        long = "goose-extra-arg",
        env = "GOOSEBOT_GOOSE_EXTRA_ARGS",
        value_delimiter = ',',
        allow_hyphen_values = true,
        help = "Extra argument inserted after `goose run`. Repeatable; the env var takes a comma-separated list"
    )]
    pub(crate) goose_extra_arg: Vec<String>,

    #[arg(
        long = "goose-timeout-seconds",
        env = "GOOSEBOT_GOOSE_TIMEOUT_SECONDS",
        default_value_t = 0,
        help = "Kill a goose run after this many seconds (0 waits indefinitely)"
    )]
    pub(crate) goose_timeout_seconds: u64,

    #[arg(
        long = "poll-interval-seconds",
        env = "GOOSEBOT_POLL_INTERVAL_SECONDS",
        default_value_t = 60,
        value_parser = parse_positive_u64,
        help = "Pause between scheduled release status runs"
    )]
    pub(crate) poll_interval_seconds: u64,

    #[arg(
        long = "release-instruction-file",
        env = "GOOSEBOT_RELEASE_INSTRUCTION_FILE",
        value_name = "path",
        help = "File holding the scheduled instruction. Defaults to the built-in OKD release status prompt"
    )]
    pub(crate) release_instruction_file: Option<PathBuf>,

    #[arg(
        long = "release-output-path",
        env = "GOOSEBOT_RELEASE_OUTPUT_PATH",
        value_name = "path",
        default_value = DEFAULT_RELEASE_OUTPUT_PATH,
        help = "Scratch file overwritten with each scheduled run's output"
    )]
    pub(crate) release_output_path: PathBuf,

    #[arg(
        long = "mention-system-prompt-file",
        env = "GOOSEBOT_MENTION_SYSTEM_PROMPT_FILE",
        value_name = "path",
        default_value = DEFAULT_MENTION_SYSTEM_PROMPT_PATH,
        help = "System preamble passed to goose for mention prompts; re-read on every mention"
    )]
    pub(crate) mention_system_prompt_file: PathBuf,

    #[arg(
        long = "mention-output-path",
        env = "GOOSEBOT_MENTION_OUTPUT_PATH",
        value_name = "path",
        default_value = DEFAULT_MENTION_OUTPUT_PATH,
        help = "Scratch file overwritten with the latest mention run's output"
    )]
    pub(crate) mention_output_path: PathBuf,

    #[arg(
        long = "max-concurrent-mentions",
        env = "GOOSEBOT_MAX_CONCURRENT_MENTIONS",
        default_value_t = DEFAULT_MAX_CONCURRENT_MENTION_RUNS,
        value_parser = parse_positive_usize,
        help = "Maximum goose runs executing at once for mentions; extra mentions wait their turn"
    )]
    pub(crate) max_concurrent_mentions: usize,

    #[arg(
        long = "disable-scheduler",
        env = "GOOSEBOT_DISABLE_SCHEDULER",
        default_value_t = false,
        action = ArgAction::Set,
        num_args = 0..=1,
        require_equals = true,
        default_missing_value = "true",
        help = "Only answer mentions; skip the scheduled release status loop"
    )]
    pub(crate) disable_scheduler: bool,
}
