//! Slack transport for goosebot.
//!
//! Implements the notification sink on top of the Slack Web API and runs the
//! Socket Mode loop that feeds `app_mention` events to the mention relay.

mod slack_api_client;
mod slack_helpers;
mod slack_runtime;

pub use slack_api_client::{SlackApiClient, SlackPostedMessage, DEFAULT_SLACK_API_BASE};
pub use slack_runtime::{
    run_slack_bridge, SlackBridgeConfig, DEFAULT_SLACK_MAX_EVENT_AGE_SECONDS,
    DEFAULT_SLACK_PROCESSED_EVENT_CAP, DEFAULT_SLACK_RECONNECT_DELAY,
};
