//! Scheduled OKD release poll.
//!
//! Every cycle runs goose with the fixed release instruction, stores the raw
//! output in the scratch slot, extracts the `<slack>` block from what was
//! stored, and posts the result (or a fallback) to the broadcast channel.
//! Cycles are separated by a fixed pause measured from the end of the
//! previous post, so the period drifts with goose runtime.

use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use goosebot_agent::{extract_slack_block, AgentInvoker, InvocationRequest};
use goosebot_core::{truncate_for_log, ScratchSlot};
use tokio::sync::oneshot;
use tokio::task::JoinHandle;

use crate::notification::{Destination, NotificationSink};

pub const DEFAULT_RELEASE_POLL_INTERVAL: Duration = Duration::from_secs(60);
pub const DEFAULT_RELEASE_OUTPUT_PATH: &str = "output/OKD-release-output.txt";
pub const RELEASE_BLOCK_MISSING_MESSAGE: &str =
    "There was an error reading the OKD release output. Please try again.";

pub const DEFAULT_RELEASE_STATUS_INSTRUCTION: &str = concat!(
    "grab the latest release in the 4-scos-next for OKD. ",
    "If it's accepted, write a green check mark. If it's failed, give me a red x and then tell me the jobs that have failed. ",
    "Do NOT run LatestAcceptedRelease or LatestRejectedRelease, only run LatestRelease.",
    "AFTER running all your functions, wrap a summary in a <slack> tag. This will be used for parsing the output, so BE SURE to do this. ",
    "Bold whether or not the release has been rejected or accepted within the slack tag. ",
    "This is an example of the output:\n\n",
    "<slack>\n",
    "*OKD Release: <https://amd64.origin.releases.ci.openshift.org/releasetag/4.20.0-okd-scos.ec.0|4.20.0-okd-scos.ec.0>*\n",
    "*✅ Accepted*/*❌ Rejected**\n\n",
    "The following jobs have failed:\n\n",
    "- upgrade: <https://prow.ci.openshift.org/view/gs/test-platform-results/logs/release-openshift-okd-scos-installer-e2e-aws-upgrade-from-scos-next/xxxxxxxxxxxxxxx>\n",
    "</slack>\n",
);

const LOG_BODY_MAX_CHARS: usize = 200;

pub fn release_failure_message(error: &str) -> String {
    format!("Error reading OKD release output: {error}")
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReleasePollConfig {
    pub instruction: String,
    pub interval: Duration,
    pub scratch_slot: ScratchSlot,
    /// `None` keeps the poll running but only logs each cycle's result.
    pub broadcast_channel_id: Option<String>,
}

impl Default for ReleasePollConfig {
    fn default() -> Self {
        Self {
            instruction: DEFAULT_RELEASE_STATUS_INSTRUCTION.to_string(),
            interval: DEFAULT_RELEASE_POLL_INTERVAL,
            scratch_slot: ScratchSlot::new(DEFAULT_RELEASE_OUTPUT_PATH),
            broadcast_channel_id: None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReleaseBodyKind {
    Summary,
    MissingBlock,
    Failure,
}

impl ReleaseBodyKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Summary => "summary",
            Self::MissingBlock => "missing_block",
            Self::Failure => "failure",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReleaseDelivery {
    Sent { ts: String },
    Suppressed,
    Failed { error: String },
}

impl ReleaseDelivery {
    fn as_str(&self) -> &'static str {
        match self {
            Self::Sent { .. } => "sent",
            Self::Suppressed => "suppressed",
            Self::Failed { .. } => "failed",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReleasePollCycleReport {
    pub tick: u64,
    pub body_kind: ReleaseBodyKind,
    pub body: String,
    pub delivery: ReleaseDelivery,
}

/// Runs one poll cycle. Never fails: every problem becomes a fallback body
/// or a failed delivery recorded on the report.
pub async fn run_release_poll_cycle(
    config: &ReleasePollConfig,
    invoker: &dyn AgentInvoker,
    sink: &dyn NotificationSink,
    tick: u64,
) -> ReleasePollCycleReport {
    let (body_kind, body) = compose_release_body(config, invoker).await;

    let delivery = match config
        .broadcast_channel_id
        .as_deref()
        .map(str::trim)
        .filter(|channel| !channel.is_empty())
    {
        Some(channel_id) => match sink.post(&Destination::channel(channel_id), &body).await {
            Ok(message) => ReleaseDelivery::Sent { ts: message.ts },
            Err(error) => {
                tracing::error!(tick, channel_id, %error, "scheduled notification failed");
                ReleaseDelivery::Failed {
                    error: error.to_string(),
                }
            }
        },
        None => {
            tracing::info!(
                tick,
                body = %truncate_for_log(&body, LOG_BODY_MAX_CHARS),
                "broadcast channel not configured; suppressing scheduled notification"
            );
            ReleaseDelivery::Suppressed
        }
    };

    ReleasePollCycleReport {
        tick,
        body_kind,
        body,
        delivery,
    }
}

async fn compose_release_body(
    config: &ReleasePollConfig,
    invoker: &dyn AgentInvoker,
) -> (ReleaseBodyKind, String) {
    let result = match invoker
        .invoke(&InvocationRequest::new(config.instruction.clone()))
        .await
    {
        Ok(result) => result,
        Err(error) => {
            tracing::error!(%error, "scheduled goose run failed");
            return (
                ReleaseBodyKind::Failure,
                release_failure_message(&error.to_string()),
            );
        }
    };

    match persist_and_extract(&config.scratch_slot, &result.stdout) {
        Ok(Some(block)) => (ReleaseBodyKind::Summary, block),
        Ok(None) => {
            tracing::warn!(
                path = %config.scratch_slot.path().display(),
                "scheduled goose output has no <slack> block"
            );
            (
                ReleaseBodyKind::MissingBlock,
                RELEASE_BLOCK_MISSING_MESSAGE.to_string(),
            )
        }
        Err(error) => {
            tracing::error!(error = %format!("{error:#}"), "scheduled output scratch slot failed");
            (
                ReleaseBodyKind::Failure,
                release_failure_message(&format!("{error:#}")),
            )
        }
    }
}

fn persist_and_extract(slot: &ScratchSlot, stdout: &str) -> Result<Option<String>> {
    slot.overwrite(stdout.trim())
        .context("failed to persist scheduled goose output")?;
    let persisted = slot.read()?;
    Ok(extract_slack_block(&persisted))
}

/// Owns the background poll task.
pub struct ReleasePollHandle {
    shutdown_tx: Option<oneshot::Sender<()>>,
    task: Option<JoinHandle<()>>,
}

impl ReleasePollHandle {
    pub fn is_running(&self) -> bool {
        self.task
            .as_ref()
            .map(|task| !task.is_finished())
            .unwrap_or(false)
    }

    /// Stops the loop. A goose run in flight is dropped, which kills the child.
    pub async fn shutdown(&mut self) {
        if let Some(shutdown_tx) = self.shutdown_tx.take() {
            let _ = shutdown_tx.send(());
        }
        if let Some(task) = self.task.take() {
            let _ = task.await;
        }
    }
}

pub fn start_release_poll_scheduler(
    config: ReleasePollConfig,
    invoker: Arc<dyn AgentInvoker>,
    sink: Arc<dyn NotificationSink>,
) -> Result<ReleasePollHandle> {
    if config.interval.is_zero() {
        anyhow::bail!("release poll interval must be greater than zero");
    }
    let handle = tokio::runtime::Handle::try_current()
        .context("release poll scheduler requires an active Tokio runtime")?;

    tracing::info!(
        interval_ms = u64::try_from(config.interval.as_millis()).unwrap_or(u64::MAX),
        scratch_slot = %config.scratch_slot.path().display(),
        broadcast_channel = config.broadcast_channel_id.as_deref().unwrap_or("none"),
        "release poll scheduler started"
    );

    let (shutdown_tx, shutdown_rx) = oneshot::channel::<()>();
    let task = handle.spawn(run_release_poll_loop(config, invoker, sink, shutdown_rx));
    Ok(ReleasePollHandle {
        shutdown_tx: Some(shutdown_tx),
        task: Some(task),
    })
}

async fn run_release_poll_loop(
    config: ReleasePollConfig,
    invoker: Arc<dyn AgentInvoker>,
    sink: Arc<dyn NotificationSink>,
    mut shutdown_rx: oneshot::Receiver<()>,
) {
    let mut tick = 0_u64;
    loop {
        tick = tick.saturating_add(1);
        let report = tokio::select! {
            report = run_release_poll_cycle(&config, invoker.as_ref(), sink.as_ref(), tick) => report,
            _ = &mut shutdown_rx => break,
        };
        tracing::info!(
            tick = report.tick,
            body_kind = report.body_kind.as_str(),
            delivery = report.delivery.as_str(),
            "release poll cycle finished"
        );

        tokio::select! {
            _ = tokio::time::sleep(config.interval) => {}
            _ = &mut shutdown_rx => break,
        }
    }
    tracing::info!(ticks = tick, "release poll scheduler stopped");
}
