//! Invocation request/result types and the invoker seam.

use std::time::Duration;

use async_trait::async_trait;
use thiserror::Error;

/// One single-shot agent run: the task text plus an optional system directive.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InvocationRequest {
    pub instruction: String,
    pub system_preamble: Option<String>,
}

impl InvocationRequest {
    pub fn new(instruction: impl Into<String>) -> Self {
        Self {
            instruction: instruction.into(),
            system_preamble: None,
        }
    }

    pub fn with_system_preamble(mut self, system_preamble: impl Into<String>) -> Self {
        self.system_preamble = Some(system_preamble.into());
        self
    }
}

/// Captured output of a finished agent process.
///
/// A non-zero `exit_status` is still a successful invocation; callers judge
/// the outcome from `stdout`.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct InvocationResult {
    pub stdout: String,
    pub stderr: String,
    pub exit_status: Option<i32>,
}

impl InvocationResult {
    pub fn exited_successfully(&self) -> bool {
        self.exit_status == Some(0)
    }
}

#[derive(Debug, Error)]
pub enum InvocationError {
    #[error("failed to spawn agent '{executable}': {source}")]
    Spawn {
        executable: String,
        #[source]
        source: std::io::Error,
    },
    #[error("failed waiting for agent process: {0}")]
    Wait(#[source] std::io::Error),
    #[error("agent process terminated by signal {}", describe_signal(.signal))]
    Signal { signal: Option<i32> },
    #[error("agent process timed out after {}ms", .timeout.as_millis())]
    TimedOut { timeout: Duration },
}

fn describe_signal(signal: &Option<i32>) -> String {
    signal
        .map(|value| value.to_string())
        .unwrap_or_else(|| "unknown".to_string())
}

/// Runs the external agent once and returns its raw output.
#[async_trait]
pub trait AgentInvoker: Send + Sync {
    async fn invoke(&self, request: &InvocationRequest)
        -> Result<InvocationResult, InvocationError>;
}
