//! `goose` CLI invoker.
//!
//! Each call runs `goose run [--system <preamble>] --no-session -t <instruction>`
//! to completion and captures stdout/stderr as text. Exit status is reported,
//! never judged: goose can exit non-zero after printing a perfectly usable
//! summary.

use std::process::Stdio;
use std::time::Duration;

use async_trait::async_trait;
use goosebot_core::truncate_for_log;
use tokio::process::Command;

use crate::invocation::{AgentInvoker, InvocationError, InvocationRequest, InvocationResult};

const STDERR_LOG_MAX_CHARS: usize = 400;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GooseCliConfig {
    pub executable: String,
    /// Inserted right after the `run` subcommand.
    pub extra_args: Vec<String>,
    /// Optional upper bound on one run; `None` waits for the process indefinitely.
    pub timeout: Option<Duration>,
}

impl Default for GooseCliConfig {
    fn default() -> Self {
        Self {
            executable: "goose".to_string(),
            extra_args: Vec::new(),
            timeout: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GooseCliInvoker {
    config: GooseCliConfig,
}

impl GooseCliInvoker {
    pub fn new(config: GooseCliConfig) -> Self {
        Self { config }
    }

    fn build_args(&self, request: &InvocationRequest) -> Vec<String> {
        let mut args = vec!["run".to_string()];
        args.extend(self.config.extra_args.iter().cloned());
        if let Some(preamble) = &request.system_preamble {
            args.push("--system".to_string());
            args.push(preamble.clone());
        }
        args.push("--no-session".to_string());
        args.push("-t".to_string());
        args.push(request.instruction.clone());
        args
    }
}

async fn spawn_with_text_file_busy_retry(
    command: &mut Command,
    executable: &str,
) -> Result<tokio::process::Child, InvocationError> {
    const MAX_TEXT_FILE_BUSY_RETRIES: u32 = 5;
    const TEXT_FILE_BUSY_ERRNO: i32 = 26;
    let mut attempt = 0;
    loop {
        match command.spawn() {
            Ok(child) => return Ok(child),
            Err(error)
                if error.raw_os_error() == Some(TEXT_FILE_BUSY_ERRNO)
                    && attempt < MAX_TEXT_FILE_BUSY_RETRIES =>
            {
                attempt += 1;
                tokio::time::sleep(Duration::from_millis(25)).await;
            }
            Err(source) => {
                return Err(InvocationError::Spawn {
                    executable: executable.to_string(),
                    source,
                })
            }
        }
    }
}

#[cfg(unix)]
fn terminating_signal(status: &std::process::ExitStatus) -> Option<i32> {
    use std::os::unix::process::ExitStatusExt;
    status.signal()
}

#[cfg(not(unix))]
fn terminating_signal(_status: &std::process::ExitStatus) -> Option<i32> {
    None
}

#[async_trait]
impl AgentInvoker for GooseCliInvoker {
    async fn invoke(
        &self,
        request: &InvocationRequest,
    ) -> Result<InvocationResult, InvocationError> {
        let mut command = Command::new(&self.config.executable);
        command.kill_on_drop(true);
        command.args(self.build_args(request));
        command.stdin(Stdio::null());
        command.stdout(Stdio::piped());
        command.stderr(Stdio::piped());

        tracing::info!(
            executable = %self.config.executable,
            has_system_preamble = request.system_preamble.is_some(),
            instruction = %truncate_for_log(&request.instruction, 80),
            "running goose"
        );
        let child = spawn_with_text_file_busy_retry(&mut command, &self.config.executable).await?;

        let output = match self.config.timeout {
            Some(timeout) => tokio::time::timeout(timeout, child.wait_with_output())
                .await
                .map_err(|_| InvocationError::TimedOut { timeout })?,
            None => child.wait_with_output().await,
        }
        .map_err(InvocationError::Wait)?;

        let Some(exit_status) = output.status.code() else {
            return Err(InvocationError::Signal {
                signal: terminating_signal(&output.status),
            });
        };

        let stdout = String::from_utf8_lossy(&output.stdout).to_string();
        let stderr = String::from_utf8_lossy(&output.stderr).to_string();
        if !stderr.trim().is_empty() {
            tracing::debug!(
                stderr = %truncate_for_log(stderr.trim(), STDERR_LOG_MAX_CHARS),
                "goose stderr"
            );
        }
        if exit_status != 0 {
            tracing::warn!(
                exit_status,
                stdout_bytes = stdout.len(),
                stderr = %truncate_for_log(stderr.trim(), STDERR_LOG_MAX_CHARS),
                "goose exited with non-zero status"
            );
        }

        Ok(InvocationResult {
            stdout,
            stderr,
            exit_status: Some(exit_status),
        })
    }
}
