//! External agent invocation and outcome classification.

use std::path::PathBuf;
use std::process::Stdio;
use std::time::Duration;

use async_trait::async_trait;
use herald_slack::mentions_rate_limit;
use thiserror::Error;
use tokio::process::Command;
use tracing::debug;

/// Output fragments that confirm the agent posted something.
const SUCCESS_MARKERS: &[&str] = &["✅", "message sent", "posted to slack", "\"ok\": true"];

/// Raw result of one agent run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AgentInvocation {
    /// `None` when the process was killed by a signal.
    pub exit_code: Option<i32>,
    /// stdout followed by stderr.
    pub output: String,
}

#[derive(Error, Debug)]
pub enum AgentError {
    #[error("agent timed out after {}s", .0.as_secs())]
    Timeout(Duration),

    #[error("failed to run agent: {0}")]
    Spawn(#[from] std::io::Error),
}

/// The external autonomous agent that performs the actual replies.
#[async_trait]
pub trait AgentRunner: Send + Sync {
    async fn invoke(
        &self,
        instruction: &str,
        timeout: Duration,
    ) -> Result<AgentInvocation, AgentError>;
}

/// Runs the agent as a child process, passing the instruction as the last argument.
#[derive(Debug, Clone)]
pub struct CliAgentRunner {
    command: String,
    args: Vec<String>,
    workdir: PathBuf,
}

impl CliAgentRunner {
    pub fn new(command: impl Into<String>, args: Vec<String>, workdir: impl Into<PathBuf>) -> Self {
        Self {
            command: command.into(),
            args,
            workdir: workdir.into(),
        }
    }
}

#[async_trait]
impl AgentRunner for CliAgentRunner {
    async fn invoke(
        &self,
        instruction: &str,
        timeout: Duration,
    ) -> Result<AgentInvocation, AgentError> {
        let child = Command::new(&self.command)
            .args(&self.args)
            .arg(instruction)
            .current_dir(&self.workdir)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()?;

        debug!(command = %self.command, pid = ?child.id(), "Agent started");

        let output = match tokio::time::timeout(timeout, child.wait_with_output()).await {
            Ok(result) => result?,
            Err(_) => return Err(AgentError::Timeout(timeout)),
        };

        let mut combined = String::from_utf8_lossy(&output.stdout).into_owned();
        let stderr = String::from_utf8_lossy(&output.stderr);
        if !stderr.trim().is_empty() {
            if !combined.is_empty() && !combined.ends_with('\n') {
                combined.push('\n');
            }
            combined.push_str(&stderr);
        }

        Ok(AgentInvocation {
            exit_code: output.status.code(),
            output: combined,
        })
    }
}

/// What the dispatcher concludes from one batched invocation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DispatchOutcome {
    /// The agent returned. `confirmed` is set when its output carries a
    /// success marker; otherwise success is assumed.
    Success { confirmed: bool },
    Timeout,
    /// The agent reported that the bus rate-limited it.
    RateLimited,
    /// The agent could not be run at all.
    UnknownFailure,
}

impl DispatchOutcome {
    pub fn label(&self) -> &'static str {
        match self {
            DispatchOutcome::Success { confirmed: true } => "success",
            DispatchOutcome::Success { confirmed: false } => "unconfirmed",
            DispatchOutcome::Timeout => "timeout",
            DispatchOutcome::RateLimited => "rate_limited",
            DispatchOutcome::UnknownFailure => "failed",
        }
    }
}

/// Map a raw invocation result onto a [`DispatchOutcome`].
///
/// All inspection of agent output happens here.
pub fn classify_invocation(result: &Result<AgentInvocation, AgentError>) -> DispatchOutcome {
    match result {
        Err(AgentError::Timeout(_)) => DispatchOutcome::Timeout,
        Err(AgentError::Spawn(_)) => DispatchOutcome::UnknownFailure,
        Ok(invocation) => {
            let lower = invocation.output.to_lowercase();
            let confirmed = SUCCESS_MARKERS.iter().any(|marker| lower.contains(marker));
            if !confirmed && mentions_rate_limit(&invocation.output) {
                DispatchOutcome::RateLimited
            } else {
                DispatchOutcome::Success { confirmed }
            }
        }
    }
}
