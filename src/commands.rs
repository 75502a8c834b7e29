//! Remote charge start/stop through the external vehicle command binary
//!
//! The binary signs commands with its own key and reads the access token from
//! the token file, so a rejected token is fixed by refreshing the file and
//! trying again once.

use crate::config::CommandsConfig;
use crate::error::{CommandFailure, Result, TeslabusError};
use crate::logging::{StructuredLogger, get_logger};
use crate::tokens::TokenStore;
use crate::vehicle::{VehicleApi, VehicleSnapshot};
use chrono::Utc;
use std::collections::HashMap;
use std::process::Stdio;
use std::sync::Arc;
use std::time::Duration;
use tokio::process::Command;

/// Subcommands of the control binary
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VehicleCommand {
    Wake,
    ChargingStart,
    ChargingStop,
}

impl VehicleCommand {
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Wake => "wake",
            Self::ChargingStart => "charging-start",
            Self::ChargingStop => "charging-stop",
        }
    }
}

/// Runs one vehicle command to completion
#[async_trait::async_trait]
pub trait CommandExecutor: Send + Sync {
    async fn run(&self, command: VehicleCommand) -> Result<()>;
}

/// Executes the configured binary as a child process
pub struct ProcessExecutor {
    binary: String,
    args: Vec<String>,
    env: HashMap<String, String>,
    timeout: Duration,
    logger: StructuredLogger,
}

impl ProcessExecutor {
    pub fn new(config: &CommandsConfig) -> Self {
        Self {
            binary: config.binary.clone(),
            args: config.args.clone(),
            env: config.env.clone(),
            timeout: Duration::from_secs(config.timeout_secs),
            logger: get_logger("commands"),
        }
    }
}

/// Output markers that mean the binary refused our credentials
const TOKEN_MARKERS: &[&str] = &["token", "unauthorized", "401"];

fn classify_failure(stdout: &str, stderr: &str) -> CommandFailure {
    let text = format!("{stdout}\n{stderr}").to_lowercase();
    if TOKEN_MARKERS.iter().any(|m| text.contains(m)) {
        CommandFailure::TokenRejected
    } else {
        CommandFailure::Failed
    }
}

#[async_trait::async_trait]
impl CommandExecutor for ProcessExecutor {
    async fn run(&self, command: VehicleCommand) -> Result<()> {
        let mut cmd = Command::new(&self.binary);
        cmd.args(&self.args)
            .arg(command.as_str())
            .envs(&self.env)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);

        self.logger
            .debug(&format!("Running {} {}", self.binary, command.as_str()));

        let output = match tokio::time::timeout(self.timeout, cmd.output()).await {
            Ok(Ok(output)) => output,
            Ok(Err(e)) => {
                return Err(TeslabusError::command(
                    CommandFailure::Failed,
                    format!("failed to spawn {}: {e}", self.binary),
                ));
            }
            Err(_) => {
                return Err(TeslabusError::command_timeout(format!(
                    "{} did not finish within {}s",
                    command.as_str(),
                    self.timeout.as_secs()
                )));
            }
        };

        if output.status.success() {
            return Ok(());
        }

        let stdout = String::from_utf8_lossy(&output.stdout);
        let stderr = String::from_utf8_lossy(&output.stderr);
        let kind = classify_failure(&stdout, &stderr);
        Err(TeslabusError::command(
            kind,
            format!(
                "{} exited with {}: {}",
                command.as_str(),
                output.status,
                stderr.trim()
            ),
        ))
    }
}

/// Issues wake + start/stop sequences
pub struct CommandRunner {
    executor: Arc<dyn CommandExecutor>,
    settle_delay: Duration,
    logger: StructuredLogger,
}

impl CommandRunner {
    pub fn new(executor: Arc<dyn CommandExecutor>, settle_delay: Duration) -> Self {
        Self {
            executor,
            settle_delay,
            logger: get_logger("commands"),
        }
    }

    pub fn from_config(config: &CommandsConfig) -> Self {
        Self::new(
            Arc::new(ProcessExecutor::new(config)),
            Duration::from_secs(config.settle_delay_secs),
        )
    }

    /// Bring charging to `desired`. Returns `Ok(false)` when the snapshot
    /// already matches and nothing was sent.
    pub async fn start_stop_charging(
        &self,
        desired: bool,
        snapshot: Option<&VehicleSnapshot>,
        tokens: &mut TokenStore,
        api: &dyn VehicleApi,
    ) -> Result<bool> {
        if snapshot.is_some_and(|s| s.is_charging() == desired) {
            self.logger.debug(&format!(
                "Charging already {}, nothing to do",
                if desired { "on" } else { "off" }
            ));
            return Ok(false);
        }

        match self.wake_and_send(desired).await {
            Ok(()) => Ok(true),
            Err(e) if e.is_token_rejected() => {
                self.logger
                    .warn(&format!("Command rejected the token, refreshing: {e}"));
                tokens.refresh(api, Utc::now()).await?;
                self.wake_and_send(desired).await?;
                Ok(true)
            }
            Err(e) => Err(e),
        }
    }

    async fn wake_and_send(&self, desired: bool) -> Result<()> {
        match self.executor.run(VehicleCommand::Wake).await {
            Ok(()) => {}
            Err(e) if e.is_token_rejected() => return Err(e),
            Err(e) => self.logger.warn(&format!("Wake failed, trying anyway: {e}")),
        }

        if !self.settle_delay.is_zero() {
            tokio::time::sleep(self.settle_delay).await;
        }

        let command = if desired {
            VehicleCommand::ChargingStart
        } else {
            VehicleCommand::ChargingStop
        };
        self.executor.run(command).await?;
        self.logger.info(&format!("Sent {}", command.as_str()));
        Ok(())
    }
}
