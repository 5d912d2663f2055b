//! Host shell executor
//!
//! Runs commands through `sh -c`, either capturing stdout or letting output
//! stream straight into the pipeline log.

use std::path::PathBuf;
use std::process::Stdio;

use async_trait::async_trait;
use tokio::process::Command;
use tracing::{debug, info};

use super::{CommandExecutor, ExecError, ExecutionResult};

#[derive(Debug, Clone, Default)]
pub struct ShellExecutor {
    working_dir: Option<PathBuf>,
}

impl ShellExecutor {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn working_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.working_dir = Some(dir.into());
        self
    }
}

#[async_trait]
impl CommandExecutor for ShellExecutor {
    async fn run(
        &self,
        command: &str,
        capture_output: bool,
    ) -> Result<ExecutionResult, ExecError> {
        info!("Executing: {}", command);

        let mut cmd = Command::new("sh");
        cmd.args(["-c", command]);

        if let Some(dir) = &self.working_dir {
            cmd.current_dir(dir);
        }

        if capture_output {
            cmd.stdout(Stdio::piped());
        } else {
            cmd.stdout(Stdio::inherit());
        }
        cmd.stderr(Stdio::inherit());

        let output = cmd.output().await.map_err(|e| ExecError::Spawn {
            command: command.to_string(),
            source: e,
        })?;

        let exit_status = output
            .status
            .code()
            .ok_or_else(|| ExecError::Signaled(command.to_string()))?;
        debug!("Command exited with status {}", exit_status);

        let stdout = capture_output.then(|| String::from_utf8_lossy(&output.stdout).to_string());

        Ok(ExecutionResult {
            exit_status,
            stdout,
        })
    }
}
