//! Command execution
//!
//! Every interaction with the outside world (cloud CLI, cluster CLI, archive
//! tools, the test orchestrator) goes through a [`CommandExecutor`]:
//! - `shell` - Runs commands through `sh -c` on the host
//! - `scripted` - In-memory executor with canned responses, for tests

pub mod scripted;
pub mod shell;

use async_trait::async_trait;

pub use scripted::ScriptedExecutor;
pub use shell::ShellExecutor;

/// Exit status the orchestrator uses for "tests ran but flagged issues"
pub const EXIT_UNSTABLE: i32 = 65;

/// Errors raised when a command could not be run at all.
///
/// A command that runs and exits nonzero is not an error; its status is
/// reported through [`ExecutionResult`].
#[derive(Debug, thiserror::Error)]
pub enum ExecError {
    #[error("Failed to spawn `{command}`: {source}")]
    Spawn {
        command: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Command `{0}` was terminated by a signal")]
    Signaled(String),
}

/// Outcome of a single command invocation
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExecutionResult {
    pub exit_status: i32,
    pub stdout: Option<String>,
}

impl ExecutionResult {
    pub fn success() -> Self {
        Self {
            exit_status: 0,
            stdout: None,
        }
    }

    pub fn with_status(exit_status: i32) -> Self {
        Self {
            exit_status,
            stdout: None,
        }
    }

    pub fn with_stdout(stdout: impl Into<String>) -> Self {
        Self {
            exit_status: 0,
            stdout: Some(stdout.into()),
        }
    }

    pub fn is_success(&self) -> bool {
        self.exit_status == 0
    }

    /// Captured stdout with surrounding whitespace removed, or "" when not captured
    pub fn stdout_trimmed(&self) -> &str {
        self.stdout.as_deref().map(str::trim).unwrap_or("")
    }
}

/// Runs shell commands on behalf of the pipeline
#[async_trait]
pub trait CommandExecutor: Send + Sync {
    /// Run `command`. When `capture_output` is false, output streams to the
    /// pipeline's own log and `stdout` is `None`.
    async fn run(&self, command: &str, capture_output: bool)
        -> Result<ExecutionResult, ExecError>;
}

/// Quote a value for safe interpolation into a `sh -c` command line
pub fn shell_quote(value: &str) -> String {
    if !value.is_empty()
        && value
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || "-_./:=@,+".contains(c))
    {
        return value.to_string();
    }
    format!("'{}'", value.replace('\'', r"'\''"))
}
