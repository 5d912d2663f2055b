//! Orchestrator invocation
//!
//! The orchestrator is run with output streaming to the pipeline log; only
//! its exit status comes back, classified as:
//! - `0` - success
//! - `65` - unstable, the run keeps its "ok" outcome
//! - anything else - failed

use std::path::PathBuf;
use std::sync::Arc;

use tracing::{error, info, instrument, warn};

use crate::exec::{shell_quote, CommandExecutor, ExecError};
use crate::pipeline::config::OrchestratorConfig;
use crate::stage::{StageStatus, TestStageSpec};

/// Exit status of one orchestrator run and what it means for the stage
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct InvocationOutcome {
    pub exit_status: i32,
    pub status: StageStatus,
}

impl InvocationOutcome {
    pub fn from_exit_status(exit_status: i32) -> Self {
        Self {
            exit_status,
            status: StageStatus::from_exit_status(exit_status),
        }
    }
}

pub struct OrchestratorInvoker {
    executor: Arc<dyn CommandExecutor>,
    config: OrchestratorConfig,
}

impl OrchestratorInvoker {
    pub fn new(executor: Arc<dyn CommandExecutor>, config: OrchestratorConfig) -> Self {
        Self { executor, config }
    }

    /// Where the JUnit report for `cluster_name` is written
    pub fn report_path(&self, cluster_name: &str) -> PathBuf {
        self.config.reports_dir.join(format!("{}.xml", cluster_name))
    }

    pub fn command_line(&self, spec: &TestStageSpec, cluster_name: &str, odcr_id: &str) -> String {
        let mut parts = vec![
            shell_quote(&self.config.python),
            shell_quote(&self.config.script),
            "--config".to_string(),
            shell_quote(&spec.config_path),
            "--os".to_string(),
            shell_quote(&spec.os),
            "--odcr".to_string(),
            shell_quote(odcr_id),
            "--instance-type".to_string(),
            shell_quote(&spec.instance_type),
            "--instance-count".to_string(),
            spec.instance_count().to_string(),
            "--region".to_string(),
            shell_quote(&spec.region),
            "--cluster-name".to_string(),
            shell_quote(cluster_name),
        ];

        let extra = spec.extra_args.trim();
        if !extra.is_empty() {
            parts.push(extra.to_string());
        }

        parts.push("--junit-xml".to_string());
        parts.push(shell_quote(&self.report_path(cluster_name).to_string_lossy()));

        parts.join(" ")
    }

    #[instrument(skip(self, spec), fields(stage = %spec.stage_name))]
    pub async fn invoke(
        &self,
        spec: &TestStageSpec,
        cluster_name: &str,
        odcr_id: &str,
    ) -> Result<InvocationOutcome, ExecError> {
        let command = self.command_line(spec, cluster_name, odcr_id);
        let result = self.executor.run(&command, false).await?;
        let outcome = InvocationOutcome::from_exit_status(result.exit_status);

        match outcome.status {
            StageStatus::Success => info!("Tests passed on {}", cluster_name),
            StageStatus::Unstable => warn!(
                "Tests on {} finished unstable (exit status {})",
                cluster_name, outcome.exit_status
            ),
            StageStatus::Failed => error!(
                "Tests on {} failed (exit status {})",
                cluster_name, outcome.exit_status
            ),
        }

        Ok(outcome)
    }
}
