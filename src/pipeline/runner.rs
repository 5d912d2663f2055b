//! Pipeline runner
//!
//! Builds one deferred stage per matrix entry and starts them all at once.
//! Lock pools are the only thing that holds a stage back; a failing (or
//! panicking) stage never stops its siblings.

use std::path::Path;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use futures::future::join_all;
use serde::{Deserialize, Serialize};
use tracing::{error, info, instrument, warn};

use super::config::PipelineConfig;
use super::error::PipelineError;
use crate::cluster::{CapacityGatekeeper, ClusterNamer};
use crate::exec::CommandExecutor;
use crate::orchestrator::{OrchestratorInvoker, OrchestratorSetup};
use crate::stage::{
    BuildOutcome, LockPool, OutcomeAggregator, PipelineVerdict, StageBuilder, StageContext,
    StageReport, StageStatus,
};

/// Summary of a whole run
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PipelineReport {
    pub run_id: String,
    pub build_tag: String,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    pub build_outcome: BuildOutcome,
    pub verdict: PipelineVerdict,
    pub stages: Vec<StageReport>,
}

impl PipelineReport {
    pub fn stage(&self, name: &str) -> Option<&StageReport> {
        self.stages.iter().find(|s| s.stage_name == name)
    }

    pub fn count(&self, status: StageStatus) -> usize {
        self.stages.iter().filter(|s| s.status == status).count()
    }

    pub fn write_summary(&self, path: impl AsRef<Path>) -> Result<(), PipelineError> {
        let json = serde_json::to_string_pretty(self)?;
        std::fs::write(path, json)?;
        Ok(())
    }
}

pub struct PipelineRunner {
    config: PipelineConfig,
    executor: Arc<dyn CommandExecutor>,
    build_tag: Option<String>,
    filter: Option<String>,
    skip_setup: bool,
}

impl PipelineRunner {
    pub fn new(config: PipelineConfig, executor: Arc<dyn CommandExecutor>) -> Self {
        Self {
            config,
            executor,
            build_tag: None,
            filter: None,
            skip_setup: false,
        }
    }

    /// Overrides `build_tag` from the config
    pub fn build_tag(mut self, tag: impl Into<String>) -> Self {
        self.build_tag = Some(tag.into());
        self
    }

    /// Only run stages whose name starts with `prefix`
    pub fn filter(mut self, prefix: impl Into<String>) -> Self {
        self.filter = Some(prefix.into());
        self
    }

    pub fn skip_setup(mut self, skip: bool) -> Self {
        self.skip_setup = skip;
        self
    }

    fn stage_builder(&self, outcome: Arc<OutcomeAggregator>) -> StageBuilder {
        StageBuilder::new(StageContext {
            locks: LockPool::new(&self.config.locks),
            gatekeeper: CapacityGatekeeper::new(
                self.executor.clone(),
                self.config.cloud.clone(),
                self.config.capacity.clone(),
            ),
            invoker: OrchestratorInvoker::new(
                self.executor.clone(),
                self.config.orchestrator.clone(),
            ),
            namer: ClusterNamer::new(self.config.build_tag_prefix.clone()),
            outcome,
        })
    }

    #[instrument(skip(self))]
    pub async fn run(self) -> Result<PipelineReport, PipelineError> {
        self.config.validate()?;

        let build_tag = self
            .build_tag
            .clone()
            .or_else(|| self.config.build_tag.clone())
            .ok_or(PipelineError::MissingBuildTag)?;
        let run_id = uuid::Uuid::new_v4().to_string();
        let started_at = Utc::now();

        info!("Starting run {} for {}", run_id, build_tag);

        if let Some(setup) = &self.config.setup {
            if self.skip_setup {
                info!("Skipping orchestrator setup");
            } else {
                OrchestratorSetup::new(self.executor.clone(), self.config.cloud.clone(), setup.clone())
                    .run()
                    .await?;
            }
        }

        let specs = self.config.stage_specs(&build_tag, self.filter.as_deref());
        if specs.is_empty() {
            warn!("No stages to run");
        }

        let outcome = Arc::new(OutcomeAggregator::new());
        let builder = self.stage_builder(outcome.clone());

        let handles: Vec<_> = specs
            .into_iter()
            .map(|spec| {
                let name = spec.stage_name.clone();
                let stage = builder.build_stage(spec);
                ((name, Utc::now()), tokio::spawn(stage()))
            })
            .collect();

        let (spawned, tasks): (Vec<_>, Vec<_>) = handles.into_iter().unzip();
        let joined = join_all(tasks).await;

        let mut stages = Vec::with_capacity(joined.len());
        for ((name, spawned_at), result) in spawned.into_iter().zip(joined) {
            match result {
                Ok(report) => stages.push(report),
                Err(e) => {
                    error!("Stage {} aborted: {}", name, e);
                    outcome.record(StageStatus::Failed);
                    stages.push(
                        StageReport::started(&name)
                            .since(spawned_at)
                            .failed(format!("Stage aborted: {}", e)),
                    );
                }
            }
        }

        let report = PipelineReport {
            run_id,
            build_tag,
            started_at,
            finished_at: Utc::now(),
            build_outcome: outcome.build_outcome(),
            verdict: outcome.verdict(),
            stages,
        };

        info!(
            "Run finished: {} ({} passed, {} unstable, {} failed)",
            report.verdict,
            report.count(StageStatus::Success),
            report.count(StageStatus::Unstable),
            report.count(StageStatus::Failed)
        );

        Ok(report)
    }
}
