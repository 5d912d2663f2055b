//! # Cluster Test Pipeline
//!
//! Runs hardware test suites on short-lived cloud clusters, bounded by
//! named lock pools and on-demand capacity reservations.
//!
//! ## Features
//!
//! - **Declarative YAML matrix** - One entry per (OS, instance type, region, config)
//! - **Quantity locks** - Each stage holds N slots of a named pool while it runs
//! - **Capacity gatekeeping** - Stale cluster cleanup and reservation polling before launch
//! - **Structured outcomes** - Exit status 65 marks a stage unstable without failing the run
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use cluster_test_pipeline::{PipelineConfig, PipelineRunner, ShellExecutor};
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let config = PipelineConfig::load("pipeline.yaml")?;
//!     let report = PipelineRunner::new(config, Arc::new(ShellExecutor::new()))
//!         .build_tag("jenkins-PR-123")
//!         .run()
//!         .await?;
//!
//!     println!("Pipeline finished: {}", report.verdict);
//!     Ok(())
//! }
//! ```

pub mod cluster;
pub mod exec;
pub mod orchestrator;
pub mod pipeline;
pub mod stage;

// Re-export main types
pub use cluster::{CapacityError, CapacityGatekeeper, CapacitySettings, ClusterNamer};
pub use exec::{CommandExecutor, ExecError, ExecutionResult, ScriptedExecutor, ShellExecutor};
pub use orchestrator::{
    ArtifactLocation, InvocationOutcome, OrchestratorInvoker, OrchestratorSetup, SetupConfig,
    SetupError,
};
pub use pipeline::{
    CloudCli, ConfigError, OrchestratorConfig, PipelineConfig, PipelineError, PipelineReport,
    PipelineRunner, StageEntry,
};
pub use stage::{
    BuildOutcome, DeferredStage, LockError, LockGuard, LockPool, LockRequest, OutcomeAggregator,
    PipelineVerdict, StageBuilder, StageContext, StageReport, StageStatus, TestStageSpec,
};

/// Prelude module for convenient imports
pub mod prelude {
    pub use crate::exec::{CommandExecutor, ExecutionResult, ScriptedExecutor, ShellExecutor};
    pub use crate::pipeline::{PipelineConfig, PipelineError, PipelineReport, PipelineRunner};
    pub use crate::stage::{
        BuildOutcome, LockPool, LockRequest, PipelineVerdict, StageBuilder, StageReport,
        StageStatus, TestStageSpec,
    };
}
