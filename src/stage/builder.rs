//! Stage construction
//!
//! A stage is built eagerly but runs only when the scheduler calls it. Its
//! body is strictly sequential:
//! 1. Acquire the stage's lock (may wait for other stages)
//! 2. Clean up stale clusters and wait for reservation capacity
//! 3. Run the orchestrator against a freshly named cluster
//!
//! The lock guard lives for the whole body and is dropped on every exit path.

use std::sync::Arc;

use futures::future::BoxFuture;
use futures::FutureExt;
use tracing::{error, info, info_span, Instrument};

use super::lock::LockPool;
use super::outcome::{OutcomeAggregator, StageReport};
use super::spec::TestStageSpec;
use crate::cluster::{CapacityGatekeeper, ClusterNamer};
use crate::orchestrator::OrchestratorInvoker;

/// A stage waiting to be scheduled
pub type DeferredStage = Box<dyn FnOnce() -> BoxFuture<'static, StageReport> + Send>;

/// Collaborators shared by every stage of a run
pub struct StageContext {
    pub locks: LockPool,
    pub gatekeeper: CapacityGatekeeper,
    pub invoker: OrchestratorInvoker,
    pub namer: ClusterNamer,
    pub outcome: Arc<OutcomeAggregator>,
}

#[derive(Clone)]
pub struct StageBuilder {
    context: Arc<StageContext>,
}

impl StageBuilder {
    pub fn new(context: StageContext) -> Self {
        Self {
            context: Arc::new(context),
        }
    }

    pub fn context(&self) -> &StageContext {
        &self.context
    }

    pub fn build_stage(&self, spec: TestStageSpec) -> DeferredStage {
        let context = self.context.clone();

        Box::new(move || {
            let span = info_span!("stage", name = %spec.stage_name);
            async move {
                let report = run_stage(&spec, &context).await;
                context.outcome.record(report.status);
                report
            }
            .instrument(span)
            .boxed()
        })
    }
}

async fn run_stage(spec: &TestStageSpec, context: &StageContext) -> StageReport {
    let report = StageReport::started(&spec.stage_name);

    let _guard = match context.locks.acquire(&spec.lock_request()).await {
        Ok(guard) => guard,
        Err(e) => {
            error!("Could not lock {}: {}", spec.lock_label, e);
            return report.failed(e.to_string());
        }
    };

    if let Err(e) = context
        .gatekeeper
        .prepare(
            &spec.instance_type,
            &spec.region,
            spec.instance_count(),
            &spec.odcr_id,
        )
        .await
    {
        error!("Capacity for {} unavailable: {}", spec.instance_type, e);
        return report.failed(e.to_string());
    }

    let cluster_name = context
        .namer
        .name(&spec.build_tag, &spec.os, &spec.instance_type);
    info!("Testing {} on cluster {}", spec.stage_name, cluster_name);
    let report = report.with_cluster(&cluster_name);

    match context
        .invoker
        .invoke(spec, &cluster_name, &spec.odcr_id)
        .await
    {
        Ok(outcome) => report.exited(outcome.exit_status),
        Err(e) => {
            error!("Could not run orchestrator: {}", e);
            report.failed(e.to_string())
        }
    }
}
