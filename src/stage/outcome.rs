//! Stage results and run-wide outcome
//!
//! Stages never abort the run. Each one produces a [`StageReport`] and records
//! it in the shared [`OutcomeAggregator`], which is reduced to a
//! [`PipelineVerdict`] once every stage has finished.

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::exec::EXIT_UNSTABLE;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StageStatus {
    Success,
    /// Tests ran but flagged issues; does not fail the run
    Unstable,
    Failed,
}

impl StageStatus {
    /// Classify an orchestrator exit status
    pub fn from_exit_status(exit_status: i32) -> Self {
        match exit_status {
            0 => StageStatus::Success,
            EXIT_UNSTABLE => StageStatus::Unstable,
            _ => StageStatus::Failed,
        }
    }
}

/// Whether any stage has failed the build
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BuildOutcome {
    Ok,
    Failed,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PipelineVerdict {
    Success,
    Unstable,
    Failed,
}

impl PipelineVerdict {
    pub fn exit_code(&self) -> u8 {
        match self {
            PipelineVerdict::Success => 0,
            PipelineVerdict::Failed => 1,
            PipelineVerdict::Unstable => EXIT_UNSTABLE as u8,
        }
    }
}

impl std::fmt::Display for PipelineVerdict {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            PipelineVerdict::Success => write!(f, "success"),
            PipelineVerdict::Unstable => write!(f, "unstable"),
            PipelineVerdict::Failed => write!(f, "failed"),
        }
    }
}

/// Result of one stage
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StageReport {
    pub stage_name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cluster_name: Option<String>,
    pub status: StageStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub exit_status: Option<i32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
}

impl StageReport {
    pub fn started(stage_name: &str) -> Self {
        let now = Utc::now();
        Self {
            stage_name: stage_name.to_string(),
            cluster_name: None,
            status: StageStatus::Success,
            exit_status: None,
            message: None,
            started_at: now,
            finished_at: now,
        }
    }

    /// Backdate the start, e.g. to the spawn time of a stage that never reported
    pub fn since(mut self, started_at: DateTime<Utc>) -> Self {
        self.started_at = started_at;
        self
    }

    pub fn with_cluster(mut self, cluster_name: &str) -> Self {
        self.cluster_name = Some(cluster_name.to_string());
        self
    }

    /// Finish with the orchestrator's exit status
    pub fn exited(mut self, exit_status: i32) -> Self {
        self.status = StageStatus::from_exit_status(exit_status);
        self.exit_status = Some(exit_status);
        if self.status != StageStatus::Success {
            self.message = Some(format!("Orchestrator exited with status {}", exit_status));
        }
        self.finished_at = Utc::now();
        self
    }

    /// Finish as failed before or without an orchestrator result
    pub fn failed(mut self, message: impl Into<String>) -> Self {
        self.status = StageStatus::Failed;
        self.message = Some(message.into());
        self.finished_at = Utc::now();
        self
    }
}

/// Run-wide outcome shared by reference with every stage
#[derive(Debug, Default)]
pub struct OutcomeAggregator {
    failed: AtomicBool,
    unstable: AtomicBool,
    recorded: AtomicUsize,
}

impl OutcomeAggregator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record(&self, status: StageStatus) {
        match status {
            StageStatus::Success => {}
            StageStatus::Unstable => self.unstable.store(true, Ordering::SeqCst),
            StageStatus::Failed => self.failed.store(true, Ordering::SeqCst),
        }
        self.recorded.fetch_add(1, Ordering::SeqCst);
    }

    pub fn build_outcome(&self) -> BuildOutcome {
        if self.failed.load(Ordering::SeqCst) {
            BuildOutcome::Failed
        } else {
            BuildOutcome::Ok
        }
    }

    pub fn recorded(&self) -> usize {
        self.recorded.load(Ordering::SeqCst)
    }

    pub fn verdict(&self) -> PipelineVerdict {
        if self.failed.load(Ordering::SeqCst) {
            PipelineVerdict::Failed
        } else if self.unstable.load(Ordering::SeqCst) {
            PipelineVerdict::Unstable
        } else {
            PipelineVerdict::Success
        }
    }
}
