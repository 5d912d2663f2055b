//! Test stages
//!
//! This module contains:
//! - `spec` - The immutable description of one test configuration
//! - `lock` - Named, quantity-based lock pools shared by all stages
//! - `outcome` - Stage statuses, reports and the run-wide outcome aggregator
//! - `builder` - Turns a spec into a deferred, lock-guarded unit of work

pub mod builder;
pub mod lock;
pub mod outcome;
pub mod spec;

pub use builder::{DeferredStage, StageBuilder, StageContext};
pub use lock::{LockError, LockGuard, LockPool, LockRequest};
pub use outcome::{BuildOutcome, OutcomeAggregator, PipelineVerdict, StageReport, StageStatus};
pub use spec::TestStageSpec;
