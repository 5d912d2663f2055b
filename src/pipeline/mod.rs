//! Pipeline execution
//!
//! This module contains:
//! - `config` - The YAML test matrix and tooling settings
//! - `error` - Pipeline-level error types
//! - `runner` - Schedules all stages and reduces their results

pub mod config;
pub mod error;
pub mod runner;

pub use config::{CloudCli, ConfigError, OrchestratorConfig, PipelineConfig, StageEntry};
pub use error::PipelineError;
pub use runner::{PipelineReport, PipelineRunner};
