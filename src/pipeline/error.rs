//! Pipeline error types

use crate::orchestrator::SetupError;

use super::config::ConfigError;

/// Errors that stop a run before or after its stages; stage failures are
/// reported through `StageReport` instead
#[derive(Debug, thiserror::Error)]
pub enum PipelineError {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Setup error: {0}")]
    Setup(#[from] SetupError),

    #[error("No build tag given (pass --build-tag, set BUILD_TAG or build_tag in the config)")]
    MissingBuildTag,

    #[error("Failed to write summary: {0}")]
    Summary(#[from] std::io::Error),

    #[error("Failed to serialize summary: {0}")]
    Serialize(#[from] serde_json::Error),
}
