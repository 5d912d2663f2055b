//! External test orchestrator
//!
//! - `invoker` - Builds and runs one orchestrator command per stage
//! - `setup` - Downloads the orchestrator and prepares its virtualenv

pub mod invoker;
pub mod setup;

pub use invoker::{InvocationOutcome, OrchestratorInvoker};
pub use setup::{ArtifactLocation, OrchestratorSetup, SetupConfig, SetupError};
