//! Orchestrator installation
//!
//! The orchestrator ships as a tarball in a per-account bucket:
//! `s3://{bucket_prefix}-{account_id}-{region}/{version}/{artifact}`.
//! Setup resolves the account, downloads and unpacks the tarball, and
//! installs its requirements into a fresh virtualenv.

use std::fmt;
use std::path::PathBuf;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::{info, instrument};

use crate::exec::{shell_quote, CommandExecutor, ExecError};
use crate::pipeline::config::{default_python, CloudCli};

#[derive(Debug, thiserror::Error)]
pub enum SetupError {
    #[error("Execution error: {0}")]
    Exec(#[from] ExecError),

    #[error("Could not resolve the cloud account id: {0}")]
    AccountLookup(String),

    #[error("Setup step '{step}' exited with status {exit_status}")]
    StepFailed {
        step: &'static str,
        exit_status: i32,
    },
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SetupConfig {
    pub bucket_prefix: String,

    /// Region suffix of the bucket name
    pub region: String,

    pub version: String,

    pub artifact: String,

    #[serde(default = "default_dest_dir")]
    pub dest_dir: PathBuf,

    #[serde(default = "default_venv_dir")]
    pub venv_dir: PathBuf,

    /// Requirements file, relative to `dest_dir`
    #[serde(default = "default_requirements")]
    pub requirements: String,

    /// Interpreter used to create the virtualenv
    #[serde(default = "default_python")]
    pub python: String,
}

fn default_dest_dir() -> PathBuf {
    PathBuf::from("orchestrator")
}

fn default_venv_dir() -> PathBuf {
    PathBuf::from(".venv")
}

fn default_requirements() -> String {
    "requirements.txt".to_string()
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArtifactLocation {
    pub bucket_prefix: String,
    pub account_id: String,
    pub region: String,
    pub version: String,
    pub artifact: String,
}

impl ArtifactLocation {
    pub fn bucket(&self) -> String {
        format!("{}-{}-{}", self.bucket_prefix, self.account_id, self.region)
    }
}

impl fmt::Display for ArtifactLocation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "s3://{}/{}/{}", self.bucket(), self.version, self.artifact)
    }
}

pub struct OrchestratorSetup {
    executor: Arc<dyn CommandExecutor>,
    cloud: CloudCli,
    config: SetupConfig,
}

impl OrchestratorSetup {
    pub fn new(executor: Arc<dyn CommandExecutor>, cloud: CloudCli, config: SetupConfig) -> Self {
        Self {
            executor,
            cloud,
            config,
        }
    }

    pub async fn account_id(&self) -> Result<String, SetupError> {
        let command = format!(
            "{} sts get-caller-identity --query Account --output text",
            shell_quote(&self.cloud.aws)
        );
        let result = self.executor.run(&command, true).await?;
        if !result.is_success() {
            return Err(SetupError::AccountLookup(format!(
                "exit status {}",
                result.exit_status
            )));
        }

        let account = result.stdout_trimmed();
        if account.is_empty() || !account.chars().all(|c| c.is_ascii_digit()) {
            return Err(SetupError::AccountLookup(format!("unexpected output {:?}", account)));
        }
        Ok(account.to_string())
    }

    pub async fn artifact_location(&self) -> Result<ArtifactLocation, SetupError> {
        Ok(ArtifactLocation {
            bucket_prefix: self.config.bucket_prefix.clone(),
            account_id: self.account_id().await?,
            region: self.config.region.clone(),
            version: self.config.version.clone(),
            artifact: self.config.artifact.clone(),
        })
    }

    async fn step(&self, step: &'static str, command: String) -> Result<(), SetupError> {
        info!("Setup: {}", step);
        let result = self.executor.run(&command, false).await?;
        if result.is_success() {
            Ok(())
        } else {
            Err(SetupError::StepFailed {
                step,
                exit_status: result.exit_status,
            })
        }
    }

    /// Download, unpack and install the orchestrator
    #[instrument(skip(self))]
    pub async fn run(&self) -> Result<ArtifactLocation, SetupError> {
        let location = self.artifact_location().await?;
        let dest = self.config.dest_dir.to_string_lossy().to_string();
        let archive = self
            .config
            .dest_dir
            .join(&self.config.artifact)
            .to_string_lossy()
            .to_string();
        let venv = self.config.venv_dir.to_string_lossy().to_string();
        let pip = self.config.venv_dir.join("bin").join("pip");
        let requirements = self.config.dest_dir.join(&self.config.requirements);

        self.step("create directory", format!("mkdir -p {}", shell_quote(&dest)))
            .await?;
        self.step(
            "download",
            format!(
                "{} s3 cp {} {}",
                shell_quote(&self.cloud.aws),
                shell_quote(&location.to_string()),
                shell_quote(&archive)
            ),
        )
        .await?;
        self.step(
            "extract",
            format!("tar -xzf {} -C {}", shell_quote(&archive), shell_quote(&dest)),
        )
        .await?;
        self.step(
            "create virtualenv",
            format!(
                "{} -m venv {}",
                shell_quote(&self.config.python),
                shell_quote(&venv)
            ),
        )
        .await?;
        self.step(
            "install requirements",
            format!(
                "{} install -r {}",
                shell_quote(&pip.to_string_lossy()),
                shell_quote(&requirements.to_string_lossy())
            ),
        )
        .await?;

        info!("Orchestrator {} installed into {}", location, dest);
        Ok(location)
    }
}
