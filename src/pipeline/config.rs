//! Pipeline configuration
//!
//! The test matrix and its tooling, loaded from a YAML file:
//!
//! ```yaml
//! build_tag_prefix: "jenkins-"
//!
//! orchestrator:
//!   python: .venv/bin/python
//!   script: orchestrator/run_tests.py
//!   reports_dir: reports
//!
//! capacity:
//!   poll_interval_secs: 60
//!   ice_instance_types: [p5.48xlarge]
//!
//! locks:
//!   p4d-odcr: 4
//!
//! stages:
//!   - name: ubuntu2004-p4d
//!     os: ubuntu20.04
//!     instance_type: p4d.24xlarge
//!     region: us-east-1
//!     lock: { label: p4d-odcr, quantity: 2 }
//!     config: configs/p4d.yaml
//!     odcr: cr-0123456789abcdef0
//!     extra_args: "--tests nccl"
//! ```

use std::collections::{HashMap, HashSet};
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::cluster::naming::DEFAULT_BUILD_TAG_PREFIX;
use crate::cluster::CapacitySettings;
use crate::orchestrator::setup::SetupConfig;
use crate::stage::{LockRequest, TestStageSpec};

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("YAML parse error in {file}: {error}")]
    Yaml {
        file: String,
        error: serde_yaml::Error,
    },

    #[error("Invalid configuration: {0}")]
    Invalid(String),
}

/// Binaries used to talk to the cloud
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CloudCli {
    #[serde(default = "default_aws")]
    pub aws: String,

    #[serde(default = "default_pcluster")]
    pub pcluster: String,
}

fn default_aws() -> String {
    "aws".to_string()
}

fn default_pcluster() -> String {
    "pcluster".to_string()
}

impl Default for CloudCli {
    fn default() -> Self {
        Self {
            aws: default_aws(),
            pcluster: default_pcluster(),
        }
    }
}

/// How to launch the test orchestrator
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OrchestratorConfig {
    #[serde(default = "default_python")]
    pub python: String,

    #[serde(default = "default_script")]
    pub script: String,

    /// Directory that receives one JUnit XML report per cluster
    #[serde(default = "default_reports_dir")]
    pub reports_dir: PathBuf,
}

pub(crate) fn default_python() -> String {
    "python3".to_string()
}

fn default_script() -> String {
    "run_tests.py".to_string()
}

fn default_reports_dir() -> PathBuf {
    PathBuf::from("reports")
}

impl Default for OrchestratorConfig {
    fn default() -> Self {
        Self {
            python: default_python(),
            script: default_script(),
            reports_dir: default_reports_dir(),
        }
    }
}

/// One entry of the test matrix
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StageEntry {
    pub name: String,
    pub os: String,
    pub instance_type: String,
    pub region: String,
    pub lock: LockRequest,

    /// Orchestrator config file for this test
    pub config: String,

    /// Capacity reservation the cluster launches into
    pub odcr: String,

    #[serde(default)]
    pub extra_args: String,
}

impl StageEntry {
    pub fn to_spec(&self, build_tag: &str) -> TestStageSpec {
        TestStageSpec {
            stage_name: self.name.clone(),
            build_tag: build_tag.to_string(),
            os: self.os.clone(),
            instance_type: self.instance_type.clone(),
            region: self.region.clone(),
            lock_label: self.lock.label.clone(),
            lock_count: self.lock.quantity,
            config_path: self.config.clone(),
            odcr_id: self.odcr.clone(),
            extra_args: self.extra_args.clone(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PipelineConfig {
    #[serde(default = "default_build_tag_prefix")]
    pub build_tag_prefix: String,

    /// Fallback build tag when none is given on the command line
    #[serde(default)]
    pub build_tag: Option<String>,

    #[serde(default)]
    pub orchestrator: OrchestratorConfig,

    #[serde(default)]
    pub cloud: CloudCli,

    #[serde(default)]
    pub capacity: CapacitySettings,

    /// Lock label -> number of slots in the pool
    #[serde(default)]
    pub locks: HashMap<String, u32>,

    /// Fetch and install the orchestrator before any stage runs
    #[serde(default)]
    pub setup: Option<SetupConfig>,

    #[serde(default)]
    pub stages: Vec<StageEntry>,
}

fn default_build_tag_prefix() -> String {
    DEFAULT_BUILD_TAG_PREFIX.to_string()
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            build_tag_prefix: default_build_tag_prefix(),
            build_tag: None,
            orchestrator: OrchestratorConfig::default(),
            cloud: CloudCli::default(),
            capacity: CapacitySettings::default(),
            locks: HashMap::new(),
            setup: None,
            stages: Vec::new(),
        }
    }
}

impl PipelineConfig {
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path)?;
        let config: PipelineConfig =
            serde_yaml::from_str(&content).map_err(|e| ConfigError::Yaml {
                file: path.display().to_string(),
                error: e,
            })?;
        config.validate()?;
        Ok(config)
    }

    pub fn from_yaml(yaml: &str) -> Result<Self, ConfigError> {
        let config: PipelineConfig = serde_yaml::from_str(yaml).map_err(|e| ConfigError::Yaml {
            file: "<inline>".to_string(),
            error: e,
        })?;
        config.validate()?;
        Ok(config)
    }

    /// Check that every stage can ever obtain its lock
    pub fn validate(&self) -> Result<(), ConfigError> {
        for (label, size) in &self.locks {
            if *size == 0 {
                return Err(ConfigError::Invalid(format!(
                    "lock pool '{}' must have at least one slot",
                    label
                )));
            }
        }

        let mut seen = HashSet::new();
        for stage in &self.stages {
            if !seen.insert(stage.name.as_str()) {
                return Err(ConfigError::Invalid(format!(
                    "duplicate stage name '{}'",
                    stage.name
                )));
            }

            if stage.lock.quantity == 0 {
                return Err(ConfigError::Invalid(format!(
                    "stage '{}' must request at least one lock slot",
                    stage.name
                )));
            }

            let size = self.locks.get(&stage.lock.label).ok_or_else(|| {
                ConfigError::Invalid(format!(
                    "stage '{}' uses undefined lock '{}'",
                    stage.name, stage.lock.label
                ))
            })?;

            if stage.lock.quantity > *size {
                return Err(ConfigError::Invalid(format!(
                    "stage '{}' requests {} slots of '{}' which only has {}",
                    stage.name, stage.lock.quantity, stage.lock.label, size
                )));
            }
        }

        Ok(())
    }

    /// Stage specs for every matrix entry whose name starts with `filter`
    pub fn stage_specs(&self, build_tag: &str, filter: Option<&str>) -> Vec<TestStageSpec> {
        self.stages
            .iter()
            .filter(|s| filter.map(|f| s.name.starts_with(f)).unwrap_or(true))
            .map(|s| s.to_spec(build_tag))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const MATRIX: &str = r#"
locks:
  p4d-odcr: 4
stages:
  - name: ubuntu-p4d
    os: ubuntu20.04
    instance_type: p4d.24xlarge
    region: us-east-1
    lock: { label: p4d-odcr, quantity: 2 }
    config: configs/p4d.yaml
    odcr: cr-1
  - name: rhel-p4d
    os: rhel8
    instance_type: p4d.24xlarge
    region: us-east-1
    lock: { label: p4d-odcr, quantity: 2 }
    config: configs/p4d.yaml
    odcr: cr-1
    extra_args: "--tests nccl"
"#;

    #[test]
    fn test_defaults() {
        let config = PipelineConfig::default();
        assert_eq!(config.build_tag_prefix, "jenkins-");
        assert_eq!(config.orchestrator.python, "python3");
        assert_eq!(config.cloud.aws, "aws");
        assert_eq!(config.cloud.pcluster, "pcluster");
        assert_eq!(config.capacity.ice_delay_secs, 150);
        assert!(config.stages.is_empty());
    }

    #[test]
    fn test_parse_matrix() {
        let config = PipelineConfig::from_yaml(MATRIX).unwrap();
        assert_eq!(config.stages.len(), 2);
        assert_eq!(config.locks.get("p4d-odcr"), Some(&4));
        assert_eq!(config.stages[0].extra_args, "");
        assert_eq!(config.stages[1].extra_args, "--tests nccl");
    }

    #[test]
    fn test_stage_specs_filter() {
        let config = PipelineConfig::from_yaml(MATRIX).unwrap();

        let all = config.stage_specs("jenkins-PR-1", None);
        assert_eq!(all.len(), 2);
        assert_eq!(all[0].build_tag, "jenkins-PR-1");
        assert_eq!(all[0].lock_count, 2);
        assert_eq!(all[0].lock_label, "p4d-odcr");

        let rhel = config.stage_specs("jenkins-PR-1", Some("rhel"));
        assert_eq!(rhel.len(), 1);
        assert_eq!(rhel[0].stage_name, "rhel-p4d");
    }

    #[test]
    fn test_rejects_undefined_lock() {
        let yaml = MATRIX.replace("p4d-odcr: 4", "other: 4");
        let err = PipelineConfig::from_yaml(&yaml).unwrap_err();
        assert!(err.to_string().contains("undefined lock"));
    }

    #[test]
    fn test_rejects_oversized_request() {
        let yaml = MATRIX.replace("p4d-odcr: 4", "p4d-odcr: 1");
        let err = PipelineConfig::from_yaml(&yaml).unwrap_err();
        assert!(err.to_string().contains("only has 1"));
    }

    #[test]
    fn test_rejects_zero_quantity() {
        let yaml = MATRIX.replace("quantity: 2", "quantity: 0");
        assert!(PipelineConfig::from_yaml(&yaml).is_err());
    }

    #[test]
    fn test_rejects_duplicate_names() {
        let yaml = MATRIX.replace("name: rhel-p4d", "name: ubuntu-p4d");
        let err = PipelineConfig::from_yaml(&yaml).unwrap_err();
        assert!(err.to_string().contains("duplicate stage name"));
    }
}
