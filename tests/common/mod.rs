#![allow(dead_code)]

use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use async_trait::async_trait;
use cluster_test_pipeline::exec::{CommandExecutor, ExecError, ExecutionResult, ScriptedExecutor};
use tempfile::TempDir;

pub fn create_test_dir() -> TempDir {
    tempfile::tempdir().expect("Failed to create temp directory")
}

pub fn write_pipeline(dir: &Path, content: &str) -> PathBuf {
    let path = dir.join("pipeline.yaml");
    fs::write(&path, content).expect("Failed to write pipeline.yaml");
    path
}

/// A stage entry for `name` running `config` under lock `label`
pub fn stage_entry(name: &str, instance_type: &str, label: &str, quantity: u32) -> String {
    format!(
        r#"
  - name: {name}
    os: ubuntu20.04
    instance_type: {instance_type}
    region: us-east-1
    lock: {{ label: {label}, quantity: {quantity} }}
    config: configs/{name}.yaml
    odcr: cr-{label}
"#
    )
}

/// A pipeline with one lock pool and the given stage entries; all delays off
pub fn pipeline_yaml(label: &str, pool_size: u32, stages: &[String]) -> String {
    format!(
        r#"
build_tag: jenkins-PR-42
orchestrator:
  python: python3
  script: run_tests.py
  reports_dir: reports
capacity:
  poll_interval_secs: 1
  timeout_secs: 10
  ice_delay_secs: 0
locks:
  {label}: {pool_size}
stages:{}
"#,
        stages.concat()
    )
}

/// Cloud calls that always find an empty region and plenty of capacity
pub fn healthy_cloud() -> ScriptedExecutor {
    ScriptedExecutor::new()
        .respond("list-clusters", ExecutionResult::with_stdout(r#"{"clusters": []}"#))
        .respond("describe-capacity-reservations", ExecutionResult::with_stdout("64"))
}

/// Orchestrator command fragment for stage `name`
pub fn orchestrator_for(name: &str) -> String {
    format!("--config configs/{}.yaml", name)
}

pub fn slow(status: i32) -> (ExecutionResult, Duration) {
    (ExecutionResult::with_status(status), Duration::from_secs(30))
}

/// Wraps an executor and panics on commands containing `pattern`
pub struct PanickingExecutor {
    pub inner: ScriptedExecutor,
    pub pattern: String,
}

#[async_trait]
impl CommandExecutor for PanickingExecutor {
    async fn run(&self, command: &str, capture_output: bool) -> Result<ExecutionResult, ExecError> {
        if command.contains(&self.pattern) {
            panic!("executor blew up on {}", command);
        }
        self.inner.run(command, capture_output).await
    }
}
