mod common;

use common::*;
use cluster_test_pipeline::{ConfigError, PipelineConfig};

#[test]
fn test_load_minimal_config() {
    let dir = create_test_dir();
    let path = write_pipeline(dir.path(), "locks: {}");

    let config = PipelineConfig::load(path).unwrap();
    assert!(config.stages.is_empty());
    assert_eq!(config.build_tag_prefix, "jenkins-");
    assert_eq!(config.capacity.poll_interval_secs, 60);
    assert_eq!(config.capacity.ice_instance_types, vec!["p5.48xlarge".to_string()]);
    assert!(config.setup.is_none());
}

#[test]
fn test_load_full_config() {
    let dir = create_test_dir();
    let path = write_pipeline(
        dir.path(),
        r#"
build_tag_prefix: "ci-"
orchestrator:
  python: .venv/bin/python
  script: orchestrator/run_tests.py
  reports_dir: out/junit
cloud:
  aws: /usr/local/bin/aws
  pcluster: .venv/bin/pcluster
capacity:
  poll_interval_secs: 30
  timeout_secs: 600
  ice_instance_types: [p5.48xlarge, p4de.24xlarge]
  ice_delay_secs: 120
locks:
  p5-odcr: 2
setup:
  bucket_prefix: hw-tests
  region: us-east-2
  version: "3.9.0"
  artifact: orchestrator.tgz
stages:
  - name: ubuntu-p5
    os: ubuntu22.04
    instance_type: p5.48xlarge
    region: us-east-2
    lock: { label: p5-odcr, quantity: 2 }
    config: configs/p5.yaml
    odcr: cr-0abc
    extra_args: "--tests efa nccl"
"#,
    );

    let config = PipelineConfig::load(path).unwrap();
    assert_eq!(config.build_tag_prefix, "ci-");
    assert_eq!(config.orchestrator.script, "orchestrator/run_tests.py");
    assert_eq!(config.orchestrator.reports_dir.to_str(), Some("out/junit"));
    assert_eq!(config.cloud.pcluster, ".venv/bin/pcluster");
    assert!(config.capacity.is_ice_prone("p4de.24xlarge"));
    assert_eq!(config.capacity.ice_delay_secs, 120);

    let setup = config.setup.as_ref().unwrap();
    assert_eq!(setup.version, "3.9.0");
    assert_eq!(setup.venv_dir.to_str(), Some(".venv"));

    let specs = config.stage_specs("ci-nightly", None);
    assert_eq!(specs.len(), 1);
    assert_eq!(specs[0].instance_count(), 2);
    assert_eq!(specs[0].extra_args, "--tests efa nccl");
    assert_eq!(specs[0].odcr_id, "cr-0abc");
}

#[test]
fn test_load_file_not_found() {
    let result = PipelineConfig::load("/nonexistent/path/pipeline.yaml");
    assert!(matches!(result, Err(ConfigError::Io(_))));
}

#[test]
fn test_load_invalid_yaml() {
    let dir = create_test_dir();
    let path = write_pipeline(dir.path(), "invalid: yaml: syntax: [");

    let result = PipelineConfig::load(path);
    assert!(matches!(result, Err(ConfigError::Yaml { .. })));
}

#[test]
fn test_load_missing_stage_field() {
    let dir = create_test_dir();
    let path = write_pipeline(
        dir.path(),
        r#"
locks: { gpu: 1 }
stages:
  - name: incomplete
    os: rhel8
"#,
    );

    assert!(PipelineConfig::load(path).is_err());
}

#[test]
fn test_load_rejects_lock_larger_than_pool() {
    let dir = create_test_dir();
    let path = write_pipeline(
        dir.path(),
        &pipeline_yaml("gpu", 1, &[stage_entry("big", "p4d.24xlarge", "gpu", 4)]),
    );

    let err = PipelineConfig::load(path).unwrap_err();
    assert!(matches!(err, ConfigError::Invalid(_)));
}

#[test]
fn test_load_rejects_empty_pool() {
    let dir = create_test_dir();
    let path = write_pipeline(dir.path(), "locks: { gpu: 0 }");

    assert!(matches!(
        PipelineConfig::load(path),
        Err(ConfigError::Invalid(_))
    ));
}
