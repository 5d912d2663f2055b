mod common;

use common::*;
use std::process::Command;

fn cli_command() -> Command {
    Command::new(env!("CARGO_BIN_EXE_cluster-test-pipeline"))
}

#[test]
fn test_cli_help() {
    let output = cli_command().arg("--help").output().unwrap();

    assert!(output.status.success());
    let stdout = String::from_utf8_lossy(&output.stdout);
    assert!(stdout.contains("Run hardware test stages"));
    assert!(stdout.contains("run"));
    assert!(stdout.contains("list"));
    assert!(stdout.contains("validate"));
    assert!(stdout.contains("name"));
}

#[test]
fn test_cli_version() {
    let output = cli_command().arg("--version").output().unwrap();

    assert!(output.status.success());
    let stdout = String::from_utf8_lossy(&output.stdout);
    assert!(stdout.contains("cluster-test-pipeline"));
}

#[test]
fn test_cli_run_help() {
    let output = cli_command().args(["run", "--help"]).output().unwrap();

    assert!(output.status.success());
    let stdout = String::from_utf8_lossy(&output.stdout);
    assert!(stdout.contains("Run every stage of a pipeline file"));
    assert!(stdout.contains("--build-tag"));
    assert!(stdout.contains("--filter"));
    assert!(stdout.contains("--summary"));
    assert!(stdout.contains("--skip-setup"));
}

#[test]
fn test_cli_name() {
    let output = cli_command()
        .args([
            "name",
            "--build-tag",
            "jenkins-PR-123 ",
            "--os",
            "ubuntu20.04",
            "--instance-type",
            "p4d.24xlarge",
        ])
        .output()
        .unwrap();

    assert!(output.status.success());
    let stdout = String::from_utf8_lossy(&output.stdout);
    let name = stdout.trim();
    assert!(name.starts_with("PR-123-ubuntu20"));
    assert!(name.contains("-p4d24xlarge-"));
    assert!(!name.contains('.'));
    assert!(name.len() <= 60);
}

#[test]
fn test_cli_list() {
    let dir = create_test_dir();
    let path = write_pipeline(
        dir.path(),
        &pipeline_yaml(
            "gpu",
            2,
            &[
                stage_entry("ubuntu-g5", "g5.xlarge", "gpu", 1),
                stage_entry("rhel-g5", "g5.xlarge", "gpu", 1),
            ],
        ),
    );

    let output = cli_command()
        .args(["list", path.to_str().unwrap()])
        .output()
        .unwrap();

    assert!(output.status.success());
    let stdout = String::from_utf8_lossy(&output.stdout);
    assert!(stdout.contains("ubuntu-g5"));
    assert!(stdout.contains("rhel-g5"));
    assert!(stdout.contains("Total: 2 stage(s)"));
}

#[test]
fn test_cli_validate_valid() {
    let dir = create_test_dir();
    let path = write_pipeline(
        dir.path(),
        &pipeline_yaml("gpu", 1, &[stage_entry("a", "g5.xlarge", "gpu", 1)]),
    );

    let output = cli_command()
        .args(["validate", path.to_str().unwrap()])
        .output()
        .unwrap();

    assert!(output.status.success());
    let stdout = String::from_utf8_lossy(&output.stdout);
    assert!(stdout.contains("✓"));
}

#[test]
fn test_cli_validate_invalid() {
    let dir = create_test_dir();
    let path = write_pipeline(
        dir.path(),
        &pipeline_yaml("gpu", 1, &[stage_entry("a", "g5.xlarge", "other", 1)]),
    );

    let output = cli_command()
        .args(["validate", path.to_str().unwrap()])
        .output()
        .unwrap();

    assert_eq!(output.status.code(), Some(1));
    let stdout = String::from_utf8_lossy(&output.stdout);
    assert!(stdout.contains("undefined lock"));
}

#[test]
fn test_cli_run_missing_file() {
    let output = cli_command()
        .args(["run", "/nonexistent/pipeline.yaml", "--build-tag", "x"])
        .output()
        .unwrap();

    assert_eq!(output.status.code(), Some(2));
}

#[cfg(unix)]
#[test]
fn test_cli_run_with_fake_tools() {
    let dir = create_test_dir();
    let bin = dir.path().join("bin");
    std::fs::create_dir(&bin).unwrap();

    // Stand-ins for the cloud CLIs and the orchestrator
    write_script(&bin.join("pcluster"), r#"echo '{"clusters": []}'"#);
    write_script(&bin.join("aws"), "echo 3");
    write_script(&bin.join("orchestrator"), "exit 65");

    let yaml = pipeline_yaml("gpu", 1, &[stage_entry("a", "g5.xlarge", "gpu", 1)])
        .replace("python: python3", &format!("python: {}", bin.join("orchestrator").display()))
        .replace(
            "stages:",
            &format!(
                "cloud:\n  aws: {}\n  pcluster: {}\nstages:",
                bin.join("aws").display(),
                bin.join("pcluster").display()
            ),
        );
    let path = write_pipeline(dir.path(), &yaml);
    let summary = dir.path().join("summary.json");

    let output = cli_command()
        .args([
            "run",
            path.to_str().unwrap(),
            "--summary",
            summary.to_str().unwrap(),
        ])
        .output()
        .unwrap();

    assert_eq!(output.status.code(), Some(65));
    let stdout = String::from_utf8_lossy(&output.stdout);
    assert!(stdout.contains("Result: unstable"));
    assert!(summary.exists());
}

#[cfg(unix)]
fn write_script(path: &std::path::Path, body: &str) {
    use std::os::unix::fs::PermissionsExt;

    std::fs::write(path, format!("#!/bin/sh\n{}\n", body)).unwrap();
    let mut perms = std::fs::metadata(path).unwrap().permissions();
    perms.set_mode(0o755);
    std::fs::set_permissions(path, perms).unwrap();
}
