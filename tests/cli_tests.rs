// CLI behaviour of the conductor binary

use assert_cmd::Command;
use predicates::prelude::*;
use std::path::{Path, PathBuf};
use tempfile::TempDir;

const FAN_OUT: &str = r#"
id = "fan-out"
name = "Fan out"

[[tasks]]
id = "A"
name = "prepare"
estimated_duration_ms = 100

[[tasks]]
id = "B"
name = "left"
estimated_duration_ms = 300
dependencies = ["A"]

[[tasks]]
id = "C"
name = "right"
estimated_duration_ms = 50
dependencies = ["A"]
"#;

const CYCLE: &str = r#"{
  "id": "cyclic",
  "name": "Cyclic",
  "tasks": [
    { "id": "A", "name": "a", "dependencies": ["B"] },
    { "id": "B", "name": "b", "dependencies": ["A"] }
  ]
}"#;

fn write(dir: &TempDir, name: &str, content: &str) -> PathBuf {
    let path = dir.path().join(name);
    std::fs::write(&path, content).unwrap();
    path
}

fn conductor(dir: &Path) -> Command {
    let mut cmd = Command::cargo_bin("conductor").unwrap();
    cmd.current_dir(dir).env("RUST_LOG", "warn");
    cmd
}

#[test]
fn test_no_subcommand_shows_guidance() {
    let dir = TempDir::new().unwrap();
    conductor(dir.path())
        .assert()
        .success()
        .stdout(predicate::str::contains("conductor plan <definition>"));
}

#[test]
fn test_plan_prints_levels_and_critical_path() {
    let dir = TempDir::new().unwrap();
    let definition = write(&dir, "fan_out.toml", FAN_OUT);

    conductor(dir.path())
        .arg("plan")
        .arg(&definition)
        .assert()
        .success()
        .stdout(predicate::str::contains("Level 0: A"))
        .stdout(predicate::str::contains("Level 1: B, C"))
        .stdout(predicate::str::contains("Critical path: A -> B"))
        .stdout(predicate::str::contains("Estimated total: 400ms (parallel)"));
}

#[test]
fn test_plan_sequential_estimate() {
    let dir = TempDir::new().unwrap();
    let definition = write(&dir, "fan_out.toml", FAN_OUT);

    conductor(dir.path())
        .args(["plan", "--sequential"])
        .arg(&definition)
        .assert()
        .success()
        .stdout(predicate::str::contains("Estimated total: 450ms (sequential)"));
}

#[test]
fn test_plan_json_output() {
    let dir = TempDir::new().unwrap();
    let definition = write(&dir, "fan_out.toml", FAN_OUT);

    let output = conductor(dir.path())
        .args(["plan", "--json"])
        .arg(&definition)
        .output()
        .unwrap();
    assert!(output.status.success());

    let plan: serde_json::Value = serde_json::from_slice(&output.stdout).unwrap();
    assert_eq!(plan["execution_order"], serde_json::json!(["A", "B", "C"]));
    assert_eq!(plan["critical_path"], serde_json::json!(["A", "B"]));
}

#[test]
fn test_plan_rejects_cycle() {
    let dir = TempDir::new().unwrap();
    let definition = write(&dir, "cyclic.json", CYCLE);

    conductor(dir.path())
        .arg("plan")
        .arg(&definition)
        .assert()
        .failure()
        .stderr(predicate::str::contains("circular dependency"));
}

#[test]
fn test_plan_missing_file() {
    let dir = TempDir::new().unwrap();
    conductor(dir.path())
        .args(["plan", "missing.toml"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("failed to read workflow definition"));
}

#[test]
fn test_run_completes() {
    let dir = TempDir::new().unwrap();
    let definition = write(&dir, "fan_out.toml", FAN_OUT);

    conductor(dir.path())
        .arg("run")
        .arg(&definition)
        .assert()
        .success()
        .stdout(predicate::str::contains("Workflow completed"))
        .stdout(predicate::str::contains("3 total, 3 completed, 0 failed"));
}

#[test]
fn test_run_with_failing_task() {
    let dir = TempDir::new().unwrap();
    let definition = write(&dir, "fan_out.toml", FAN_OUT);

    conductor(dir.path())
        .args(["run", "--fail", "B"])
        .arg(&definition)
        .assert()
        .failure()
        .stdout(predicate::str::contains("Workflow failed"))
        .stdout(predicate::str::contains("task B failed after 3 attempts"));
}

#[test]
fn test_run_uses_configured_default_retries() {
    let dir = TempDir::new().unwrap();
    let definition = write(&dir, "fan_out.toml", FAN_OUT);

    conductor(dir.path())
        .args(["run", "--fail", "B"])
        .arg(&definition)
        .env("CONDUCTOR_ORCHESTRATOR__DEFAULT_MAX_RETRIES", "1")
        .assert()
        .failure()
        .stdout(predicate::str::contains("task B failed after 1 attempts"));
}

#[test]
fn test_config_prints_defaults() {
    let dir = TempDir::new().unwrap();
    conductor(dir.path())
        .arg("config")
        .assert()
        .success()
        .stdout(predicate::str::contains("[retry]"))
        .stdout(predicate::str::contains("strategy = \"exponential_jitter\""))
        .stdout(predicate::str::contains("max_concurrent_tasks = 8"));
}

#[test]
fn test_config_file_and_env_layering() {
    let dir = TempDir::new().unwrap();
    write(
        &dir,
        "conductor.toml",
        "[orchestrator]\nmax_concurrent_tasks = 2\n",
    );

    conductor(dir.path())
        .arg("config")
        .env("CONDUCTOR_RETRY__MAX_ATTEMPTS", "7")
        .assert()
        .success()
        .stdout(predicate::str::contains("max_concurrent_tasks = 2"))
        .stdout(predicate::str::contains("max_attempts = 7"));
}
