use assert_cmd::Command;
use predicates::prelude::*;
use serde_json::Value;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tempfile::TempDir;

use stackwright::test_utils::{RecordingProvider, TemplateFixture, test_stack};

use super::params;

/// A command with an explicit config file so the user's home directory is not consulted.
fn stackwright(dir: &Path) -> Command {
    let config = dir.join("config.toml");
    if !config.exists() {
        std::fs::write(&config, "stack_name = \"test\"\n").unwrap();
    }
    let mut cmd = Command::cargo_bin("stackwright").unwrap();
    cmd.env_remove("RUST_LOG").arg("--config").arg(config);
    cmd
}

fn write(dir: &TempDir, fixture: &TemplateFixture) -> PathBuf {
    fixture.write_to(dir.path()).unwrap()
}

#[test]
fn test_validate_accepts_a_valid_template() {
    let dir = TempDir::new().unwrap();
    let template = write(&dir, &TemplateFixture::basic());

    stackwright(dir.path())
        .args(["validate", "--template"])
        .arg(&template)
        .args(["-p", "Env=prod"])
        .assert()
        .success()
        .stdout(predicate::str::contains("is valid"))
        .stdout(predicate::str::contains("3 resource(s)"));
}

#[test]
fn test_validate_reports_cycles_and_rules() {
    let dir = TempDir::new().unwrap();
    let cyclic = write(&dir, &TemplateFixture::cyclic());
    stackwright(dir.path())
        .args(["validate", "--template"])
        .arg(&cyclic)
        .assert()
        .failure()
        .stderr(predicate::str::contains("Circular dependency detected between resources: A, B"));

    let rules = write(&dir, &TemplateFixture::with_rule());
    stackwright(dir.path())
        .args(["validate", "--template"])
        .arg(&rules)
        .args(["-p", "Size=large"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("only small stacks are supported"));

    let missing = write(&dir, &TemplateFixture::missing_reference());
    stackwright(dir.path())
        .args(["validate", "--template"])
        .arg(&missing)
        .assert()
        .failure()
        .stderr(predicate::str::contains("Did you mean 'Topic'?"));
}

#[test]
fn test_validate_json_report() {
    let dir = TempDir::new().unwrap();
    let template = write(&dir, &TemplateFixture::basic());

    let output = stackwright(dir.path())
        .args(["validate", "--format", "json", "--template"])
        .arg(&template)
        .output()
        .unwrap();
    assert!(output.status.success());
    let report: Value = serde_json::from_slice(&output.stdout).unwrap();
    assert_eq!(report["valid"], true);
    assert_eq!(report["resources"], 3);
    assert_eq!(report["conditions"], 1);
}

#[test]
fn test_graph_prints_levels() {
    let dir = TempDir::new().unwrap();
    let template = write(&dir, &TemplateFixture::basic());

    stackwright(dir.path())
        .args(["graph", "--improved", "--template"])
        .arg(&template)
        .assert()
        .success()
        .stdout(predicate::str::contains("Level 1:").and(predicate::str::contains("Topic")))
        .stdout(predicate::str::contains("Level 3:").and(predicate::str::contains("Alarm")));
}

#[test]
fn test_plan_json_for_a_new_stack() {
    let dir = TempDir::new().unwrap();
    let template = write(&dir, &TemplateFixture::basic());

    let output = stackwright(dir.path())
        .args(["plan", "--format", "json", "--template"])
        .arg(&template)
        .args(["-p", "Env=prod"])
        .output()
        .unwrap();
    assert!(output.status.success(), "{}", String::from_utf8_lossy(&output.stderr));

    let plan: Value = serde_json::from_slice(&output.stdout).unwrap();
    let ids: Vec<&str> = plan["changes"]
        .as_array()
        .unwrap()
        .iter()
        .map(|change| change["logicalId"].as_str().unwrap())
        .collect();
    assert_eq!(ids, vec!["Topic", "Queue", "Alarm"]);
    assert_eq!(plan["changes"][0]["operation"], "CREATE");
    assert_eq!(plan["conditions"]["IsProd"], true);
}

#[tokio::test]
async fn test_plan_against_recorded_state() {
    let dir = TempDir::new().unwrap();
    let fixture = TemplateFixture::basic();
    let template = write(&dir, &fixture);

    let mut stack = test_stack(Arc::new(RecordingProvider::new()));
    let state = stack.update_stack(fixture.template().unwrap(), &params(&[])).await.unwrap();
    let state_path = dir.path().join("state.json");
    std::fs::write(&state_path, state.to_json_pretty().unwrap()).unwrap();

    stackwright(dir.path())
        .args(["plan", "--template"])
        .arg(&template)
        .arg("--state")
        .arg(&state_path)
        .assert()
        .success()
        .stdout(predicate::str::contains("No changes."));

    stackwright(dir.path())
        .args(["plan", "--template"])
        .arg(&template)
        .arg("--state")
        .arg(&state_path)
        .args(["-p", "Env=prod"])
        .assert()
        .success()
        .stdout(predicate::str::contains("Alarm (Test::Alarm)"));
}

#[test]
fn test_missing_template_fails_cleanly() {
    let dir = TempDir::new().unwrap();
    stackwright(dir.path())
        .args(["plan", "--template"])
        .arg(dir.path().join("absent.yaml"))
        .assert()
        .failure()
        .stderr(predicate::str::contains("error:"));
}
