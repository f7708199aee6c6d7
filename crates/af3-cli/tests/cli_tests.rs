//! Integration tests for the af3-compose binary.
//!
//! These tests exercise the compiled binary using assert_cmd against the
//! config tree shipped in `configs/`.

use af3_test_utils::{ConfigTree, configs_dir};
use assert_cmd::Command;
use predicates::prelude::*;
use tempfile::tempdir;

/// Get a Command for the af3-compose binary, pointed at the shipped configs
fn af3_cmd() -> Command {
    let mut cmd = Command::cargo_bin("af3-compose").expect("Failed to find af3-compose binary");
    cmd.env("AF3_CONFIG_DIR", configs_dir())
        .env("PROJECT_ROOT", "/work")
        .env_remove("RUST_LOG");
    cmd
}

// ============================================================================
// Help
// ============================================================================

#[test]
fn test_help_lists_commands() {
    af3_cmd()
        .arg("--help")
        .assert()
        .success()
        .stdout(predicate::str::contains("compose"))
        .stdout(predicate::str::contains("groups"));
}

// ============================================================================
// Groups
// ============================================================================

#[test]
fn test_groups_lists_alternatives() {
    af3_cmd()
        .arg("groups")
        .assert()
        .success()
        .stdout(predicate::str::contains("atom, pdb"))
        .stdout(predicate::str::contains("atom_finetune, large_crop"))
        .stdout(predicate::str::contains("Primary configs:"))
        .stdout(predicate::str::contains("train"));
}

#[test]
fn test_missing_config_dir_is_reported() {
    let dir = tempdir().unwrap();
    af3_cmd()
        .args(["groups", "--config-dir"])
        .arg(dir.path().join("nope"))
        .assert()
        .failure()
        .stderr(predicate::str::contains("Config directory not found"));
}

// ============================================================================
// Compose
// ============================================================================

#[test]
fn test_compose_experiment_as_json() {
    let output = af3_cmd()
        .args(["compose", "--format", "json", "experiment=large_crop"])
        .output()
        .unwrap();
    assert!(output.status.success(), "{}", String::from_utf8_lossy(&output.stderr));

    let config: serde_json::Value = serde_json::from_slice(&output.stdout).unwrap();
    assert_eq!(config["data"]["crop_size"], 5120);
    assert_eq!(config["model"]["optimizer"]["lr"], 1.0e-4);
    assert_eq!(config["data"]["batch_size"], 256);
    assert_eq!(config["model"]["dtype"]["_callable_"], "torch.float32");
    assert_eq!(config["logger"]["wandb"]["tags"], config["tags"]);
    assert!(
        config["paths"]["output_dir"]
            .as_str()
            .unwrap()
            .starts_with("/work/logs/train/runs/")
    );
}

#[test]
fn test_compose_prints_choices() {
    af3_cmd()
        .args(["compose", "--choices", "experiment=atom_finetune", "trainer=default"])
        .assert()
        .success()
        .stdout(predicate::str::contains("data: atom"))
        .stdout(predicate::str::contains("trainer: default"))
        .stdout(predicate::str::contains("logger: csv"))
        .stdout(predicate::str::contains("experiment: atom_finetune"));
}

#[test]
fn test_compose_writes_output_file() {
    let dir = tempdir().unwrap();
    let output = dir.path().join("run.yaml");

    af3_cmd()
        .args(["compose", "data.crop_size=640", "~callbacks.early_stopping", "--output"])
        .arg(&output)
        .assert()
        .success()
        .stderr(predicate::str::contains("Wrote train config"));

    let written = std::fs::read_to_string(&output).unwrap();
    assert!(written.contains("crop_size: 640"), "{written}");
    assert!(!written.contains("early_stopping"), "{written}");
}

#[test]
fn test_compose_from_custom_config_dir() {
    let tree = ConfigTree::new()
        .file("eval.yaml", "defaults:\n  - data: small\nname: ${data.name}\n")
        .file("data/small.yaml", "name: small\nsize: 8\n")
        .build();

    af3_cmd()
        .args(["compose", "-c", "eval", "--config-dir"])
        .arg(tree.path())
        .assert()
        .success()
        .stdout(predicate::str::contains("name: small"))
        .stdout(predicate::str::contains("size: 8"));
}

// ============================================================================
// Errors
// ============================================================================

#[test]
fn test_unknown_alternative_fails() {
    af3_cmd()
        .args(["compose", "data=cath"])
        .assert()
        .failure()
        .code(1)
        .stderr(predicate::str::contains("error"))
        .stderr(predicate::str::contains("Config not found: data/cath"));
}

#[test]
fn test_malformed_override_fails() {
    af3_cmd()
        .args(["compose", "data.crop_size"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("Invalid override `data.crop_size`"));
}

#[test]
fn test_new_key_needs_plus() {
    af3_cmd()
        .args(["compose", "trainer.profiler=simple"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("+trainer.profiler=simple"));

    af3_cmd()
        .args(["compose", "+trainer.profiler=simple"])
        .assert()
        .success()
        .stdout(predicate::str::contains("profiler: simple"));
}

#[test]
fn test_unknown_primary_fails() {
    af3_cmd()
        .args(["compose", "--config-name", "eval"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("Primary config not found: eval"));
}
