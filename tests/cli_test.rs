use assert_cmd::Command;
use nix::unistd::geteuid;
use predicates::prelude::*;
use serial_test::serial;
use std::fs;
use tempfile::TempDir;

fn vmimport(temp: &TempDir) -> Command {
    let mut cmd = Command::cargo_bin("vmimport").unwrap();
    cmd.env("VMIMPORT_CONFIG", temp.path().join("vmimport.toml"))
        .env("NO_COLOR", "1")
        .env_remove("RUST_LOG");
    cmd
}

#[test]
fn test_help_output() {
    let mut cmd = Command::cargo_bin("vmimport").unwrap();
    cmd.arg("--help")
        .assert()
        .success()
        .stdout(predicate::str::contains("provision"))
        .stdout(predicate::str::contains("reload"));
}

#[test]
fn test_version_output() {
    let mut cmd = Command::cargo_bin("vmimport").unwrap();
    cmd.arg("--version")
        .assert()
        .success()
        .stdout(predicate::str::contains(env!("CARGO_PKG_VERSION")));
}

#[test]
#[serial]
fn test_status_reports_missing_export() {
    let temp = TempDir::new().unwrap();
    let exports = temp.path().join("exports");
    fs::write(&exports, "/data *(rw)\n").unwrap();

    vmimport(&temp)
        .arg("--exports-file")
        .arg(&exports)
        .arg("--template-dir")
        .arg(temp.path().join("templates"))
        .arg("status")
        .assert()
        .success()
        .stdout(predicate::str::contains("OS family:"))
        .stdout(predicate::str::contains("does not exist yet"))
        .stderr(predicate::str::contains("has no entry"));

    assert_eq!(fs::read_to_string(&exports).unwrap(), "/data *(rw)\n");
}

#[test]
#[serial]
fn test_status_reports_present_export() {
    let temp = TempDir::new().unwrap();
    let templates = temp.path().join("templates");
    fs::create_dir_all(&templates).unwrap();
    fs::write(templates.join("vm.ovf"), "ovf").unwrap();
    let exports = temp.path().join("exports");
    fs::write(
        &exports,
        format!(
            "{} *(rw,sync,no_subtree_check,no_root_squash)\n",
            templates.display()
        ),
    )
    .unwrap();

    vmimport(&temp)
        .arg("--exports-file")
        .arg(&exports)
        .arg("--template-dir")
        .arg(&templates)
        .arg("status")
        .assert()
        .success()
        .stdout(predicate::str::contains("Exported"))
        .stdout(predicate::str::contains(": 1"));
}

#[test]
#[serial]
fn test_invalid_config_fails() {
    let temp = TempDir::new().unwrap();
    fs::write(temp.path().join("vmimport.toml"), "ui = \"curses\"\n").unwrap();

    vmimport(&temp)
        .arg("status")
        .assert()
        .code(1)
        .stderr(predicate::str::contains("Failed to parse config file"));
}

#[test]
#[serial]
fn test_privileged_commands_refuse_regular_users() {
    if geteuid().is_root() {
        // the privilege gate passes for root; nothing to observe here
        return;
    }
    let temp = TempDir::new().unwrap();
    let exports = temp.path().join("exports");

    for args in [
        vec!["provision"],
        vec!["reload"],
        vec!["export", "/srv/templates"],
    ] {
        vmimport(&temp)
            .arg("--exports-file")
            .arg(&exports)
            .args(&args)
            .assert()
            .code(1)
            .stderr(predicate::str::contains("must be run as root"));
    }
    assert!(!exports.exists());
}

#[test]
#[serial]
fn test_bad_export_path_is_rejected_before_any_change() {
    let temp = TempDir::new().unwrap();
    let exports = temp.path().join("exports");
    let templates = temp.path().join("my templates");

    for args in [vec!["provision"], vec!["export", "relative/dir"]] {
        vmimport(&temp)
            .arg("--exports-file")
            .arg(&exports)
            .arg("--template-dir")
            .arg(&templates)
            .args(&args)
            .assert()
            .code(1)
            .stderr(predicate::str::contains("Export path"))
            .stderr(predicate::str::contains("must be run as root").not());
    }
    assert!(!exports.exists());
    assert!(!templates.exists());
}
