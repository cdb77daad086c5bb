//! CLI integration tests

use std::process::Command;

fn eris() -> Command {
    Command::new(env!("CARGO_BIN_EXE_eris"))
}

/// Test that the CLI shows help
#[test]
fn test_cli_help() {
    let output = eris().arg("--help").output().expect("Failed to execute command");
    let stdout = String::from_utf8_lossy(&output.stdout);

    assert!(output.status.success(), "CLI help should succeed");
    assert!(stdout.contains("anomaly detector"), "Should show app description");
    assert!(stdout.contains("detect"), "Should show detect command");
    assert!(stdout.contains("history"), "Should show history command");
    assert!(stdout.contains("models"), "Should show models command");
    assert!(stdout.contains("status"), "Should show status command");
}

/// Test that the CLI shows version
#[test]
fn test_cli_version() {
    let output = eris().arg("--version").output().expect("Failed to execute command");
    let stdout = String::from_utf8_lossy(&output.stdout);

    assert!(output.status.success(), "CLI version should succeed");
    assert!(stdout.contains("eris"), "Should show binary name");
}

/// Test detect subcommand help
#[test]
fn test_detect_help() {
    let output = eris()
        .args(["detect", "--help"])
        .output()
        .expect("Failed to execute command");
    let stdout = String::from_utf8_lossy(&output.stdout);

    assert!(output.status.success(), "Detect help should succeed");
    assert!(stdout.contains("--entity"), "Should show entity option");
    assert!(stdout.contains("--kind"), "Should show kind option");
    assert!(stdout.contains("--interface"), "Should show interface option");
}

/// Test history subcommand help
#[test]
fn test_history_help() {
    let output = eris()
        .args(["history", "--help"])
        .output()
        .expect("Failed to execute command");
    let stdout = String::from_utf8_lossy(&output.stdout);

    assert!(output.status.success(), "History help should succeed");
    assert!(stdout.contains("--limit"), "Should show limit option");
    assert!(stdout.contains("--anomalies"), "Should show anomalies option");
}

/// Test that detect requires an entity
#[test]
fn test_detect_requires_entity() {
    let output = eris()
        .args(["detect", "--kind", "cpu", "--value", "1.0"])
        .output()
        .expect("Failed to execute command");

    assert!(!output.status.success(), "Missing --entity should fail");
    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(stderr.contains("--entity"), "Should name the missing option");
}

/// Test that an unknown kind is refused
#[test]
fn test_detect_rejects_unknown_kind() {
    let output = eris()
        .args(["detect", "--entity", "1", "--kind", "gpu", "--value", "1.0"])
        .output()
        .expect("Failed to execute command");

    assert!(!output.status.success(), "Unknown kind should fail");
}

/// Test that an unreachable detector is reported as an error
#[test]
fn test_unreachable_detector_fails() {
    let output = eris()
        .args(["--api-url", "http://127.0.0.1:9", "models"])
        .output()
        .expect("Failed to execute command");

    assert!(!output.status.success(), "Unreachable detector should fail");
}
