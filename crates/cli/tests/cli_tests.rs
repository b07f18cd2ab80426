//! CLI integration tests

use std::process::Command;

fn run_cli(args: &[&str]) -> std::process::Output {
    Command::new("cargo")
        .args(["run", "-q", "-p", "fleetmon-cli", "--"])
        .args(args)
        .output()
        .expect("Failed to execute command")
}

/// Test that the CLI shows help
#[test]
fn test_cli_help() {
    let output = run_cli(&["--help"]);
    let stdout = String::from_utf8_lossy(&output.stdout);

    assert!(output.status.success(), "CLI help should succeed");
    assert!(stdout.contains("Fleet Monitor"), "Should show app name");
    assert!(stdout.contains("health"), "Should show health command");
    assert!(stdout.contains("alerts"), "Should show alerts command");
    assert!(stdout.contains("ack"), "Should show ack command");
    assert!(stdout.contains("containers"), "Should show containers command");
    assert!(stdout.contains("runners"), "Should show runners command");
    assert!(stdout.contains("checks"), "Should show checks command");
}

/// Test that the CLI shows version
#[test]
fn test_cli_version() {
    let output = run_cli(&["--version"]);
    let stdout = String::from_utf8_lossy(&output.stdout);

    assert!(output.status.success(), "CLI version should succeed");
    assert!(stdout.contains("fleetmon"), "Should show binary name");
}

/// Test alerts subcommand help
#[test]
fn test_alerts_help() {
    let output = run_cli(&["alerts", "--help"]);
    let stdout = String::from_utf8_lossy(&output.stdout);

    assert!(output.status.success(), "Alerts help should succeed");
    assert!(stdout.contains("--level"), "Should show level option");
    assert!(stdout.contains("--type"), "Should show type option");
    assert!(
        stdout.contains("--acknowledged"),
        "Should show acknowledged option"
    );
}

/// Test format and api-url options
#[test]
fn test_global_options() {
    let output = run_cli(&["--help"]);
    let stdout = String::from_utf8_lossy(&output.stdout);

    assert!(stdout.contains("--format"), "Should show format option");
    assert!(stdout.contains("table"), "Should show table format");
    assert!(stdout.contains("json"), "Should show json format");
    assert!(stdout.contains("--api-url"), "Should show api-url option");
    assert!(stdout.contains("FLEETMON_API_URL"), "Should show env var");
}

/// Test that an unknown alert level is rejected before any request
#[test]
fn test_invalid_level_is_rejected() {
    let output = run_cli(&["alerts", "--level", "SEVERE"]);

    assert!(!output.status.success(), "Unknown level should fail");
    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(
        stderr.contains("unknown alert level"),
        "Should explain the bad level"
    );
}

/// Test invalid command error handling
#[test]
fn test_invalid_command() {
    let output = run_cli(&["invalid-command"]);

    assert!(!output.status.success(), "Invalid command should fail");

    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(
        stderr.contains("error") || stderr.contains("invalid"),
        "Should show error message"
    );
}

/// Test missing required argument error handling
#[test]
fn test_ack_requires_id() {
    let output = run_cli(&["ack"]);

    assert!(!output.status.success(), "Missing argument should fail");

    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(
        stderr.contains("required") || stderr.contains("error"),
        "Should show error about missing argument"
    );
}
