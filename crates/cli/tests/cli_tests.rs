//! CLI integration tests

use std::process::Command;

fn stackmend(args: &[&str]) -> std::process::Output {
    Command::new("cargo")
        .args(["run", "-q", "-p", "stackmend-cli", "--"])
        .args(args)
        .output()
        .expect("Failed to execute command")
}

/// Test that the CLI shows help
#[test]
fn test_cli_help() {
    let output = stackmend(&["--help"]);
    let stdout = String::from_utf8_lossy(&output.stdout);

    assert!(output.status.success(), "CLI help should succeed");
    assert!(
        stdout.contains("Stuck stack remediation"),
        "Should show app description"
    );
    assert!(stdout.contains("inspect"), "Should show inspect command");
    assert!(stdout.contains("fix"), "Should show fix command");
    assert!(stdout.contains("gate"), "Should show gate command");
    assert!(stdout.contains("monitor"), "Should show monitor command");
    assert!(
        stdout.contains("--environment <ENVIRONMENT>"),
        "Should show environment option"
    );
}

/// Test that the CLI shows version
#[test]
fn test_cli_version() {
    let output = stackmend(&["--version"]);
    let stdout = String::from_utf8_lossy(&output.stdout);

    assert!(output.status.success(), "CLI version should succeed");
    assert!(stdout.contains("stackmend"), "Should show binary name");
}

#[test]
fn test_inspect_help() {
    let output = stackmend(&["inspect", "--help"]);
    let stdout = String::from_utf8_lossy(&output.stdout);

    assert!(output.status.success(), "Inspect help should succeed");
    assert!(stdout.contains("--stack-name"), "Should show stack-name option");
    assert!(
        stdout.contains("--treat-in-progress-as-stuck"),
        "Should show in-progress override"
    );
}

#[test]
fn test_fix_help() {
    let output = stackmend(&["fix", "--help"]);
    let stdout = String::from_utf8_lossy(&output.stdout);

    assert!(output.status.success(), "Fix help should succeed");
    assert!(stdout.contains("--dry-run"), "Should show dry-run option");
    assert!(stdout.contains("--force-delete"), "Should show force-delete option");
    assert!(
        stdout.contains("--delete-in-progress"),
        "Should show delete-in-progress option"
    );
    assert!(
        stdout.contains("--skip-unfixable"),
        "Should show skip-unfixable option"
    );
}

#[test]
fn test_gate_help() {
    let output = stackmend(&["gate", "--help"]);
    let stdout = String::from_utf8_lossy(&output.stdout);

    assert!(output.status.success(), "Gate help should succeed");
    assert!(stdout.contains("--auto-fix"), "Should show auto-fix option");
    assert!(
        stdout.contains("--skip-ecs-after-rollback"),
        "Should show skip-ecs-after-rollback option"
    );
}

#[test]
fn test_monitor_help() {
    let output = stackmend(&["monitor", "--help"]);
    let stdout = String::from_utf8_lossy(&output.stdout);

    assert!(output.status.success(), "Monitor help should succeed");
    assert!(stdout.contains("--continuous"), "Should show continuous option");
    assert!(stdout.contains("--interval"), "Should show interval option");
    assert!(stdout.contains("--duration"), "Should show duration option");
}

/// Unknown subcommands are usage errors and exit with the failure code
#[test]
fn test_invalid_command() {
    let output = stackmend(&["invalid-command"]);

    assert!(!output.status.success(), "Invalid command should fail");
    assert_eq!(output.status.code(), Some(3));
}

/// The environment is a required argument, rejected before any backend is contacted
#[test]
fn test_missing_environment() {
    let output = stackmend(&["inspect"]);
    let stderr = String::from_utf8_lossy(&output.stderr);

    assert_eq!(output.status.code(), Some(3));
    assert!(
        stderr.contains("--environment <ENVIRONMENT>"),
        "Should name the missing environment argument"
    );
}

/// The environment belongs to the top-level command, not the subcommand
#[test]
fn test_environment_after_subcommand_rejected() {
    let output = stackmend(&["inspect", "--environment", "dev"]);

    assert_eq!(output.status.code(), Some(3));
}

#[test]
fn test_invalid_output_format() {
    let output = stackmend(&["--format", "yaml", "inspect"]);

    assert!(!output.status.success(), "Unknown format should fail");
}
