use nix::unistd::geteuid;
use std::process::{Command, Output};
use tempfile::TempDir;

const SPK_VARS: &[&str] = &[
    "SPK_DSM_VERSION",
    "SPK_PROCESSOR",
    "SPK_TELEPORT_VERSION",
    "SPK_RELEASE_URL",
    "SPK_CACHE_PATH",
    "SPK_OUTPUT_DIR",
    "SPK_CATALOG",
];

// Runs the binary with a clean SPK_* environment
fn run(args: &[&str]) -> Output {
    let mut command = Command::new(env!("CARGO_BIN_EXE_syno-spk-builder"));
    for var in SPK_VARS {
        command.env_remove(var);
    }
    command.args(args).output().expect("Failed to run binary")
}

// Stage a failing run is reported in: the guard rejects non-root users first
fn expected_stage(after_guard: &str) -> &str {
    if geteuid().is_root() {
        after_guard
    } else {
        "guard"
    }
}

#[test]
fn test_help_lists_choices() {
    let output = run(&["--help"]);

    assert_eq!(Some(0), output.status.code());
    let stdout = String::from_utf8(output.stdout).unwrap();
    assert!(stdout.contains("Supported DSM versions: 6.0"));
    assert!(stdout.contains("Supported processors:"));
    assert!(stdout.contains("geminilake"));
}

#[test]
fn test_unknown_flag_is_usage_error() {
    let output = run(&["--bogus-flag"]);

    assert_eq!(Some(2), output.status.code());
    assert!(output.stdout.is_empty());
}

#[test]
fn test_failure_reports_stage() {
    let dir = TempDir::new().unwrap();
    let out = dir.path().to_str().unwrap();
    let output = run(&[
        "--dsm-version",
        "9.9",
        "--processor",
        "geminilake",
        "--nocache",
        "--output-dir",
        out,
    ]);

    assert_eq!(Some(1), output.status.code());
    let stderr = String::from_utf8(output.stderr).unwrap();
    let prefix = format!("error ({} stage): ", expected_stage("resolve"));
    assert!(stderr.contains(&prefix), "unexpected stderr: {stderr}");
    assert!(std::fs::read_dir(dir.path()).unwrap().next().is_none());
}

#[test]
fn test_catalog_file_read_after_guard() {
    let dir = TempDir::new().unwrap();
    let catalog = dir.path().join("missing.json");
    let output = run(&[
        "--catalog",
        catalog.to_str().unwrap(),
        "--processor",
        "geminilake",
        "--nocache",
        "--output-dir",
        dir.path().to_str().unwrap(),
    ]);

    assert_eq!(Some(1), output.status.code());
    let stderr = String::from_utf8(output.stderr).unwrap();
    let prefix = format!("error ({} stage): ", expected_stage("resolve"));
    assert!(stderr.contains(&prefix), "unexpected stderr: {stderr}");
}
