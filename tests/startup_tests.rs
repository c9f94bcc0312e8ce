//! Tests for main.rs startup validation (SESSION_SECRET, base URL, lifetimes, --issue-session)

use std::process::{Command, Output, Stdio};
use std::time::Duration;

const LONG_SECRET: &str = "test-secret-that-is-long-enough!!";

fn cargo_bin() -> std::path::PathBuf {
    // Get the path to the compiled binary
    let mut path = std::env::current_exe().unwrap();
    path.pop(); // Remove test binary name
    path.pop(); // Remove deps
    path.push("sessionrook");
    path
}

fn temp_db(name: &str) -> std::path::PathBuf {
    std::env::temp_dir().join(format!("sessionrook_{}_{}.db", name, std::process::id()))
}

fn combined_output(output: &Output) -> String {
    // tracing logs to stdout by default
    let stdout = String::from_utf8_lossy(&output.stdout);
    let stderr = String::from_utf8_lossy(&output.stderr);
    format!("{}{}", stdout, stderr)
}

#[test]
fn test_missing_secret_exits_with_error() {
    let output = Command::new(cargo_bin())
        .env_remove("SESSION_SECRET")
        .stderr(Stdio::piped())
        .stdout(Stdio::piped())
        .output()
        .expect("Failed to run binary");

    assert!(
        !output.status.success(),
        "Should exit with error when SESSION_SECRET is missing"
    );

    let combined = combined_output(&output);
    assert!(
        combined.contains("SESSION_SECRET") && combined.contains("required"),
        "Should mention SESSION_SECRET is required, got: {}",
        combined
    );
}

#[test]
fn test_short_secret_exits_with_error() {
    let output = Command::new(cargo_bin())
        .env("SESSION_SECRET", "too-short")
        .stderr(Stdio::piped())
        .stdout(Stdio::piped())
        .output()
        .expect("Failed to run binary");

    assert!(!output.status.success());
    let combined = combined_output(&output);
    assert!(
        combined.contains("shorter than 32"),
        "Should mention minimum length, got: {}",
        combined
    );
}

#[test]
fn test_http_non_localhost_exits_with_error() {
    let output = Command::new(cargo_bin())
        .env("SESSION_SECRET", LONG_SECRET)
        .args(["--base-url", "http://example.com"])
        .stderr(Stdio::piped())
        .stdout(Stdio::piped())
        .output()
        .expect("Failed to run binary");

    assert!(
        !output.status.success(),
        "Should exit with error when using HTTP for non-localhost"
    );

    let combined = combined_output(&output);
    assert!(
        combined.contains("HTTPS"),
        "Should mention HTTPS requirement, got: {}",
        combined
    );
}

#[test]
fn test_inconsistent_lifetimes_exit_with_error() {
    let output = Command::new(cargo_bin())
        .env("SESSION_SECRET", LONG_SECRET)
        .args(["--token-lifetime", "600", "--session-lifetime", "60"])
        .stderr(Stdio::piped())
        .stdout(Stdio::piped())
        .output()
        .expect("Failed to run binary");

    assert!(!output.status.success());
    let combined = combined_output(&output);
    assert!(
        combined.contains("session-lifetime"),
        "Should mention session-lifetime, got: {}",
        combined
    );
}

#[test]
fn test_out_of_range_duration_exits_with_error() {
    let output = Command::new(cargo_bin())
        .env("SESSION_SECRET", LONG_SECRET)
        .args(["--max-session-age", "18446744073709551615"])
        .stderr(Stdio::piped())
        .stdout(Stdio::piped())
        .output()
        .expect("Failed to run binary");

    assert!(!output.status.success());
    let combined = combined_output(&output);
    assert!(
        combined.contains("out of range"),
        "Should mention the duration bound, got: {}",
        combined
    );
}

#[test]
fn test_issue_session_prints_cookie() {
    let db_path = temp_db("issue");

    let mut child = Command::new(cargo_bin())
        .env("SESSION_SECRET", LONG_SECRET)
        .args([
            "--database",
            db_path.to_str().unwrap(),
            "--port",
            "0",
            "--issue-session",
            "42",
        ])
        .stderr(Stdio::piped())
        .stdout(Stdio::piped())
        .spawn()
        .expect("Failed to run binary");

    // Give it a moment to start or fail
    std::thread::sleep(Duration::from_millis(1000));

    match child.try_wait() {
        Ok(Some(status)) => {
            let output = child.wait_with_output().unwrap();
            panic!(
                "Server exited unexpectedly with status {:?}, output: {}",
                status,
                combined_output(&output)
            );
        }
        Ok(None) => {
            // Still running - good! Kill it.
            child.kill().ok();
        }
        Err(e) => {
            panic!("Error checking process status: {}", e);
        }
    }

    let output = child.wait_with_output().unwrap();
    let _ = std::fs::remove_file(&db_path);

    let stdout = String::from_utf8_lossy(&output.stdout);
    assert!(
        stdout.contains("created for user 42") && stdout.contains("Cookie: session="),
        "Should print the issued session, got: {}",
        stdout
    );
}
