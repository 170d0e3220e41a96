//! CLI subprocess integration tests.
//!
//! These tests invoke the `berth` binary as a subprocess against the mock
//! provider and verify exit codes, stdout content, and JSON output.

use std::net::TcpListener;
use std::path::{Path, PathBuf};
use std::process::{Command, Output};

fn berth_bin() -> Command {
    let mut cmd = Command::new(env!("CARGO_BIN_EXE_berth"));
    cmd.env_remove("BERTH_LOG");
    cmd
}

fn write_config(dir: &Path, content: &str) -> PathBuf {
    let path = dir.join("berth.toml");
    std::fs::write(&path, content).unwrap();
    path
}

fn berth_mock(config: &Path, args: &[&str]) -> Output {
    berth_bin()
        .args(["--provider", "mock", "--config"])
        .arg(config)
        .args(args)
        .output()
        .unwrap()
}

fn stdout(output: &Output) -> String {
    String::from_utf8_lossy(&output.stdout).into_owned()
}

fn stderr(output: &Output) -> String {
    String::from_utf8_lossy(&output.stderr).into_owned()
}

#[test]
fn cli_version_exits_zero() {
    let output = berth_bin().arg("--version").output().unwrap();
    assert!(output.status.success(), "berth --version must exit 0");
    assert!(stdout(&output).contains("berth"));
}

#[test]
fn cli_help_lists_commands() {
    let output = berth_bin().arg("--help").output().unwrap();
    assert!(output.status.success());
    let out = stdout(&output);
    for cmd in ["run", "validate", "doctor", "completions"] {
        assert!(out.contains(cmd), "help must list '{cmd}': {out}");
    }
}

#[test]
fn validate_json_shows_defaults() {
    let dir = tempfile::tempdir().unwrap();
    let config = write_config(dir.path(), "image = \"nginx\"\nports = [[80, 8080]]\n");

    let output = berth_mock(&config, &["validate", "--json"]);
    assert!(output.status.success(), "stderr: {}", stderr(&output));

    let json: serde_json::Value = serde_json::from_str(&stdout(&output)).unwrap();
    assert_eq!(json["image"], "nginx");
    assert_eq!(json["inject_arg"], false);
    assert_eq!(json["stop_timeout"], 10);
    assert_eq!(json["ports"]["80"], 8080);
}

#[test]
fn validate_missing_image_exits_with_config_error() {
    let dir = tempfile::tempdir().unwrap();
    let config = write_config(dir.path(), "inject_arg = true\n");

    let output = berth_mock(&config, &["validate"]);
    assert_eq!(output.status.code(), Some(2));
    assert!(stderr(&output).contains("mandatory option 'image' is missing"));
}

#[test]
fn validate_unknown_option_exits_with_config_error() {
    let dir = tempfile::tempdir().unwrap();
    let config = write_config(dir.path(), "image = \"nginx\"\nimage_tag = \"1.25\"\n");

    let output = berth_mock(&config, &["validate"]);
    assert_eq!(output.status.code(), Some(2));
    assert!(stderr(&output).contains("option 'image_tag' does not exist"));
}

#[test]
fn missing_config_file_exits_with_config_error() {
    let dir = tempfile::tempdir().unwrap();
    let output = berth_mock(&dir.path().join("nope.toml"), &["run", "--", "true"]);
    assert_eq!(output.status.code(), Some(2));
}

#[test]
fn run_propagates_child_exit_code() {
    let dir = tempfile::tempdir().unwrap();
    let config = write_config(dir.path(), "image = \"alpine\"\n");

    let output = berth_mock(&config, &["run", "--", "sh", "-c", "exit 3"]);
    assert_eq!(output.status.code(), Some(3), "stderr: {}", stderr(&output));
}

#[test]
fn run_prepends_container_id_when_injecting() {
    let dir = tempfile::tempdir().unwrap();
    let config = write_config(dir.path(), "image = \"alpine\"\ninject_arg = true\n");

    let output = berth_mock(&config, &["run", "--", "echo", "hello"]);
    assert!(output.status.success(), "stderr: {}", stderr(&output));

    let out = stdout(&output);
    let words: Vec<&str> = out.split_whitespace().collect();
    assert_eq!(words.len(), 2, "{out}");
    assert_eq!(words[0].len(), 64);
    assert!(words[0].chars().all(|c| c.is_ascii_hexdigit()));
    assert_eq!(words[1], "hello");
}

#[test]
fn run_exports_container_id_without_injecting() {
    let dir = tempfile::tempdir().unwrap();
    let config = write_config(dir.path(), "image = \"alpine\"\n");

    let output = berth_mock(
        &config,
        &["run", "--", "sh", "-c", "echo \"$# $BERTH_CONTAINER_ID\""],
    );
    assert!(output.status.success(), "stderr: {}", stderr(&output));

    let out = stdout(&output);
    let (count, id) = out.trim().split_once(' ').unwrap();
    assert_eq!(count, "0");
    assert_eq!(id.len(), 64);
}

#[test]
fn run_waits_for_port() {
    let listener = TcpListener::bind("127.0.0.1:0").unwrap();
    let port = listener.local_addr().unwrap().port();
    let dir = tempfile::tempdir().unwrap();
    let config = write_config(
        dir.path(),
        &format!("image = \"nginx\"\nwait_for_port = {port}\nwait_timeout = 5\n"),
    );

    let output = berth_mock(&config, &["run", "--", "true"]);
    assert!(output.status.success(), "stderr: {}", stderr(&output));
}

#[test]
fn run_fails_when_strict_log_wait_is_not_satisfied() {
    let dir = tempfile::tempdir().unwrap();
    let config = write_config(
        dir.path(),
        "image = \"mysql\"\nwait_for_log = \"ready for connections\"\nstrict_log_wait = true\n",
    );

    let output = berth_mock(&config, &["run", "--", "true"]);
    assert_eq!(output.status.code(), Some(1));
    assert!(stderr(&output).contains("did not become ready"), "{}", stderr(&output));
}

#[test]
fn run_reports_unknown_program() {
    let dir = tempfile::tempdir().unwrap();
    let config = write_config(dir.path(), "image = \"alpine\"\n");

    let output = berth_mock(&config, &["run", "--", "/nonexistent/berth-test-program"]);
    assert_eq!(output.status.code(), Some(1));
    assert!(stderr(&output).contains("failed to run '/nonexistent/berth-test-program'"));
}

#[test]
fn unknown_provider_fails() {
    let dir = tempfile::tempdir().unwrap();
    let config = write_config(dir.path(), "image = \"alpine\"\n");

    let output = berth_bin()
        .args(["--provider", "lxc", "--config"])
        .arg(&config)
        .args(["run", "--", "true"])
        .output()
        .unwrap();
    assert_eq!(output.status.code(), Some(1));
    assert!(stderr(&output).contains("lxc"));
}

#[test]
fn doctor_json_reports_health() {
    let dir = tempfile::tempdir().unwrap();
    let config = write_config(dir.path(), "image = \"alpine\"\n");

    let output = berth_mock(&config, &["doctor", "--json"]);
    assert!(output.status.success(), "stderr: {}", stderr(&output));

    let json: serde_json::Value = serde_json::from_str(&stdout(&output)).unwrap();
    assert_eq!(json["healthy"], true);
    let checks = json["checks"].as_array().unwrap();
    assert!(checks.iter().any(|c| c["name"] == "config" && c["status"] == "pass"));
}

#[test]
fn completions_generate_for_bash() {
    let output = berth_bin().args(["completions", "bash"]).output().unwrap();
    assert!(output.status.success());
    assert!(stdout(&output).contains("berth"));
}
