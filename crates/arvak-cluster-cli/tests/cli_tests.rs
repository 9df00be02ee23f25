//! End-to-end tests running the `arvak-cluster` binary.

use std::path::Path;
use std::process::{Command, Output};

fn run(args: &[&str]) -> Output {
    Command::new(env!("CARGO_BIN_EXE_arvak-cluster"))
        .args(args)
        .env_remove("ARVAK_CLUSTERS")
        .env("NO_COLOR", "1")
        .output()
        .unwrap()
}

fn stdout(output: &Output) -> String {
    String::from_utf8_lossy(&output.stdout).into_owned()
}

fn stderr(output: &Output) -> String {
    String::from_utf8_lossy(&output.stderr).into_owned()
}

fn write_clusters(dir: &Path) {
    std::fs::write(
        dir.join("owens.yml"),
        "metadata:\n  title: Owens\nlogin:\n  host: owens.example.edu\njob:\n  adapter: lsf\n  bindir: /nonexistent/lsf/bin\n",
    )
    .unwrap();
    std::fs::write(
        dir.join("pitzer.yml"),
        "metadata:\n  title: Pitzer\nlogin:\n  host: pitzer.example.edu\n",
    )
    .unwrap();
}

#[test]
fn test_adapters_lists_builtins() {
    let output = run(&["adapters"]);
    assert!(output.status.success());

    let out = stdout(&output);
    assert!(out.contains("acl"));
    assert!(out.contains("job"));
    assert!(out.contains("lsf"));
    assert!(out.contains("torque"));
}

#[test]
fn test_clusters_lists_configured_clusters() {
    let dir = tempfile::tempdir().unwrap();
    write_clusters(dir.path());

    let output = run(&["clusters", "--config", dir.path().to_str().unwrap()]);
    assert!(output.status.success(), "{}", stderr(&output));

    let out = stdout(&output);
    assert!(out.contains("2 cluster(s)"));
    assert!(out.contains("Owens"));
    assert!(out.contains("pitzer.example.edu"));
}

#[test]
fn test_missing_config_fails() {
    let dir = tempfile::tempdir().unwrap();
    let missing = dir.path().join("absent");

    let output = run(&["clusters", "--config", missing.to_str().unwrap()]);
    assert!(!output.status.success());
    assert!(stderr(&output).contains("not found"));
}

#[test]
fn test_job_commands_require_job_feature() {
    let dir = tempfile::tempdir().unwrap();
    write_clusters(dir.path());

    let output = run(&["info", "pitzer", "--config", dir.path().to_str().unwrap()]);
    assert!(!output.status.success());
    assert!(stderr(&output).contains("not allowed"));
}

#[test]
fn test_scheduler_failure_is_reported() {
    let dir = tempfile::tempdir().unwrap();
    write_clusters(dir.path());

    let output = run(&["delete", "owens", "42", "--config", dir.path().to_str().unwrap()]);
    assert!(!output.status.success());
    assert!(stderr(&output).contains("bkill"));
}
