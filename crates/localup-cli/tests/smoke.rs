//! Smoke tests for the `localup` binary.
//!
//! Runs the binary against temp dirs; nothing here needs a database or the
//! real service binaries.

use std::path::Path;
use std::process::Command;

fn localup() -> Command {
    let mut cmd = Command::new(env!("CARGO_BIN_EXE_localup"));
    // Keep a developer's own localup.toml out of the picture
    cmd.current_dir(std::env::temp_dir()).env("HOME", std::env::temp_dir());
    cmd
}

fn write_stack(dir: &Path) -> std::path::PathBuf {
    let path = dir.join("stack.yaml");
    std::fs::write(
        &path,
        r#"
services:
  - name: redis
    image: redis:7
    command: [redis-server]
    flags:
      - --port=${port:public}
  - name: versioncontrol
    image: img.dev.storj.io/storjup/storj:latest
    command: [versioncontrol, run]
    flags:
      - --binary.satellite.rollout.seed=0
  - name: versioncontrol
    image: img.dev.storj.io/storjup/storj:latest
    command: [versioncontrol, run]
"#,
    )
    .unwrap();
    path
}

// ── Help / basic CLI ──────────────────────────────────────────────────────────

#[test]
fn binary_responds_to_help() {
    let output = localup().arg("--help").output().expect("failed to execute localup");
    assert!(output.status.success(), "localup --help should exit 0");
    let stdout = String::from_utf8_lossy(&output.stdout);
    for subcommand in ["standalone", "compose", "list", "health"] {
        assert!(stdout.contains(subcommand), "help should list {subcommand}");
    }
}

#[test]
fn health_help_documents_short_flags() {
    let output = localup()
        .args(["health", "--help"])
        .output()
        .expect("failed to execute localup health --help");
    assert!(output.status.success());
    let stdout = String::from_utf8_lossy(&output.stdout);
    assert!(stdout.contains("-t"));
    assert!(stdout.contains("-n"));
    assert!(stdout.contains("-d"));
}

#[test]
fn unknown_subcommand_exits_nonzero() {
    let output = localup()
        .arg("nonexistent-subcommand")
        .output()
        .expect("failed to execute localup");
    assert!(!output.status.success());
}

// ── Standalone ────────────────────────────────────────────────────────────────

#[test]
fn standalone_writes_launchers_and_prints_services() {
    let tmp = tempfile::tempdir().unwrap();
    let stack = write_stack(tmp.path());
    let dir = tmp.path().join("cluster");

    let output = localup()
        .arg("standalone")
        .arg("--stack")
        .arg(&stack)
        .arg("--dir")
        .arg(&dir)
        .output()
        .expect("failed to execute localup standalone");
    assert!(
        output.status.success(),
        "standalone failed\nstderr: {}",
        String::from_utf8_lossy(&output.stderr)
    );

    let services: serde_json::Value = serde_json::from_slice(&output.stdout).unwrap();
    let services = services.as_array().unwrap();
    assert_eq!(services.len(), 3);
    assert_eq!(services[2]["id"]["name"], "versioncontrol");
    assert_eq!(services[2]["id"]["instance"], 1);

    let launcher = std::fs::read_to_string(dir.join("redis/0/run.sh")).unwrap();
    assert!(launcher.contains("exec 'redis-server' '--port=6379'"));
    assert!(dir.join("versioncontrol/1/run.sh").exists());
}

#[test]
fn standalone_fails_on_missing_stack() {
    let tmp = tempfile::tempdir().unwrap();
    let output = localup()
        .arg("standalone")
        .arg("--stack")
        .arg(tmp.path().join("missing.yaml"))
        .arg("--dir")
        .arg(tmp.path())
        .output()
        .expect("failed to execute localup standalone");
    assert!(!output.status.success());
    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(stderr.contains("missing.yaml"), "error should name the stack: {stderr}");
}

// ── Compose / list ────────────────────────────────────────────────────────────

#[test]
fn compose_then_list() {
    let tmp = tempfile::tempdir().unwrap();
    let stack = write_stack(tmp.path());
    let compose = tmp.path().join("docker-compose.yaml");

    let output = localup()
        .arg("compose")
        .arg("--stack")
        .arg(&stack)
        .arg("--output")
        .arg(&compose)
        .output()
        .expect("failed to execute localup compose");
    assert!(
        output.status.success(),
        "compose failed\nstderr: {}",
        String::from_utf8_lossy(&output.stderr)
    );
    let yaml = std::fs::read_to_string(&compose).unwrap();
    assert!(yaml.contains("6379:6379"));
    assert!(yaml.contains("versioncontrol2"));

    let output = localup()
        .arg("list")
        .arg("--file")
        .arg(&compose)
        .output()
        .expect("failed to execute localup list");
    assert!(output.status.success());
    let stdout = String::from_utf8_lossy(&output.stdout);
    assert!(stdout.contains("redis redis:7"));
    assert!(stdout.contains("versioncontrol img.dev.storj.io/storjup/storj:latest"));
    assert!(stdout.contains("versioncontrol2 "));
}

#[test]
fn list_reads_existing_compose_file() {
    let tmp = tempfile::tempdir().unwrap();
    let compose = tmp.path().join("docker-compose.yaml");
    std::fs::write(
        &compose,
        "services:\n  cockroach:\n    image: cockroachdb/cockroach\n  redis: {}\n",
    )
    .unwrap();

    let output = localup()
        .arg("list")
        .arg("-f")
        .arg(&compose)
        .output()
        .expect("failed to execute localup list");
    assert!(output.status.success());
    assert_eq!(
        String::from_utf8_lossy(&output.stdout),
        "cockroach cockroachdb/cockroach\nredis -\n"
    );
}

// ── Health ────────────────────────────────────────────────────────────────────

#[test]
fn health_rejects_invalid_table() {
    let output = localup()
        .args(["health", "-t", "nodes; drop table nodes", "-n", "1", "-d", "5"])
        .output()
        .expect("failed to execute localup health");
    assert!(!output.status.success());
    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(stderr.contains("invalid table"), "stderr: {stderr}");
}
