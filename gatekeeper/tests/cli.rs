//! CLI tests for the `gatekeeper` binary.
//!
//! Spawns the binary and checks exit codes and printed status.

use std::process::{Command, Output};

use gatekeeper::exit_codes;
use gatekeeper::io::paths::{WorkspacePaths, init_workspace};

fn gatekeeper(root: &std::path::Path, args: &[&str]) -> Output {
    Command::new(env!("CARGO_BIN_EXE_gatekeeper"))
        .current_dir(root)
        .args(args)
        .output()
        .expect("spawn gatekeeper")
}

#[test]
fn malformed_ticket_id_has_its_own_exit_code() {
    let temp = tempfile::tempdir().expect("tempdir");

    let run = gatekeeper(temp.path(), &["run", "bad_id", "--yes"]);
    assert_eq!(run.status.code(), Some(exit_codes::MALFORMED_TICKET));
    assert!(String::from_utf8_lossy(&run.stderr).contains("bad_id"));

    let status = gatekeeper(temp.path(), &["status", "bad_id"]);
    assert_eq!(status.status.code(), Some(exit_codes::MALFORMED_TICKET));
}

#[test]
fn init_refuses_to_overwrite_without_force() {
    let temp = tempfile::tempdir().expect("tempdir");

    let first = gatekeeper(temp.path(), &["init"]);
    assert_eq!(first.status.code(), Some(exit_codes::OK));
    assert!(WorkspacePaths::new(temp.path()).config_path.is_file());

    let second = gatekeeper(temp.path(), &["init"]);
    assert_eq!(second.status.code(), Some(exit_codes::BLOCKED));
    assert!(String::from_utf8_lossy(&second.stderr).contains("--force"));

    let forced = gatekeeper(temp.path(), &["init", "--force"]);
    assert_eq!(forced.status.code(), Some(exit_codes::OK));
}

/// With no worker commands configured the first gate cannot dispatch.
#[test]
fn missing_worker_escalates_and_status_reports_it() {
    let temp = tempfile::tempdir().expect("tempdir");
    init_workspace(temp.path(), false).expect("init");

    let run = gatekeeper(temp.path(), &["run", "PROJ-1", "--yes"]);
    assert_eq!(run.status.code(), Some(exit_codes::BLOCKED));
    let stdout = String::from_utf8_lossy(&run.stdout);
    assert!(stdout.contains("ticket PROJ-1: blocked"), "stdout: {stdout}");
    assert!(stdout.contains("kind: worker_unavailable"), "stdout: {stdout}");

    let status = gatekeeper(temp.path(), &["status", "PROJ-1"]);
    assert_eq!(status.status.code(), Some(exit_codes::OK));
    let stdout = String::from_utf8_lossy(&status.stdout);
    assert!(stdout.contains("current gate: requirements"), "stdout: {stdout}");
    assert!(stdout.contains("requirements     missing"), "stdout: {stdout}");
    assert!(stdout.contains("last escalation: worker 'requirements' unavailable"));
}

#[test]
fn status_of_unknown_ticket_fails() {
    let temp = tempfile::tempdir().expect("tempdir");
    init_workspace(temp.path(), false).expect("init");

    let status = gatekeeper(temp.path(), &["status", "PROJ-9"]);
    assert_eq!(status.status.code(), Some(exit_codes::BLOCKED));
    assert!(String::from_utf8_lossy(&status.stderr).contains("has not been run yet"));
}

/// One shell script plays every worker role.
#[cfg(unix)]
#[test]
fn shell_workers_drive_a_ticket_to_completion() {
    use gatekeeper::core::types::CheckCategory;
    use gatekeeper::io::config::{CheckCommand, WorkerConfig, load_config, write_config};

    const WORKER: &str = r#"cat > /dev/null
artifacts=".gatekeeper/tickets/$GATEKEEPER_TICKET/artifacts"
mark() { printf '# %s\n\nstatus: %s\n' "$1" "$2" > "$artifacts/$1.md"; }
tasks=''
case "$GATEKEEPER_WORKER" in
  requirements) mark requirements approved ;;
  research) mark research_notes complete ;;
  planner) mark plan approved ;;
  task_breakdown) tasks=',"tasks":[{"description":"greet the user","acceptance":["prints hello"]}]' ;;
  code) mkdir -p src && echo hello > src/greet.txt ;;
  test) mkdir -p tests && echo check > tests/greet.txt ;;
  qa) mark qa_report complete ;;
  docs) mark summary ready ;;
  validator) mark summary complete ;;
esac
printf '{"produced_artifacts":[],"status_signal":"ready","diagnostics":"ok"%s}' "$tasks" > "$GATEKEEPER_RESULT_PATH"
"#;

    let temp = tempfile::tempdir().expect("tempdir");
    let paths = init_workspace(temp.path(), false).expect("init");
    let mut config = load_config(&paths.config_path).expect("config");
    for role in [
        "requirements",
        "research",
        "planner",
        "task_breakdown",
        "code",
        "test",
        "reviewer",
        "qa",
        "docs",
        "validator",
    ] {
        config.workers.insert(
            role.to_string(),
            WorkerConfig {
                command: vec!["sh".to_string(), "-c".to_string(), WORKER.to_string()],
            },
        );
    }
    config.verification.commands = vec![CheckCommand::new(CheckCategory::Test, &["true"])];
    write_config(&paths.config_path, &config).expect("write config");

    let run = gatekeeper(temp.path(), &["run", "PROJ-1", "--yes"]);
    let stdout = String::from_utf8_lossy(&run.stdout);
    assert_eq!(
        run.status.code(),
        Some(exit_codes::OK),
        "stdout: {stdout}\nstderr: {}",
        String::from_utf8_lossy(&run.stderr)
    );
    assert!(stdout.contains("ticket PROJ-1: complete"));
    assert!(temp.path().join("src/greet.txt").is_file());

    let status = gatekeeper(temp.path(), &["status", "PROJ-1"]);
    let stdout = String::from_utf8_lossy(&status.stdout);
    assert!(stdout.contains("(archived)"), "stdout: {stdout}");
    assert!(stdout.contains("tasks: 1/1 done"), "stdout: {stdout}");
}
