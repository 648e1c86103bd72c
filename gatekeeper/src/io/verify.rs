//! Verification runner: ordered format/lint/test commands with categorized failures.

use std::fmt::Write as _;
use std::path::Path;
use std::time::Duration;

use anyhow::{Result, anyhow};
use tracing::{debug, info, instrument, warn};

use crate::core::attribution::{ChangeLedger, FailedCheck, PathClassifier, attribute};
use crate::core::signature::FailureRecord;
use crate::core::types::CheckCategory;
use crate::error::OrchestratorError;
use crate::io::config::CheckCommand;
use crate::io::process::{command_from_argv, run_command_with_timeout};

/// Exit code recorded when a verification command cannot be spawned.
pub const SPAWN_FAILURE_EXIT: i32 = 127;

const TAIL_LINES: usize = 20;

/// Result of one verification command.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CheckOutcome {
    pub category: CheckCategory,
    pub command: String,
    pub passed: bool,
    pub exit_code: Option<i32>,
    pub timed_out: bool,
    pub log: String,
    pub tail: String,
}

impl CheckOutcome {
    pub fn pass(check: &CheckCommand) -> Self {
        Self {
            category: check.category,
            command: check.display(),
            passed: true,
            exit_code: Some(0),
            timed_out: false,
            log: String::new(),
            tail: String::new(),
        }
    }

    pub fn fail(check: &CheckCommand, exit_code: i32, tail: impl Into<String>) -> Self {
        let tail = tail.into();
        Self {
            category: check.category,
            command: check.display(),
            passed: false,
            exit_code: Some(exit_code),
            timed_out: false,
            log: tail.clone(),
            tail,
        }
    }
}

/// Runs verification commands. Every command runs even after a failure.
pub trait CheckRunner {
    fn run_checks(&self, commands: &[CheckCommand], workdir: &Path) -> Result<Vec<CheckOutcome>>;
}

/// Runner that spawns each configured command in the workspace.
pub struct CommandCheckRunner {
    pub timeout: Duration,
    pub output_limit_bytes: usize,
}

impl CheckRunner for CommandCheckRunner {
    #[instrument(skip_all, fields(commands = commands.len()))]
    fn run_checks(&self, commands: &[CheckCommand], workdir: &Path) -> Result<Vec<CheckOutcome>> {
        let mut outcomes = Vec::with_capacity(commands.len());
        for check in commands {
            info!(category = %check.category, command = %check.display(), "running check");
            let spawned = command_from_argv(&check.command).and_then(|mut cmd| {
                cmd.current_dir(workdir);
                run_command_with_timeout(cmd, None, self.timeout, self.output_limit_bytes)
            });
            let outcome = match spawned {
                Ok(output) => CheckOutcome {
                    category: check.category,
                    command: check.display(),
                    passed: output.success(),
                    exit_code: output.status.code(),
                    timed_out: output.timed_out,
                    log: output.render_log(check.category.as_str()),
                    tail: output.tail(TAIL_LINES),
                },
                Err(err) => {
                    warn!(err = %err, "check could not be spawned");
                    CheckOutcome::fail(check, SPAWN_FAILURE_EXIT, format!("{err:#}"))
                }
            };
            debug!(passed = outcome.passed, exit_code = ?outcome.exit_code, "check finished");
            outcomes.push(outcome);
        }
        Ok(outcomes)
    }
}

/// Categorized verification result.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VerificationReport {
    pub passed: bool,
    pub outcomes: Vec<CheckOutcome>,
    pub failures: Vec<FailureRecord>,
}

impl VerificationReport {
    pub fn ensure_passed(&self) -> Result<(), OrchestratorError> {
        if self.passed {
            Ok(())
        } else {
            Err(OrchestratorError::VerificationFailed {
                failures: self.failures.clone(),
            })
        }
    }

    /// Log text for the dispatch journal.
    pub fn render_log(&self) -> String {
        let mut buf = String::new();
        for outcome in &self.outcomes {
            let verdict = if outcome.passed { "pass" } else { "FAIL" };
            let _ = writeln!(
                buf,
                "### [{}] {} -> {} (exit {:?}{})",
                outcome.category,
                outcome.command,
                verdict,
                outcome.exit_code,
                if outcome.timed_out { ", timed out" } else { "" }
            );
            buf.push_str(&outcome.log);
            if !outcome.log.ends_with('\n') {
                buf.push('\n');
            }
        }
        buf
    }
}

/// Run the command sequence and attribute failures using the change ledger.
#[instrument(skip_all)]
pub fn run_verification(
    runner: &dyn CheckRunner,
    commands: &[CheckCommand],
    workdir: &Path,
    ledger: &ChangeLedger,
    classifier: &PathClassifier,
) -> Result<VerificationReport> {
    let outcomes = runner.run_checks(commands, workdir)?;
    if outcomes.len() != commands.len() {
        return Err(anyhow!(
            "verification returned {} outcomes for {} commands",
            outcomes.len(),
            commands.len()
        ));
    }

    let mut failures = Vec::new();
    for outcome in outcomes.iter().filter(|outcome| !outcome.passed) {
        let failed = FailedCheck {
            category: outcome.category,
            command: outcome.command.clone(),
            exit_code: outcome.exit_code,
            timed_out: outcome.timed_out,
            output_tail: outcome.tail.clone(),
        };
        failures.extend(attribute(&failed, ledger, classifier));
    }
    let passed = outcomes.iter().all(|outcome| outcome.passed);
    info!(passed, failures = failures.len(), "verification finished");
    Ok(VerificationReport {
        passed,
        outcomes,
        failures,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::types::Locus;
    use crate::io::config::VerificationConfig;

    struct FixedRunner {
        failing: Vec<CheckCategory>,
    }

    impl CheckRunner for FixedRunner {
        fn run_checks(
            &self,
            commands: &[CheckCommand],
            _workdir: &Path,
        ) -> Result<Vec<CheckOutcome>> {
            Ok(commands
                .iter()
                .map(|check| {
                    if self.failing.contains(&check.category) {
                        CheckOutcome::fail(check, 1, "boom")
                    } else {
                        CheckOutcome::pass(check)
                    }
                })
                .collect())
        }
    }

    fn classifier() -> PathClassifier {
        VerificationConfig::default().classifier().expect("classifier")
    }

    #[test]
    fn all_passing_is_passed() {
        let commands = VerificationConfig::default().command_sequence();
        let report = run_verification(
            &FixedRunner { failing: vec![] },
            &commands,
            Path::new("."),
            &ChangeLedger::new(),
            &classifier(),
        )
        .expect("verify");
        assert!(report.passed);
        assert!(report.failures.is_empty());
        assert!(report.ensure_passed().is_ok());
    }

    #[test]
    fn failures_are_categorized_and_attributed() {
        let commands = VerificationConfig::default().command_sequence();
        let mut ledger = ChangeLedger::new();
        ledger.record(Locus::Code, ["src/lib.rs"]);
        ledger.record(Locus::Test, ["tests/parse.rs"]);

        let report = run_verification(
            &FixedRunner {
                failing: vec![CheckCategory::Format, CheckCategory::Test],
            },
            &commands,
            Path::new("."),
            &ledger,
            &classifier(),
        )
        .expect("verify");

        assert!(!report.passed);
        let triples: Vec<(CheckCategory, Locus)> = report
            .failures
            .iter()
            .map(|f| (f.category, f.locus))
            .collect();
        assert_eq!(
            triples,
            vec![
                (CheckCategory::Format, Locus::Test),
                (CheckCategory::Test, Locus::Code),
                (CheckCategory::Test, Locus::Test),
            ]
        );
        assert!(matches!(
            report.ensure_passed(),
            Err(OrchestratorError::VerificationFailed { failures }) if failures.len() == 3
        ));
        assert!(report.render_log().contains("[format] cargo fmt --check -> FAIL"));
    }

    /// A failing command does not stop the rest of the sequence.
    #[cfg(unix)]
    #[test]
    fn command_runner_runs_every_command() {
        let temp = tempfile::tempdir().expect("tempdir");
        let commands = vec![
            CheckCommand::new(CheckCategory::Format, &["sh", "-c", "exit 1"]),
            CheckCommand::new(CheckCategory::Lint, &["/no/such/linter"]),
            CheckCommand::new(CheckCategory::Test, &["sh", "-c", "touch ran"]),
        ];
        let runner = CommandCheckRunner {
            timeout: Duration::from_secs(10),
            output_limit_bytes: 10_000,
        };
        let outcomes = runner.run_checks(&commands, temp.path()).expect("run");

        let passed: Vec<bool> = outcomes.iter().map(|o| o.passed).collect();
        assert_eq!(passed, vec![false, false, true]);
        assert_eq!(outcomes[1].exit_code, Some(SPAWN_FAILURE_EXIT));
        assert!(temp.path().join("ran").is_file());
    }
}
