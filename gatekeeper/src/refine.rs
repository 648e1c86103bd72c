//! Task-level refinement: code worker, test worker, verify, repeat.
//!
//! A snapshot brackets each task's sequence of attempts. When the attempts
//! stop making progress (same failure signature twice) or run out, the
//! workspace is rolled back to that snapshot before escalating.

use anyhow::{Result, anyhow};
use tracing::{debug, info, instrument, warn};

use crate::core::attribution::{ChangeLedger, diff_fingerprints};
use crate::core::signature::{AttemptVerdict, FailureRecord, RefinementTracker};
use crate::core::tasks::{Task, TaskList, tick_checklist};
use crate::core::types::{ArtifactKind, GateName, Locus, StatusSignal};
use crate::engine::GateSession;
use crate::error::{LoopScope, OrchestratorError};
use crate::io::dispatch::TaskBrief;
use crate::io::instructions::RefinementInstructions;
use crate::io::task_store::write_tasks;

const GATE: GateName = GateName::Implementation;

/// How a task's attempt sequence ended, before any rollback.
#[derive(Debug, Clone, PartialEq, Eq)]
enum LoopEnd {
    Passed,
    Stuck {
        iteration: u32,
        failures: Vec<FailureRecord>,
    },
    Exhausted {
        iteration: u32,
        failures: Vec<FailureRecord>,
    },
}

/// Drive one pending task to `Done`, or escalate.
///
/// Attempt counts persist in ticket state so the budget holds across
/// invocations. A task whose budget is already spent escalates without
/// dispatching or touching the workspace.
#[instrument(skip_all, fields(task = %task.id))]
pub fn refine_task(session: &mut GateSession<'_>, tasks: &mut TaskList, task: &Task) -> Result<()> {
    let key = task.id.to_string();
    let max_attempts = session.config.task_max_attempts;
    let prior = session.state.attempts_for(&key);
    if prior >= max_attempts {
        warn!(prior, max_attempts, "task budget already spent");
        return Err(OrchestratorError::LoopExhausted {
            gate: GATE,
            scope: LoopScope::Task(key),
            iteration: prior,
            failures: Vec::new(),
            rolled_back: false,
        }
        .into());
    }

    let snapshots = session.collab.snapshots;
    let snapshot = snapshots.capture(&format!("{}-{}", session.state.ticket_id, key))?;
    debug!(snapshot = %snapshot.id, "captured pre-task snapshot");

    let end = match run_attempts(session, task, prior) {
        Ok(end) => end,
        Err(err) => {
            // Worker unavailable or a hard error: keep the workspace for triage.
            snapshots.discard(&snapshot)?;
            return Err(err);
        }
    };

    let escalation = match end {
        LoopEnd::Passed => {
            snapshots.discard(&snapshot)?;
            if !tasks.mark_done(task.id) {
                return Err(anyhow!("task {} vanished from the task list", task.id));
            }
            write_tasks(&session.paths.tasks_path, tasks)?;
            session
                .store
                .edit(ArtifactKind::TaskList, |content| tick_checklist(content, task.id))?;
            info!("task done");
            return Ok(());
        }
        LoopEnd::Stuck {
            iteration,
            failures,
        } => {
            snapshots.restore(&snapshot)?;
            OrchestratorError::StuckLoop {
                gate: GATE,
                task: key,
                iteration,
                failures,
                rolled_back: true,
            }
        }
        LoopEnd::Exhausted {
            iteration,
            failures,
        } => {
            snapshots.restore(&snapshot)?;
            OrchestratorError::LoopExhausted {
                gate: GATE,
                scope: LoopScope::Task(key),
                iteration,
                failures,
                rolled_back: true,
            }
        }
    };
    snapshots.discard(&snapshot)?;
    warn!(error = %escalation, "workspace rolled back");
    Err(escalation.into())
}

fn run_attempts(session: &mut GateSession<'_>, task: &Task, prior: u32) -> Result<LoopEnd> {
    let key = task.id.to_string();
    let mut tracker = RefinementTracker::new(session.config.task_max_attempts, prior);
    let mut ledger = ChangeLedger::new();
    let mut responsible = vec![Locus::Code, Locus::Test];
    let mut failures: Vec<FailureRecord> = Vec::new();

    loop {
        let attempt = tracker.begin_attempt();
        info!(attempt, ?responsible, "refinement attempt");
        let brief = TaskBrief {
            id: key.clone(),
            description: task.description.clone(),
            acceptance: task.acceptance.clone(),
            attempt,
        };
        for locus in &responsible {
            let before = session.collab.snapshots.fingerprint()?;
            dispatch_locus(session, *locus, &brief, &failures)?;
            let after = session.collab.snapshots.fingerprint()?;
            ledger.record(*locus, diff_fingerprints(&before, &after));
        }

        let report = session.verify(&ledger)?;
        // Counted only once the attempt has been verified.
        session.state.task_attempts.insert(key.clone(), attempt);
        session.save_state()?;
        match report.ensure_passed() {
            Ok(()) => return Ok(LoopEnd::Passed),
            Err(failed) => debug!(error = %failed, "attempt failed verification"),
        }

        failures = report.failures;
        match tracker.record_failure(&failures) {
            AttemptVerdict::Retry { responsible: next } => {
                debug!(failures = failures.len(), "retrying responsible workers");
                responsible = if next.is_empty() {
                    vec![Locus::Code, Locus::Test]
                } else {
                    next
                };
            }
            AttemptVerdict::Stuck => {
                return Ok(LoopEnd::Stuck {
                    iteration: attempt,
                    failures,
                });
            }
            AttemptVerdict::Exhausted => {
                return Ok(LoopEnd::Exhausted {
                    iteration: attempt,
                    failures,
                });
            }
        }
    }
}

fn dispatch_locus(
    session: &mut GateSession<'_>,
    locus: Locus,
    brief: &TaskBrief,
    failures: &[FailureRecord],
) -> Result<()> {
    let inputs = session.refinement_inputs()?;
    let instructions = session.renderer().render_refinement(
        locus,
        &RefinementInstructions {
            ticket: &session.state.ticket_id,
            task: brief,
            inputs: &inputs,
            failures,
        },
    )?;
    let result = session.dispatch_worker(
        GATE,
        locus.role(),
        Some(brief.clone()),
        None,
        inputs,
        instructions,
    )?;
    if result.status_signal == StatusSignal::Blocked {
        return Err(OrchestratorError::GateBlocked {
            gate: GATE,
            reason: format!(
                "{} worker blocked on task {}: {}",
                locus.role(),
                brief.id,
                result.diagnostics.trim()
            ),
        }
        .into());
    }
    debug!(%locus, signal = %result.status_signal, "worker finished");
    Ok(())
}
