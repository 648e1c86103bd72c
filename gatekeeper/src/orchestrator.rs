//! Ticket lifecycle: load state, walk the gates, settle the outcome.

use std::path::Path;

use anyhow::{Context, Result};
use tracing::{info, instrument, warn};

use crate::core::signature::FailureRecord;
use crate::core::tasks::TaskList;
use crate::core::types::{ArtifactKind, ArtifactStatus, GateName, TicketId};
use crate::engine::{Collaborators, GateSession, GateVisit};
use crate::error::{LoopScope, OrchestratorError};
use crate::io::artifact_store::ArtifactStore;
use crate::io::config::GatekeeperConfig;
use crate::io::paths::{WorkspacePaths, create_dir, ensure_state_dir};
use crate::io::task_store::load_tasks;
use crate::io::ticket_state::{TicketState, TicketStatus, load_or_create, load_ticket_state, write_ticket_state};

/// Per-invocation options from the CLI.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RunOptions {
    /// Gates before this one are not evaluated in this invocation.
    pub from: Option<GateName>,
    /// Clear task attempt and review cycle counters before running.
    pub reset_loops: bool,
}

/// Why a ticket needs a human.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Escalation {
    pub gate: Option<GateName>,
    /// Machine-friendly error kind, e.g. `stuck_loop`.
    pub kind: &'static str,
    pub task: Option<String>,
    pub iteration: Option<u32>,
    pub failures: Vec<FailureRecord>,
    pub rolled_back: bool,
    pub reason: String,
}

impl From<&OrchestratorError> for Escalation {
    fn from(err: &OrchestratorError) -> Self {
        let mut escalation = Escalation {
            gate: err.gate(),
            kind: err.kind(),
            task: None,
            iteration: None,
            failures: Vec::new(),
            rolled_back: false,
            reason: err.to_string(),
        };
        match err {
            OrchestratorError::StuckLoop {
                task,
                iteration,
                failures,
                rolled_back,
                ..
            } => {
                escalation.task = Some(task.clone());
                escalation.iteration = Some(*iteration);
                escalation.failures = failures.clone();
                escalation.rolled_back = *rolled_back;
            }
            OrchestratorError::LoopExhausted {
                scope,
                iteration,
                failures,
                rolled_back,
                ..
            } => {
                if let LoopScope::Task(task) = scope {
                    escalation.task = Some(task.clone());
                }
                escalation.iteration = Some(*iteration);
                escalation.failures = failures.clone();
                escalation.rolled_back = *rolled_back;
            }
            OrchestratorError::VerificationFailed { failures } => {
                escalation.failures = failures.clone();
            }
            OrchestratorError::WorkerUnavailable { .. } | OrchestratorError::GateBlocked { .. } => {}
        }
        escalation
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TicketStop {
    /// Every gate is satisfied.
    Complete,
    /// Halted awaiting manual intervention.
    Escalated(Escalation),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TicketOutcome {
    pub ticket_id: TicketId,
    pub stop: TicketStop,
    /// Gates visited in this invocation, in order.
    pub trace: Vec<GateVisit>,
}

/// Run a ticket until it completes or escalates.
///
/// Orchestration failures become [`TicketStop::Escalated`]; anything else
/// (unreadable state, I/O errors) is returned as an error.
#[instrument(skip_all, fields(ticket = %ticket))]
pub fn run_ticket(
    root: &Path,
    ticket: &TicketId,
    config: &GatekeeperConfig,
    options: &RunOptions,
    collab: Collaborators<'_>,
) -> Result<TicketOutcome> {
    let workspace = WorkspacePaths::new(root);
    ensure_state_dir(&workspace)?;
    let paths = workspace.ticket(ticket);
    create_dir(&paths.artifacts_dir)?;
    create_dir(&paths.journal_dir)?;

    let mut state = load_or_create(&paths.state_path, ticket)
        .with_context(|| format!("load state for ticket {ticket}"))?;
    if state.archived {
        info!("ticket already archived");
        return Ok(TicketOutcome {
            ticket_id: ticket.clone(),
            stop: TicketStop::Complete,
            trace: Vec::new(),
        });
    }
    if options.reset_loops {
        info!("resetting loop counters");
        state.reset_loops();
    }
    state.status = TicketStatus::Active;
    state.last_escalation = None;
    write_ticket_state(&paths.state_path, &state)?;

    let mut session = GateSession::new(root, config, collab, paths.clone(), state)?;
    let walked = session.run_gates(options.from.unwrap_or(GateName::Requirements));
    let (mut state, trace) = session.into_parts();

    let stop = match walked {
        Ok(()) => {
            state.archived = true;
            state.status = TicketStatus::Complete;
            state.review_cycles = 0;
            info!("ticket complete");
            TicketStop::Complete
        }
        Err(err) => match err.downcast::<OrchestratorError>() {
            Ok(orch) => {
                warn!(kind = orch.kind(), error = %orch, "ticket escalated");
                state.status = TicketStatus::Blocked;
                state.last_escalation = Some(orch.to_string());
                TicketStop::Escalated(Escalation::from(&orch))
            }
            Err(err) => {
                state.status = TicketStatus::Blocked;
                write_ticket_state(&paths.state_path, &state)?;
                return Err(err);
            }
        },
    };
    write_ticket_state(&paths.state_path, &state)?;
    Ok(TicketOutcome {
        ticket_id: ticket.clone(),
        stop,
        trace,
    })
}

/// Snapshot of a ticket for `gatekeeper status`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TicketSummary {
    pub state: TicketState,
    /// Every artifact kind with its status, `None` when missing.
    pub artifacts: Vec<(ArtifactKind, Option<ArtifactStatus>)>,
    pub tasks: TaskList,
}

pub fn ticket_summary(root: &Path, ticket: &TicketId) -> Result<TicketSummary> {
    let paths = WorkspacePaths::new(root).ticket(ticket);
    if !paths.state_path.exists() {
        anyhow::bail!("ticket {ticket} has not been run yet");
    }
    let state = load_ticket_state(&paths.state_path)?;
    let store = ArtifactStore::new(paths.clone());
    let mut artifacts = Vec::with_capacity(ArtifactKind::ALL.len());
    for kind in ArtifactKind::ALL {
        artifacts.push((kind, store.status(kind)?));
    }
    let tasks = load_tasks(&paths.tasks_path)?;
    Ok(TicketSummary {
        state,
        artifacts,
        tasks,
    })
}
