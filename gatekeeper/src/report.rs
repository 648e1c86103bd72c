//! User-visible rendering of run outcomes and ticket status.

use std::fmt::Write as _;

use crate::core::tasks::TaskStatus;
use crate::engine::{GateAction, GateVisit};
use crate::orchestrator::{Escalation, TicketOutcome, TicketStop, TicketSummary};

pub fn render_outcome(outcome: &TicketOutcome) -> String {
    let mut buf = String::new();
    match &outcome.stop {
        TicketStop::Complete => {
            let _ = writeln!(buf, "ticket {}: complete", outcome.ticket_id);
        }
        TicketStop::Escalated(escalation) => {
            let _ = writeln!(
                buf,
                "ticket {}: blocked, manual intervention required",
                outcome.ticket_id
            );
            render_escalation(&mut buf, escalation);
        }
    }
    if !outcome.trace.is_empty() {
        let _ = writeln!(buf, "gates: {}", render_trace(&outcome.trace));
    }
    buf
}

fn render_escalation(buf: &mut String, escalation: &Escalation) {
    if let Some(gate) = escalation.gate {
        let _ = writeln!(buf, "  gate: {gate}");
    }
    let _ = writeln!(buf, "  kind: {}", escalation.kind);
    if let Some(task) = &escalation.task {
        match escalation.iteration {
            Some(iteration) => {
                let _ = writeln!(buf, "  task: {task} (attempt {iteration})");
            }
            None => {
                let _ = writeln!(buf, "  task: {task}");
            }
        }
    } else if let Some(iteration) = escalation.iteration {
        let _ = writeln!(buf, "  cycles: {iteration}");
    }
    let _ = writeln!(buf, "  reason: {}", escalation.reason);
    if !escalation.failures.is_empty() {
        let _ = writeln!(buf, "  failures:");
        for failure in &escalation.failures {
            let _ = writeln!(
                buf,
                "    [{}/{}] {}",
                failure.category, failure.locus, failure.message
            );
        }
    }
    let rollback = if escalation.rolled_back {
        "workspace restored to the pre-task snapshot"
    } else {
        "none"
    };
    let _ = writeln!(buf, "  rollback: {rollback}");
}

fn render_trace(trace: &[GateVisit]) -> String {
    trace
        .iter()
        .map(|visit| match visit.action {
            GateAction::Skipped => format!("{} (skipped)", visit.gate),
            GateAction::Executed => visit.gate.to_string(),
            GateAction::Reopened => format!("{} (reopened implementation)", visit.gate),
        })
        .collect::<Vec<_>>()
        .join(" -> ")
}

pub fn render_summary(summary: &TicketSummary) -> String {
    let state = &summary.state;
    let mut buf = String::new();
    let _ = writeln!(buf, "ticket: {}", state.ticket_id);
    let _ = writeln!(
        buf,
        "status: {:?}{}",
        state.status,
        if state.archived { " (archived)" } else { "" }
    );
    let _ = writeln!(buf, "current gate: {}", state.current_gate);
    let _ = writeln!(buf, "artifacts:");
    for (kind, status) in &summary.artifacts {
        let status = status.map_or("missing", |status| status.as_str());
        let _ = writeln!(buf, "  {:<16} {status}", kind.as_str());
    }
    let total = summary.tasks.tasks.len();
    let _ = writeln!(buf, "tasks: {}/{} done", summary.tasks.done_count(), total);
    for task in &summary.tasks.tasks {
        let mark = if task.status == TaskStatus::Done { 'x' } else { ' ' };
        let attempts = state.attempts_for(&task.id.to_string());
        let _ = writeln!(
            buf,
            "  [{mark}] {} {} (attempts: {attempts})",
            task.id, task.description
        );
    }
    let _ = writeln!(buf, "review cycles: {}", state.review_cycles);
    if let Some(escalation) = &state.last_escalation {
        let _ = writeln!(buf, "last escalation: {escalation}");
    }
    buf
}
