//! Orchestration failure taxonomy.
//!
//! These errors travel inside `anyhow::Error` through the gate engine; the
//! orchestrator downcasts them to decide between escalation and a hard error.

use std::fmt;

use crate::core::signature::FailureRecord;
use crate::core::types::{GateName, WorkerRole};

/// What a bounded loop was counting.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LoopScope {
    /// Per-task code/test refinement.
    Task(String),
    /// Review → implementation cycles.
    Review,
}

impl fmt::Display for LoopScope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LoopScope::Task(task) => write!(f, "task {task} refinement"),
            LoopScope::Review => f.write_str("review loop"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum OrchestratorError {
    /// Worker could not be reached or returned a malformed result.
    #[error("worker '{worker}' unavailable at {gate} gate: {reason}")]
    WorkerUnavailable {
        gate: GateName,
        worker: WorkerRole,
        reason: String,
    },

    /// Verification reported failures. Recoverable inside the refinement loop.
    #[error("verification failed with {} failure(s)", .failures.len())]
    VerificationFailed { failures: Vec<FailureRecord> },

    /// Two consecutive attempts failed with the same signature.
    #[error("task {task} stuck at {gate} gate on attempt {iteration}: failures repeated unchanged")]
    StuckLoop {
        gate: GateName,
        task: String,
        iteration: u32,
        failures: Vec<FailureRecord>,
        rolled_back: bool,
    },

    /// Attempt or cycle budget reached.
    #[error("{scope} exhausted at {gate} gate after {iteration} attempt(s)")]
    LoopExhausted {
        gate: GateName,
        scope: LoopScope,
        iteration: u32,
        failures: Vec<FailureRecord>,
        rolled_back: bool,
    },

    /// Gate postcondition cannot be satisfied without a human.
    #[error("{gate} gate blocked: {reason}")]
    GateBlocked { gate: GateName, reason: String },
}

impl OrchestratorError {
    pub fn gate(&self) -> Option<GateName> {
        match self {
            OrchestratorError::WorkerUnavailable { gate, .. }
            | OrchestratorError::StuckLoop { gate, .. }
            | OrchestratorError::LoopExhausted { gate, .. }
            | OrchestratorError::GateBlocked { gate, .. } => Some(*gate),
            OrchestratorError::VerificationFailed { .. } => None,
        }
    }

    /// Short machine-friendly kind label.
    pub fn kind(&self) -> &'static str {
        match self {
            OrchestratorError::WorkerUnavailable { .. } => "worker_unavailable",
            OrchestratorError::VerificationFailed { .. } => "verification_failed",
            OrchestratorError::StuckLoop { .. } => "stuck_loop",
            OrchestratorError::LoopExhausted { .. } => "loop_exhausted",
            OrchestratorError::GateBlocked { .. } => "gate_blocked",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn messages_name_gate_and_scope() {
        let err = OrchestratorError::LoopExhausted {
            gate: GateName::Review,
            scope: LoopScope::Review,
            iteration: 3,
            failures: Vec::new(),
            rolled_back: false,
        };
        assert_eq!(
            err.to_string(),
            "review loop exhausted at review gate after 3 attempt(s)"
        );
        assert_eq!(err.kind(), "loop_exhausted");

        let err = OrchestratorError::LoopExhausted {
            gate: GateName::Implementation,
            scope: LoopScope::Task("T2".to_string()),
            iteration: 3,
            failures: Vec::new(),
            rolled_back: true,
        };
        assert_eq!(
            err.to_string(),
            "task T2 refinement exhausted at implementation gate after 3 attempt(s)"
        );
    }

    #[test]
    fn downcasts_through_anyhow() {
        let err: anyhow::Error = OrchestratorError::GateBlocked {
            gate: GateName::Plan,
            reason: "planner blocked".to_string(),
        }
        .into();
        let inner = err.downcast_ref::<OrchestratorError>().expect("downcast");
        assert_eq!(inner.gate(), Some(GateName::Plan));
    }
}
