//! The fixed gate table: order, artifact, worker and satisfying statuses.

use std::collections::BTreeMap;

use crate::core::status_graph::validate_transition;
use crate::core::types::{ArtifactKind, ArtifactStatus, GateName, WorkerRole};

/// Who performs a gate's work.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GateWorker {
    /// One dispatch to a single worker role.
    Single(WorkerRole),
    /// Per-task code/test refinement (implementation gate).
    Refinement,
}

/// A pipeline stage. Defined once in [`GATES`] and never mutated.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Gate {
    pub name: GateName,
    pub artifact: ArtifactKind,
    pub worker: GateWorker,
    pub satisfied_by: &'static [ArtifactStatus],
}

pub const GATES: [Gate; 9] = [
    Gate {
        name: GateName::Requirements,
        artifact: ArtifactKind::Requirements,
        worker: GateWorker::Single(WorkerRole::Requirements),
        satisfied_by: &[ArtifactStatus::Approved],
    },
    Gate {
        name: GateName::Research,
        artifact: ArtifactKind::ResearchNotes,
        worker: GateWorker::Single(WorkerRole::Research),
        satisfied_by: &[ArtifactStatus::Complete],
    },
    Gate {
        name: GateName::Plan,
        artifact: ArtifactKind::Plan,
        worker: GateWorker::Single(WorkerRole::Planner),
        satisfied_by: &[ArtifactStatus::Approved],
    },
    // Blocked/needs_fixes on the task list come from implementation, not from
    // the breakdown worker, so they still mean the breakdown exists.
    Gate {
        name: GateName::TaskList,
        artifact: ArtifactKind::TaskList,
        worker: GateWorker::Single(WorkerRole::TaskBreakdown),
        satisfied_by: &[
            ArtifactStatus::Ready,
            ArtifactStatus::Blocked,
            ArtifactStatus::NeedsFixes,
            ArtifactStatus::Complete,
        ],
    },
    Gate {
        name: GateName::Implementation,
        artifact: ArtifactKind::TaskList,
        worker: GateWorker::Refinement,
        satisfied_by: &[ArtifactStatus::Complete],
    },
    Gate {
        name: GateName::Review,
        artifact: ArtifactKind::ReviewFindings,
        worker: GateWorker::Single(WorkerRole::Reviewer),
        satisfied_by: &[ArtifactStatus::Ready],
    },
    Gate {
        name: GateName::Qa,
        artifact: ArtifactKind::QaReport,
        worker: GateWorker::Single(WorkerRole::Qa),
        satisfied_by: &[ArtifactStatus::Complete],
    },
    Gate {
        name: GateName::Docs,
        artifact: ArtifactKind::Summary,
        worker: GateWorker::Single(WorkerRole::Docs),
        satisfied_by: &[ArtifactStatus::Ready, ArtifactStatus::Complete],
    },
    Gate {
        name: GateName::Validate,
        artifact: ArtifactKind::Summary,
        worker: GateWorker::Single(WorkerRole::Validator),
        satisfied_by: &[ArtifactStatus::Complete],
    },
];

/// Look up a gate by name.
pub fn gate(name: GateName) -> &'static Gate {
    &GATES[name.index()]
}

/// Effective artifact statuses for one ticket. A missing entry means the
/// artifact does not exist.
pub type ArtifactStatuses = BTreeMap<ArtifactKind, ArtifactStatus>;

impl Gate {
    /// Skip predicate: the gate's artifact exists with a satisfying status.
    pub fn is_satisfied(&self, statuses: &ArtifactStatuses) -> bool {
        statuses
            .get(&self.artifact)
            .is_some_and(|status| self.satisfied_by.contains(status))
    }

    /// Artifacts produced by earlier gates that currently exist, in gate order.
    pub fn input_artifacts(&self, statuses: &ArtifactStatuses) -> Vec<ArtifactKind> {
        let mut kinds = Vec::new();
        for earlier in &GATES[..self.name.index()] {
            if earlier.artifact != self.artifact
                && statuses.contains_key(&earlier.artifact)
                && !kinds.contains(&earlier.artifact)
            {
                kinds.push(earlier.artifact);
            }
        }
        kinds
    }

    /// Postcondition after the gate's worker ran.
    ///
    /// `before` is the effective status prior to dispatch (missing counts as
    /// draft); `after` is `None` when the artifact does not exist.
    pub fn check_postcondition(
        &self,
        before: ArtifactStatus,
        after: Option<ArtifactStatus>,
    ) -> Result<ArtifactStatus, String> {
        let Some(after) = after else {
            return Err(format!(
                "{} gate produced no {} artifact",
                self.name, self.artifact
            ));
        };
        validate_transition(self.artifact, before, after)?;
        if !self.satisfied_by.contains(&after) {
            return Err(format!(
                "{} artifact status '{}' does not satisfy the {} gate",
                self.artifact, after, self.name
            ));
        }
        Ok(after)
    }
}
