//! Per-kind artifact status transition graphs.
//!
//! Statuses only move along the edges listed here. Rewriting the current
//! status is always allowed. The single backward edge is the task list's
//! `complete -> ready`, taken when review reopens implementation.

use crate::core::types::ArtifactKind;
use crate::core::types::ArtifactStatus::{self, Approved, Blocked, Complete, Draft, NeedsFixes, Ready};

type Edge = (ArtifactStatus, ArtifactStatus);

const APPROVAL_EDGES: &[Edge] = &[
    (Draft, Approved),
    (Draft, Blocked),
    (Blocked, Draft),
    (Blocked, Approved),
];

const COMPLETION_EDGES: &[Edge] = &[
    (Draft, Complete),
    (Draft, Blocked),
    (Blocked, Draft),
    (Blocked, Complete),
];

const TASK_LIST_EDGES: &[Edge] = &[
    (Draft, Ready),
    (Ready, Blocked),
    (Ready, NeedsFixes),
    (Ready, Complete),
    (Blocked, Ready),
    (NeedsFixes, Ready),
    (Complete, Ready),
];

const REVIEW_EDGES: &[Edge] = &[
    (Draft, Ready),
    (Draft, Blocked),
    (Draft, NeedsFixes),
    (Blocked, Ready),
    (Blocked, NeedsFixes),
    (NeedsFixes, Ready),
    (NeedsFixes, Blocked),
];

const SUMMARY_EDGES: &[Edge] = &[
    (Draft, Ready),
    (Draft, Blocked),
    (Blocked, Draft),
    (Blocked, Ready),
    (Ready, Complete),
];

fn edges(kind: ArtifactKind) -> &'static [Edge] {
    match kind {
        ArtifactKind::Requirements | ArtifactKind::Plan => APPROVAL_EDGES,
        ArtifactKind::ResearchNotes | ArtifactKind::QaReport => COMPLETION_EDGES,
        ArtifactKind::TaskList => TASK_LIST_EDGES,
        ArtifactKind::ReviewFindings => REVIEW_EDGES,
        ArtifactKind::Summary => SUMMARY_EDGES,
    }
}

/// Statuses that appear anywhere in `kind`'s graph.
pub fn allowed_statuses(kind: ArtifactKind) -> Vec<ArtifactStatus> {
    let mut statuses: Vec<ArtifactStatus> = edges(kind)
        .iter()
        .flat_map(|(from, to)| [*from, *to])
        .collect();
    statuses.sort();
    statuses.dedup();
    statuses
}

/// Check a single status change for `kind`.
///
/// Returns a stable error message when the edge is not in the graph.
pub fn validate_transition(
    kind: ArtifactKind,
    from: ArtifactStatus,
    to: ArtifactStatus,
) -> Result<(), String> {
    if from == to {
        if allowed_statuses(kind).contains(&to) {
            return Ok(());
        }
        return Err(format!("status '{to}' is not valid for {kind}"));
    }
    if edges(kind).contains(&(from, to)) {
        Ok(())
    } else {
        Err(format!("illegal {kind} transition {from} -> {to}"))
    }
}

/// True for the review loop's reopen edge.
pub fn is_reopen(kind: ArtifactKind, from: ArtifactStatus, to: ArtifactStatus) -> bool {
    kind == ArtifactKind::TaskList && from == Complete && to == Ready
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn approval_kinds_move_forward_only() {
        assert!(validate_transition(ArtifactKind::Requirements, Draft, Approved).is_ok());
        assert!(validate_transition(ArtifactKind::Plan, Blocked, Approved).is_ok());
        assert_eq!(
            validate_transition(ArtifactKind::Requirements, Approved, Draft),
            Err("illegal requirements transition approved -> draft".to_string())
        );
    }

    #[test]
    fn same_status_rewrite_is_allowed_for_known_statuses() {
        assert!(validate_transition(ArtifactKind::Plan, Approved, Approved).is_ok());
        assert!(validate_transition(ArtifactKind::Plan, Complete, Complete).is_err());
    }

    /// The reopen edge exists only on the task list.
    #[test]
    fn task_list_can_be_reopened() {
        assert!(validate_transition(ArtifactKind::TaskList, Complete, Ready).is_ok());
        assert!(is_reopen(ArtifactKind::TaskList, Complete, Ready));
        assert!(validate_transition(ArtifactKind::QaReport, Complete, Draft).is_err());
        assert!(validate_transition(ArtifactKind::Summary, Complete, Ready).is_err());
    }

    #[test]
    fn review_findings_never_return_to_draft() {
        for from in [Ready, Blocked, NeedsFixes] {
            assert!(validate_transition(ArtifactKind::ReviewFindings, from, Draft).is_err());
        }
        assert!(validate_transition(ArtifactKind::ReviewFindings, NeedsFixes, Ready).is_ok());
    }

    #[test]
    fn allowed_statuses_are_sorted_and_unique() {
        assert_eq!(
            allowed_statuses(ArtifactKind::ResearchNotes),
            vec![Draft, Blocked, Complete]
        );
    }
}
