//! Mapping a review result to accept / fix / block.

use crate::core::types::{Finding, ReviewResolution, Severity, StatusSignal};

/// What the review gate does next.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReviewPlan {
    /// Review accepted; findings artifact becomes `ready`.
    Accept,
    /// Append one fix task per finding and loop back to implementation.
    Fix(Vec<Finding>),
    /// The review cannot proceed without a human.
    Blocked(String),
}

/// First pass over the review result. `None` means a non-blocking
/// `needs_fixes` result that needs an external decision.
pub fn plan_review(signal: StatusSignal, findings: &[Finding]) -> Option<ReviewPlan> {
    let has_blocking = findings
        .iter()
        .any(|finding| finding.severity == Severity::Blocking);
    let plan = match signal {
        StatusSignal::Ready if has_blocking => ReviewPlan::Blocked(
            "review signalled ready but reported blocking findings".to_string(),
        ),
        StatusSignal::Ready => ReviewPlan::Accept,
        StatusSignal::Blocked if findings.is_empty() => {
            ReviewPlan::Blocked("review signalled blocked without any findings".to_string())
        }
        StatusSignal::Blocked => ReviewPlan::Fix(findings.to_vec()),
        StatusSignal::NeedsFixes if has_blocking => ReviewPlan::Fix(findings.to_vec()),
        StatusSignal::NeedsFixes => return None,
        StatusSignal::Draft => {
            ReviewPlan::Blocked("review returned a draft result".to_string())
        }
    };
    Some(plan)
}

/// Resolve non-blocking findings with an external decision.
pub fn resolve_review(resolution: ReviewResolution, findings: &[Finding]) -> ReviewPlan {
    let selected: Vec<Finding> = match resolution {
        ReviewResolution::FixAll => findings.to_vec(),
        ReviewResolution::FixImportant => findings
            .iter()
            .filter(|finding| finding.severity != Severity::Cosmetic)
            .cloned()
            .collect(),
        ReviewResolution::Skip => Vec::new(),
    };
    if selected.is_empty() {
        ReviewPlan::Accept
    } else {
        ReviewPlan::Fix(selected)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn finding(severity: Severity, summary: &str) -> Finding {
        Finding {
            severity,
            summary: summary.to_string(),
        }
    }

    #[test]
    fn ready_without_blocking_findings_is_accepted() {
        let findings = vec![finding(Severity::Cosmetic, "typo")];
        assert_eq!(
            plan_review(StatusSignal::Ready, &findings),
            Some(ReviewPlan::Accept)
        );
    }

    #[test]
    fn blocked_fixes_every_finding() {
        let findings = vec![
            finding(Severity::Blocking, "panics on empty"),
            finding(Severity::Cosmetic, "typo"),
        ];
        assert_eq!(
            plan_review(StatusSignal::Blocked, &findings),
            Some(ReviewPlan::Fix(findings.clone()))
        );
    }

    #[test]
    fn blocked_without_findings_needs_a_human() {
        assert!(matches!(
            plan_review(StatusSignal::Blocked, &[]),
            Some(ReviewPlan::Blocked(_))
        ));
        assert!(matches!(
            plan_review(StatusSignal::Draft, &[]),
            Some(ReviewPlan::Blocked(_))
        ));
    }

    #[test]
    fn non_blocking_needs_fixes_asks_for_a_decision() {
        let findings = vec![finding(Severity::Important, "missing docs")];
        assert_eq!(plan_review(StatusSignal::NeedsFixes, &findings), None);

        let with_blocking = vec![finding(Severity::Blocking, "data loss")];
        assert_eq!(
            plan_review(StatusSignal::NeedsFixes, &with_blocking),
            Some(ReviewPlan::Fix(with_blocking.clone()))
        );
    }

    #[test]
    fn resolutions_map_deterministically() {
        let findings = vec![
            finding(Severity::Important, "missing docs"),
            finding(Severity::Cosmetic, "typo"),
        ];
        assert_eq!(
            resolve_review(ReviewResolution::FixAll, &findings),
            ReviewPlan::Fix(findings.clone())
        );
        assert_eq!(
            resolve_review(ReviewResolution::FixImportant, &findings),
            ReviewPlan::Fix(vec![findings[0].clone()])
        );
        assert_eq!(
            resolve_review(ReviewResolution::Skip, &findings),
            ReviewPlan::Accept
        );
        assert_eq!(
            resolve_review(ReviewResolution::FixImportant, &findings[1..]),
            ReviewPlan::Accept
        );
    }
}
