//! Failure signatures and the per-task refinement budget.
//!
//! A signature is the set of `(category, locus, message)` triples produced by
//! one verification round. Two consecutive rounds with the same signature
//! mean the workers made no progress.

use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};

use crate::core::types::{CheckCategory, Locus};

/// One categorized verification failure.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FailureRecord {
    pub category: CheckCategory,
    pub locus: Locus,
    pub message: String,
    /// Output tail for diagnostics. Not part of the signature.
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub detail: String,
}

pub type FailureSignature = BTreeSet<(CheckCategory, Locus, String)>;

pub fn signature(failures: &[FailureRecord]) -> FailureSignature {
    failures
        .iter()
        .map(|record| (record.category, record.locus, record.message.clone()))
        .collect()
}

/// Loci that must be re-dispatched, in code-then-test order.
pub fn responsible_loci(failures: &[FailureRecord]) -> Vec<Locus> {
    let loci: BTreeSet<Locus> = failures.iter().map(|record| record.locus).collect();
    loci.into_iter().collect()
}

/// A failed refinement attempt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RefinementAttempt {
    /// 1-indexed attempt number for the task.
    pub iteration: u32,
    pub signature: FailureSignature,
    pub responsible: Vec<Locus>,
}

/// What to do after a failed attempt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AttemptVerdict {
    /// Re-dispatch only these loci with the failure diagnostics.
    Retry { responsible: Vec<Locus> },
    /// Same signature as the previous attempt.
    Stuck,
    /// Attempt budget spent.
    Exhausted,
}

/// Tracks attempts for one task's refinement sequence.
#[derive(Debug, Clone)]
pub struct RefinementTracker {
    max_attempts: u32,
    iteration: u32,
    previous: Option<RefinementAttempt>,
}

impl RefinementTracker {
    /// `prior_attempts` are attempts already spent on this task in earlier
    /// invocations; they count against the budget but carry no signature.
    pub fn new(max_attempts: u32, prior_attempts: u32) -> Self {
        Self {
            max_attempts,
            iteration: prior_attempts,
            previous: None,
        }
    }

    pub fn is_exhausted(&self) -> bool {
        self.iteration >= self.max_attempts
    }

    /// Start the next attempt and return its 1-indexed number.
    pub fn begin_attempt(&mut self) -> u32 {
        self.iteration += 1;
        self.iteration
    }

    /// Record a failed attempt. Stuck takes precedence over exhaustion.
    pub fn record_failure(&mut self, failures: &[FailureRecord]) -> AttemptVerdict {
        let attempt = RefinementAttempt {
            iteration: self.iteration,
            signature: signature(failures),
            responsible: responsible_loci(failures),
        };
        let stuck = self
            .previous
            .as_ref()
            .is_some_and(|prev| prev.signature == attempt.signature);
        let verdict = if stuck {
            AttemptVerdict::Stuck
        } else if self.is_exhausted() {
            AttemptVerdict::Exhausted
        } else {
            AttemptVerdict::Retry {
                responsible: attempt.responsible.clone(),
            }
        };
        self.previous = Some(attempt);
        verdict
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn failure(category: CheckCategory, locus: Locus, message: &str) -> FailureRecord {
        FailureRecord {
            category,
            locus,
            message: message.to_string(),
            detail: String::new(),
        }
    }

    #[test]
    fn signature_ignores_detail_and_order() {
        let mut a = failure(CheckCategory::Test, Locus::Code, "test failed");
        a.detail = "run 1".to_string();
        let b = failure(CheckCategory::Lint, Locus::Test, "lint failed");
        let mut a2 = a.clone();
        a2.detail = "run 2".to_string();

        assert_eq!(signature(&[a, b.clone()]), signature(&[b, a2]));
    }

    #[test]
    fn responsible_loci_are_deduplicated() {
        let failures = vec![
            failure(CheckCategory::Test, Locus::Test, "a"),
            failure(CheckCategory::Lint, Locus::Code, "b"),
            failure(CheckCategory::Format, Locus::Test, "c"),
        ];
        assert_eq!(responsible_loci(&failures), vec![Locus::Code, Locus::Test]);
    }

    /// Identical signatures on consecutive attempts stop after the second one.
    #[test]
    fn repeated_signature_is_stuck() {
        let mut tracker = RefinementTracker::new(3, 0);
        let failures = vec![failure(CheckCategory::Test, Locus::Code, "boom")];

        assert_eq!(tracker.begin_attempt(), 1);
        assert_eq!(
            tracker.record_failure(&failures),
            AttemptVerdict::Retry {
                responsible: vec![Locus::Code]
            }
        );
        assert_eq!(tracker.begin_attempt(), 2);
        assert_eq!(tracker.record_failure(&failures), AttemptVerdict::Stuck);
    }

    #[test]
    fn changing_signatures_run_until_exhausted() {
        let mut tracker = RefinementTracker::new(3, 0);
        for (idx, message) in ["one", "two", "three"].iter().enumerate() {
            tracker.begin_attempt();
            let verdict =
                tracker.record_failure(&[failure(CheckCategory::Test, Locus::Test, message)]);
            if idx < 2 {
                assert!(matches!(verdict, AttemptVerdict::Retry { .. }));
            } else {
                assert_eq!(verdict, AttemptVerdict::Exhausted);
            }
        }
        assert!(tracker.is_exhausted());
    }

    /// A same-signature third attempt is reported as stuck, not exhausted.
    #[test]
    fn stuck_wins_over_exhausted() {
        let mut tracker = RefinementTracker::new(2, 0);
        let failures = vec![failure(CheckCategory::Format, Locus::Code, "fmt")];
        tracker.begin_attempt();
        tracker.record_failure(&failures);
        tracker.begin_attempt();
        assert_eq!(tracker.record_failure(&failures), AttemptVerdict::Stuck);
    }

    #[test]
    fn prior_attempts_count_against_the_budget() {
        let mut tracker = RefinementTracker::new(3, 2);
        assert!(!tracker.is_exhausted());
        assert_eq!(tracker.begin_attempt(), 3);
        assert_eq!(
            tracker.record_failure(&[failure(CheckCategory::Test, Locus::Code, "x")]),
            AttemptVerdict::Exhausted
        );
    }
}
