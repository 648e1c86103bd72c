//! Deterministic attribution of verification failures to a worker.
//!
//! - Test failures go to the locus of each changed path: test-artifact paths
//!   to the test worker, everything else to the code worker.
//! - Format/lint failures go to whichever worker touched a changed path last.
//! - With no recorded changes the code worker is responsible.

use std::collections::{BTreeMap, BTreeSet};
use std::path::{Component, Path};

use regex::Regex;

use crate::core::signature::FailureRecord;
use crate::core::types::{CheckCategory, Locus};

/// Relative path → content digest for every tracked file in the workspace.
pub type Fingerprint = BTreeMap<String, String>;

/// Classifies workspace-relative paths as test artifacts or production code.
#[derive(Debug, Clone)]
pub struct PathClassifier {
    test_patterns: Vec<Regex>,
}

impl PathClassifier {
    pub fn new<S: AsRef<str>>(test_patterns: &[S]) -> Result<Self, regex::Error> {
        let test_patterns = test_patterns
            .iter()
            .map(|pattern| Regex::new(pattern.as_ref()))
            .collect::<Result<Vec<_>, _>>()?;
        Ok(Self { test_patterns })
    }

    pub fn locus_of(&self, path: &str) -> Locus {
        let normalized = normalize_path(Path::new(path));
        if self
            .test_patterns
            .iter()
            .any(|pattern| pattern.is_match(&normalized))
        {
            Locus::Test
        } else {
            Locus::Code
        }
    }
}

/// Forward-slash path without `.` or root components.
fn normalize_path(path: &Path) -> String {
    path.components()
        .filter_map(|component| match component {
            Component::Normal(name) => Some(name.to_string_lossy().into_owned()),
            _ => None,
        })
        .collect::<Vec<_>>()
        .join("/")
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct LedgerEntry {
    locus: Locus,
    seq: u64,
}

/// Which worker last touched each changed path during a refinement sequence.
#[derive(Debug, Clone, Default)]
pub struct ChangeLedger {
    entries: BTreeMap<String, LedgerEntry>,
    next_seq: u64,
}

impl ChangeLedger {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record that `locus`'s worker changed `paths` in its latest dispatch.
    pub fn record<I, S>(&mut self, locus: Locus, paths: I)
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.next_seq += 1;
        for path in paths {
            self.entries.insert(
                path.into(),
                LedgerEntry {
                    locus,
                    seq: self.next_seq,
                },
            );
        }
    }

    pub fn paths(&self) -> impl Iterator<Item = &str> {
        self.entries.keys().map(String::as_str)
    }

    /// Worker behind the most recent recorded change.
    pub fn most_recent(&self) -> Option<Locus> {
        self.entries
            .values()
            .max_by_key(|entry| entry.seq)
            .map(|entry| entry.locus)
    }
}

/// Paths added, removed or modified between two fingerprints, sorted.
pub fn diff_fingerprints(before: &Fingerprint, after: &Fingerprint) -> Vec<String> {
    let mut changed = BTreeSet::new();
    for (path, digest) in after {
        if before.get(path) != Some(digest) {
            changed.insert(path.clone());
        }
    }
    for path in before.keys() {
        if !after.contains_key(path) {
            changed.insert(path.clone());
        }
    }
    changed.into_iter().collect()
}

/// A failed verification command, before attribution.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FailedCheck {
    pub category: CheckCategory,
    /// Command line as configured, used in the stable failure message.
    pub command: String,
    pub exit_code: Option<i32>,
    pub timed_out: bool,
    pub output_tail: String,
}

impl FailedCheck {
    fn message(&self) -> String {
        if self.timed_out {
            return format!("{} check `{}` timed out", self.category, self.command);
        }
        match self.exit_code {
            Some(code) => format!(
                "{} check `{}` failed (exit {code})",
                self.category, self.command
            ),
            None => format!(
                "{} check `{}` failed (terminated by signal)",
                self.category, self.command
            ),
        }
    }
}

/// Turn a failed command into one record per responsible locus.
pub fn attribute(
    check: &FailedCheck,
    ledger: &ChangeLedger,
    classifier: &PathClassifier,
) -> Vec<FailureRecord> {
    let loci: BTreeSet<Locus> = match check.category {
        CheckCategory::Test => ledger
            .paths()
            .map(|path| classifier.locus_of(path))
            .collect(),
        CheckCategory::Format | CheckCategory::Lint | CheckCategory::StrictLint => {
            ledger.most_recent().into_iter().collect()
        }
    };
    let loci = if loci.is_empty() {
        BTreeSet::from([Locus::Code])
    } else {
        loci
    };

    let message = check.message();
    loci.into_iter()
        .map(|locus| FailureRecord {
            category: check.category,
            locus,
            message: message.clone(),
            detail: check.output_tail.clone(),
        })
        .collect()
}
