//! Task list model: original tasks (`T1..`) and review-fix tasks (`R1..`).

use std::collections::HashSet;
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Deserializer, Serialize, Serializer};

use crate::core::types::{Finding, Severity};

/// Numbering namespace of a task id.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum TaskNamespace {
    Original,
    ReviewFix,
}

impl TaskNamespace {
    fn prefix(self) -> char {
        match self {
            TaskNamespace::Original => 'T',
            TaskNamespace::ReviewFix => 'R',
        }
    }
}

/// Task identifier. Ids in different namespaces never collide.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TaskId {
    pub namespace: TaskNamespace,
    pub seq: u32,
}

impl TaskId {
    pub fn original(seq: u32) -> Self {
        Self {
            namespace: TaskNamespace::Original,
            seq,
        }
    }

    pub fn review_fix(seq: u32) -> Self {
        Self {
            namespace: TaskNamespace::ReviewFix,
            seq,
        }
    }
}

impl fmt::Display for TaskId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}{}", self.namespace.prefix(), self.seq)
    }
}

impl FromStr for TaskId {
    type Err = String;

    fn from_str(raw: &str) -> Result<Self, Self::Err> {
        let mut chars = raw.chars();
        let namespace = match chars.next() {
            Some('T') => TaskNamespace::Original,
            Some('R') => TaskNamespace::ReviewFix,
            _ => return Err(format!("invalid task id '{raw}'")),
        };
        let seq: u32 = chars
            .as_str()
            .parse()
            .map_err(|_| format!("invalid task id '{raw}'"))?;
        if seq == 0 {
            return Err(format!("invalid task id '{raw}' (numbering starts at 1)"));
        }
        Ok(Self { namespace, seq })
    }
}

impl Serialize for TaskId {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for TaskId {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        raw.parse().map_err(serde::de::Error::custom)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskStatus {
    Pending,
    Done,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Task {
    pub id: TaskId,
    pub description: String,
    #[serde(default)]
    pub acceptance: Vec<String>,
    pub status: TaskStatus,
    /// Severity of the review finding a fix task was created from.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub severity: Option<Severity>,
}

/// Task as returned by the task-breakdown worker, before ids are assigned.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TaskSpec {
    pub description: String,
    #[serde(default)]
    pub acceptance: Vec<String>,
}

/// Ordered task list: original tasks first, review-fix tasks appended.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct TaskList {
    pub tasks: Vec<Task>,
}

impl TaskList {
    /// Build the original list, assigning `T1..Tn` in the given order.
    pub fn from_breakdown(specs: &[TaskSpec]) -> Self {
        let tasks = specs
            .iter()
            .zip(1u32..)
            .map(|(spec, seq)| Task {
                id: TaskId::original(seq),
                description: spec.description.trim().to_string(),
                acceptance: spec.acceptance.clone(),
                status: TaskStatus::Pending,
                severity: None,
            })
            .collect();
        Self { tasks }
    }

    /// Append one pending fix task per finding, continuing the `R` sequence.
    ///
    /// Returns the ids that were added.
    pub fn append_review_fixes(&mut self, findings: &[Finding]) -> Vec<TaskId> {
        let mut next = self.next_seq(TaskNamespace::ReviewFix);
        let mut added = Vec::with_capacity(findings.len());
        for finding in findings {
            let id = TaskId::review_fix(next);
            next += 1;
            self.tasks.push(Task {
                id,
                description: finding.summary.trim().to_string(),
                acceptance: Vec::new(),
                status: TaskStatus::Pending,
                severity: Some(finding.severity),
            });
            added.push(id);
        }
        added
    }

    /// Review-fix tasks in list order.
    pub fn review_fixes(&self) -> impl Iterator<Item = &Task> {
        self.tasks
            .iter()
            .filter(|task| task.id.namespace == TaskNamespace::ReviewFix)
    }

    pub fn next_pending(&self) -> Option<&Task> {
        self.tasks
            .iter()
            .find(|task| task.status == TaskStatus::Pending)
    }

    pub fn get(&self, id: TaskId) -> Option<&Task> {
        self.tasks.iter().find(|task| task.id == id)
    }

    /// Flip a task to `Done`. Returns false if the id is unknown.
    pub fn mark_done(&mut self, id: TaskId) -> bool {
        match self.tasks.iter_mut().find(|task| task.id == id) {
            Some(task) => {
                task.status = TaskStatus::Done;
                true
            }
            None => false,
        }
    }

    pub fn is_complete(&self) -> bool {
        self.tasks.iter().all(|task| task.status == TaskStatus::Done)
    }

    pub fn done_count(&self) -> usize {
        self.tasks
            .iter()
            .filter(|task| task.status == TaskStatus::Done)
            .count()
    }

    fn next_seq(&self, namespace: TaskNamespace) -> u32 {
        self.tasks
            .iter()
            .filter(|task| task.id.namespace == namespace)
            .map(|task| task.id.seq)
            .max()
            .unwrap_or(0)
            + 1
    }
}

/// Checklist line appended to the task list artifact for a task.
pub fn checklist_line(task: &Task) -> String {
    match task.severity {
        Some(severity) => format!("- [ ] {}: [{}] {}", task.id, severity, task.description),
        None => format!("- [ ] {}: {}", task.id, task.description),
    }
}

/// Tick the checklist line of a finished task; every other line is kept.
pub fn tick_checklist(content: &str, id: TaskId) -> String {
    let open = format!("- [ ] {id}:");
    content
        .split_inclusive('\n')
        .map(|line| match line.strip_prefix(&open) {
            Some(rest) => format!("- [x] {id}:{rest}"),
            None => line.to_string(),
        })
        .collect()
}

/// Check invariants the schema cannot express:
/// - No duplicate ids
/// - Each namespace numbered contiguously from 1
/// - Non-empty descriptions
pub fn validate_task_list(list: &TaskList) -> Vec<String> {
    let mut errors = Vec::new();
    let mut seen = HashSet::new();
    for task in &list.tasks {
        if !seen.insert(task.id) {
            errors.push(format!("duplicate task id '{}'", task.id));
        }
        if task.description.trim().is_empty() {
            errors.push(format!("{}: description must not be empty", task.id));
        }
    }

    for namespace in [TaskNamespace::Original, TaskNamespace::ReviewFix] {
        let mut seqs: Vec<u32> = list
            .tasks
            .iter()
            .filter(|task| task.id.namespace == namespace)
            .map(|task| task.id.seq)
            .collect();
        seqs.sort_unstable();
        seqs.dedup();
        if seqs.iter().zip(1u32..).any(|(seq, expected)| *seq != expected) {
            errors.push(format!(
                "{} task ids must be numbered 1..{} without gaps",
                namespace.prefix(),
                seqs.len()
            ));
        }
    }

    errors
}

#[cfg(test)]
mod tests {
    use super::*;

    fn specs(n: usize) -> Vec<TaskSpec> {
        (1..=n)
            .map(|i| TaskSpec {
                description: format!("task {i}"),
                acceptance: vec![format!("criterion {i}")],
            })
            .collect()
    }

    fn finding(severity: Severity, summary: &str) -> Finding {
        Finding {
            severity,
            summary: summary.to_string(),
        }
    }

    #[test]
    fn task_ids_round_trip_through_strings() {
        assert_eq!("T3".parse::<TaskId>(), Ok(TaskId::original(3)));
        assert_eq!("R12".parse::<TaskId>(), Ok(TaskId::review_fix(12)));
        assert_eq!(TaskId::review_fix(2).to_string(), "R2");
        assert!("X1".parse::<TaskId>().is_err());
        assert!("T0".parse::<TaskId>().is_err());
        assert!("T".parse::<TaskId>().is_err());
    }

    #[test]
    fn breakdown_assigns_sequential_original_ids() {
        let list = TaskList::from_breakdown(&specs(3));
        let ids: Vec<String> = list.tasks.iter().map(|t| t.id.to_string()).collect();
        assert_eq!(ids, vec!["T1", "T2", "T3"]);
        assert_eq!(list.next_pending().map(|t| t.id), Some(TaskId::original(1)));
    }

    /// Fix tasks continue their own sequence across review cycles and never
    /// reuse an original id.
    #[test]
    fn review_fixes_use_a_separate_namespace() {
        let mut list = TaskList::from_breakdown(&specs(2));
        let first = list.append_review_fixes(&[
            finding(Severity::Blocking, "null check"),
            finding(Severity::Cosmetic, "rename"),
        ]);
        let second = list.append_review_fixes(&[finding(Severity::Important, "docs")]);

        assert_eq!(first, vec![TaskId::review_fix(1), TaskId::review_fix(2)]);
        assert_eq!(second, vec![TaskId::review_fix(3)]);
        assert!(validate_task_list(&list).is_empty());
        assert_eq!(list.review_fixes().count(), 3);
    }

    #[test]
    fn mark_done_completes_the_list() {
        let mut list = TaskList::from_breakdown(&specs(2));
        assert!(list.mark_done(TaskId::original(1)));
        assert!(!list.is_complete());
        assert!(list.mark_done(TaskId::original(2)));
        assert!(list.is_complete());
        assert!(!list.mark_done(TaskId::review_fix(1)));
        assert_eq!(list.done_count(), 2);
    }

    #[test]
    fn validate_reports_duplicates_and_gaps() {
        let mut list = TaskList::from_breakdown(&specs(2));
        list.tasks[1].id = TaskId::original(1);
        list.tasks.push(Task {
            id: TaskId::review_fix(2),
            description: " ".to_string(),
            acceptance: Vec::new(),
            status: TaskStatus::Pending,
            severity: None,
        });

        let errors = validate_task_list(&list);
        assert!(errors.iter().any(|e| e == "duplicate task id 'T1'"));
        assert!(errors.iter().any(|e| e == "R2: description must not be empty"));
        assert!(errors.iter().any(|e| e.starts_with("R task ids must be numbered")));
    }

    #[test]
    fn checklist_line_includes_severity_for_fixes() {
        let mut list = TaskList::from_breakdown(&specs(1));
        list.append_review_fixes(&[finding(Severity::Blocking, "handle empty input")]);
        assert_eq!(checklist_line(&list.tasks[0]), "- [ ] T1: task 1");
        assert_eq!(
            checklist_line(&list.tasks[1]),
            "- [ ] R1: [blocking] handle empty input"
        );
    }

    #[test]
    fn tick_marks_only_the_finished_task() {
        let doc = "status: ready\n\n- [ ] T1: one\n- [ ] T10: ten\n- [ ] R1: [important] fix\n";
        assert_eq!(
            tick_checklist(doc, TaskId::original(1)),
            "status: ready\n\n- [x] T1: one\n- [ ] T10: ten\n- [ ] R1: [important] fix\n"
        );
        assert_eq!(
            tick_checklist(doc, TaskId::review_fix(1)),
            "status: ready\n\n- [ ] T1: one\n- [ ] T10: ten\n- [x] R1: [important] fix\n"
        );
    }
}
