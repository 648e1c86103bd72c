//! Task list sidecar (`tasks.json`) load/save with schema + invariant validation.

use std::fs;
use std::path::Path;

use anyhow::{Context, Result, anyhow};
use serde_json::Value;
use tracing::debug;

use crate::core::tasks::{TaskList, validate_task_list};
use crate::io::paths::write_atomic;
use crate::io::schema::{TASK_LIST_SCHEMA, validate_schema};

/// Load and validate the task list. A missing file is an empty list.
pub fn load_tasks(path: &Path) -> Result<TaskList> {
    if !path.exists() {
        return Ok(TaskList::default());
    }
    let contents =
        fs::read_to_string(path).with_context(|| format!("read tasks {}", path.display()))?;
    let value: Value = serde_json::from_str(&contents)
        .with_context(|| format!("parse tasks {}", path.display()))?;
    validate_schema(TASK_LIST_SCHEMA, &value, "task list")?;
    let list: TaskList = serde_json::from_value(value)
        .with_context(|| format!("deserialize tasks {}", path.display()))?;
    check_invariants(&list)?;
    debug!(tasks = list.tasks.len(), "task list loaded");
    Ok(list)
}

/// Validate and atomically write the task list.
pub fn write_tasks(path: &Path, list: &TaskList) -> Result<()> {
    check_invariants(list)?;
    let mut buf = serde_json::to_string_pretty(list)?;
    buf.push('\n');
    write_atomic(path, buf.as_bytes())
}

fn check_invariants(list: &TaskList) -> Result<()> {
    let errors = validate_task_list(list);
    if errors.is_empty() {
        return Ok(());
    }
    Err(anyhow!("task list invariants failed: {}", errors.join("; ")))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::tasks::{TaskId, TaskSpec};
    use crate::core::types::{Finding, Severity};

    /// Verifies write → load preserves ids, statuses and severities.
    #[test]
    fn tasks_round_trip() {
        let temp = tempfile::tempdir().expect("tempdir");
        let path = temp.path().join("tasks.json");
        let mut list = TaskList::from_breakdown(&[TaskSpec {
            description: "parse input".to_string(),
            acceptance: vec!["rejects garbage".to_string()],
        }]);
        list.mark_done(TaskId::original(1));
        list.append_review_fixes(&[Finding {
            severity: Severity::Important,
            summary: "document errors".to_string(),
        }]);

        write_tasks(&path, &list).expect("write");
        assert_eq!(load_tasks(&path).expect("load"), list);

        let raw = fs::read_to_string(&path).expect("read");
        assert!(raw.contains("\"id\": \"R1\""));
    }

    #[test]
    fn missing_file_is_empty_list() {
        let temp = tempfile::tempdir().expect("tempdir");
        let list = load_tasks(&temp.path().join("tasks.json")).expect("load");
        assert!(list.tasks.is_empty());
    }

    #[test]
    fn duplicate_ids_are_rejected_on_load() {
        let temp = tempfile::tempdir().expect("tempdir");
        let path = temp.path().join("tasks.json");
        fs::write(
            &path,
            r#"{"tasks":[
                {"id":"T1","description":"a","status":"pending"},
                {"id":"T1","description":"b","status":"pending"}
            ]}"#,
        )
        .expect("write");

        let err = load_tasks(&path).unwrap_err();
        assert!(err.to_string().contains("duplicate task id 'T1'"));
    }
}
