//! Dispatch journal under `.gatekeeper/tickets/<id>/journal/`.
//!
//! Product records for triage: always written, unaffected by `RUST_LOG`.

use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use serde::Serialize;

use crate::core::signature::FailureRecord;
use crate::core::types::GateName;
use crate::io::dispatch::{Invocation, WorkerRequest, WorkerResult};
use crate::io::paths::TicketPaths;
use crate::io::verify::VerificationReport;

/// Paths for one journal entry.
#[derive(Debug, Clone)]
pub struct JournalEntry {
    pub dir: PathBuf,
    pub request_path: PathBuf,
    pub result_path: PathBuf,
    pub log_path: PathBuf,
    pub verify_log_path: PathBuf,
    pub failures_path: PathBuf,
}

impl JournalEntry {
    pub fn new(paths: &TicketPaths, seq: u32, gate: GateName, label: &str) -> Self {
        let dir = paths.journal_entry(seq, gate, label);
        Self {
            request_path: dir.join("request.json"),
            result_path: dir.join("result.json"),
            log_path: dir.join("worker.log"),
            verify_log_path: dir.join("verify.log"),
            failures_path: dir.join("failures.json"),
            dir,
        }
    }

    pub fn create(&self) -> Result<()> {
        fs::create_dir_all(&self.dir)
            .with_context(|| format!("create journal dir {}", self.dir.display()))
    }

    /// Invocation paths rooted in this entry.
    pub fn invocation(
        &self,
        workdir: &Path,
        timeout: std::time::Duration,
        output_limit_bytes: usize,
    ) -> Invocation {
        Invocation {
            workdir: workdir.to_path_buf(),
            result_path: self.result_path.clone(),
            log_path: self.log_path.clone(),
            timeout,
            output_limit_bytes,
        }
    }

    pub fn write_request(&self, request: &WorkerRequest) -> Result<()> {
        self.create()?;
        write_json(&self.request_path, request)
    }

    /// Normalized copy of the result (the worker's raw file is replaced).
    pub fn write_result(&self, result: &WorkerResult) -> Result<()> {
        write_json(&self.result_path, result)
    }

    pub fn write_verification(&self, report: &VerificationReport) -> Result<()> {
        self.create()?;
        write_text(&self.verify_log_path, &report.render_log())?;
        write_json(&self.failures_path, &report.failures)
    }
}

/// Failure records of a verification round, for the journal.
pub fn read_failures(entry: &JournalEntry) -> Result<Vec<FailureRecord>> {
    let contents = fs::read_to_string(&entry.failures_path)
        .with_context(|| format!("read {}", entry.failures_path.display()))?;
    serde_json::from_str(&contents)
        .with_context(|| format!("parse {}", entry.failures_path.display()))
}

fn write_text(path: &Path, contents: &str) -> Result<()> {
    fs::write(path, contents).with_context(|| format!("write {}", path.display()))
}

fn write_json<T: Serialize + ?Sized>(path: &Path, value: &T) -> Result<()> {
    let mut buf = serde_json::to_string_pretty(value)?;
    buf.push('\n');
    write_text(path, &buf)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::types::{CheckCategory, Locus, TicketId, WorkerRole};
    use crate::io::paths::WorkspacePaths;
    use crate::io::verify::CheckOutcome;

    fn ticket_paths(root: &Path) -> TicketPaths {
        WorkspacePaths::new(root).ticket(&TicketId::parse("PROJ-2").expect("ticket"))
    }

    #[test]
    fn entry_paths_are_stable() {
        let temp = tempfile::tempdir().expect("tempdir");
        let entry = JournalEntry::new(&ticket_paths(temp.path()), 12, GateName::Implementation, "code");

        assert!(entry.dir.ends_with("journal/0012-implementation-code"));
        assert!(entry.request_path.ends_with("request.json"));
        assert!(entry.result_path.ends_with("result.json"));
        assert!(entry.log_path.ends_with("worker.log"));
    }

    #[test]
    fn writes_request_and_verification() {
        let temp = tempfile::tempdir().expect("tempdir");
        let paths = ticket_paths(temp.path());
        let dispatch = JournalEntry::new(&paths, 1, GateName::Plan, "planner");
        dispatch
            .write_request(&WorkerRequest {
                ticket_id: TicketId::parse("PROJ-2").expect("ticket"),
                gate: GateName::Plan,
                worker: WorkerRole::Planner,
                task: None,
                input_artifacts: Vec::new(),
                target_artifact: None,
                instructions: "plan".to_string(),
            })
            .expect("request");
        assert!(dispatch.request_path.is_file());

        let verify = JournalEntry::new(&paths, 2, GateName::Implementation, "verify");
        let failure = FailureRecord {
            category: CheckCategory::Test,
            locus: Locus::Code,
            message: "test check `cargo test` failed (exit 101)".to_string(),
            detail: String::new(),
        };
        let check = crate::io::config::CheckCommand::new(CheckCategory::Test, &["cargo", "test"]);
        verify
            .write_verification(&VerificationReport {
                passed: false,
                outcomes: vec![CheckOutcome::fail(&check, 101, "panicked")],
                failures: vec![failure.clone()],
            })
            .expect("verify");

        assert!(
            fs::read_to_string(&verify.verify_log_path)
                .expect("log")
                .contains("panicked")
        );
        assert_eq!(read_failures(&verify).expect("failures"), vec![failure]);
    }
}
