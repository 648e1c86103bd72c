//! Test-only helpers: a temp workspace and scripted collaborators.

use std::cell::{Cell, RefCell};
use std::collections::{BTreeMap, VecDeque};
use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result, anyhow};
use tempfile::TempDir;

use crate::core::attribution::Fingerprint;
use crate::core::gates::gate;
use crate::core::status_marker::set_status;
use crate::core::tasks::TaskSpec;
use crate::core::types::{
    CheckCategory, Checkpoint, CheckpointDecision, Finding, GateName, ReviewResolution,
    StatusSignal, TicketId, WorkerRole,
};
use crate::engine::Collaborators;
use crate::io::config::{CheckCommand, GatekeeperConfig, load_config};
use crate::io::decisions::DecisionPrompt;
use crate::io::dispatch::{Invocation, WorkerBackend, WorkerRequest, WorkerResult};
use crate::io::paths::{TicketPaths, WorkspacePaths, init_workspace};
use crate::io::snapshot::{ContentSnapshots, Snapshot, SnapshotManager};
use crate::io::verify::{CheckOutcome, CheckRunner};
use crate::orchestrator::{RunOptions, TicketOutcome, run_ticket};

/// A temp directory initialized with `.gatekeeper/`.
pub struct TestWorkspace {
    dir: TempDir,
}

impl TestWorkspace {
    pub fn new() -> Result<Self> {
        let dir = tempfile::tempdir().context("create temp workspace")?;
        init_workspace(dir.path(), false)?;
        Ok(Self { dir })
    }

    pub fn root(&self) -> &Path {
        self.dir.path()
    }

    pub fn paths(&self) -> WorkspacePaths {
        WorkspacePaths::new(self.root())
    }

    pub fn ticket_paths(&self, ticket: &TicketId) -> TicketPaths {
        self.paths().ticket(ticket)
    }

    pub fn config(&self) -> Result<GatekeeperConfig> {
        load_config(&self.paths().config_path)
    }

    pub fn write_file(&self, rel: &str, contents: &str) -> Result<()> {
        let path = self.root().join(rel);
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        fs::write(&path, contents).with_context(|| format!("write {}", path.display()))
    }

    pub fn read_file(&self, rel: &str) -> Result<String> {
        let path = self.root().join(rel);
        fs::read_to_string(&path).with_context(|| format!("read {}", path.display()))
    }

    pub fn snapshots(&self) -> Result<RecordingSnapshots> {
        let config = self.config()?;
        Ok(RecordingSnapshots::new(ContentSnapshots::new(
            self.root(),
            self.paths().snapshots_dir,
            &config.snapshot.exclude,
        )))
    }
}

/// A workspace plus one of each scripted collaborator.
///
/// Fields are public so a test can swap in its own script before running.
pub struct Harness {
    pub workspace: TestWorkspace,
    pub config: GatekeeperConfig,
    pub workers: ScriptedWorkers,
    pub checks: ScriptedChecks,
    pub snapshots: RecordingSnapshots,
    pub decisions: ScriptedDecisions,
}

impl Harness {
    /// Everything succeeds; the breakdown worker returns `tasks`.
    pub fn new(tasks: &[&str]) -> Result<Self> {
        let workspace = TestWorkspace::new()?;
        let config = workspace.config()?;
        let snapshots = workspace.snapshots()?;
        Ok(Self {
            workspace,
            config,
            workers: ScriptedWorkers::new(tasks),
            checks: ScriptedChecks::passing(),
            snapshots,
            decisions: ScriptedDecisions::default(),
        })
    }

    pub fn run(&self, ticket: &TicketId, options: &RunOptions) -> Result<TicketOutcome> {
        run_ticket(
            self.workspace.root(),
            ticket,
            &self.config,
            options,
            Collaborators {
                workers: &self.workers,
                checks: &self.checks,
                snapshots: &self.snapshots,
                decisions: &self.decisions,
            },
        )
    }
}

/// What a scripted worker does for one dispatch.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ScriptedReply {
    /// The role's normal successful behaviour (see [`ScriptedWorkers`]).
    Succeed,
    /// Review result with this signal and findings.
    Review {
        signal: StatusSignal,
        findings: Vec<Finding>,
    },
    /// Write these workspace files (relative path, contents), then report ready.
    Files(Vec<(String, String)>),
    /// Report `blocked` with these diagnostics and touch nothing.
    Blocked(String),
    /// The invocation itself fails.
    Unavailable(String),
    /// Leave a result that violates the worker result schema.
    Malformed,
}

/// One recorded dispatch.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WorkerCall {
    pub role: WorkerRole,
    pub gate: GateName,
    pub task: Option<String>,
    pub attempt: Option<u32>,
}

/// Worker backend with per-role reply queues.
///
/// An empty queue means [`ScriptedReply::Succeed`]:
/// - document roles write their target artifact with the gate's first
///   satisfying status
/// - `task_breakdown` returns the configured tasks
/// - `reviewer` reports ready with no findings
/// - `code` writes `src/<task>.rs`, `test` writes `tests/<task>.rs`
pub struct ScriptedWorkers {
    tasks: Vec<TaskSpec>,
    queues: RefCell<BTreeMap<WorkerRole, VecDeque<ScriptedReply>>>,
    calls: RefCell<Vec<WorkerCall>>,
}

impl ScriptedWorkers {
    pub fn new(task_descriptions: &[&str]) -> Self {
        Self {
            tasks: task_descriptions
                .iter()
                .map(|description| TaskSpec {
                    description: description.to_string(),
                    acceptance: vec![format!("{description} works")],
                })
                .collect(),
            queues: RefCell::new(BTreeMap::new()),
            calls: RefCell::new(Vec::new()),
        }
    }

    pub fn queue(&self, role: WorkerRole, replies: Vec<ScriptedReply>) {
        self.queues
            .borrow_mut()
            .entry(role)
            .or_default()
            .extend(replies);
    }

    pub fn calls(&self) -> Vec<WorkerCall> {
        self.calls.borrow().clone()
    }

    pub fn calls_for(&self, role: WorkerRole) -> usize {
        self.calls.borrow().iter().filter(|call| call.role == role).count()
    }

    pub fn calls_for_task(&self, task: &str) -> usize {
        self.calls
            .borrow()
            .iter()
            .filter(|call| call.task.as_deref() == Some(task))
            .count()
    }

    fn next_reply(&self, role: WorkerRole) -> ScriptedReply {
        self.queues
            .borrow_mut()
            .get_mut(&role)
            .and_then(VecDeque::pop_front)
            .unwrap_or(ScriptedReply::Succeed)
    }

    fn succeed(&self, request: &WorkerRequest, invocation: &Invocation) -> Result<WorkerResult> {
        let mut result = WorkerResult::ready(format!("{} done", request.worker));
        match request.worker {
            WorkerRole::TaskBreakdown => result.tasks = self.tasks.clone(),
            WorkerRole::Reviewer => {}
            WorkerRole::Code | WorkerRole::Test => {
                let task = request
                    .task
                    .as_ref()
                    .ok_or_else(|| anyhow!("{} dispatched without a task", request.worker))?;
                let name = task.id.to_lowercase();
                let rel = match request.worker {
                    WorkerRole::Code => format!("src/{name}.rs"),
                    _ => format!("tests/{name}.rs"),
                };
                write_under(&invocation.workdir, &rel, &format!("// {}\n", task.description))?;
            }
            _ => {
                let target = request
                    .target_artifact
                    .as_ref()
                    .ok_or_else(|| anyhow!("{} dispatched without a target", request.worker))?;
                let path = PathBuf::from(&target.locator);
                let existing = fs::read_to_string(&path)
                    .unwrap_or_else(|_| format!("# {}\n\nWritten by {}.\n", target.kind, request.worker));
                let status = gate(request.gate).satisfied_by[0];
                fs::write(&path, set_status(&existing, status))
                    .with_context(|| format!("write {}", path.display()))?;
                result.produced_artifacts.push(target.clone());
            }
        }
        Ok(result)
    }
}

impl WorkerBackend for ScriptedWorkers {
    fn invoke(&self, request: &WorkerRequest, invocation: &Invocation) -> Result<()> {
        self.calls.borrow_mut().push(WorkerCall {
            role: request.worker,
            gate: request.gate,
            task: request.task.as_ref().map(|task| task.id.clone()),
            attempt: request.task.as_ref().map(|task| task.attempt),
        });
        let result = match self.next_reply(request.worker) {
            ScriptedReply::Succeed => self.succeed(request, invocation)?,
            ScriptedReply::Review { signal, findings } => WorkerResult {
                findings,
                status_signal: signal,
                ..WorkerResult::ready("reviewed")
            },
            ScriptedReply::Files(files) => {
                for (rel, contents) in &files {
                    write_under(&invocation.workdir, rel, contents)?;
                }
                WorkerResult::ready("wrote files")
            }
            ScriptedReply::Blocked(diagnostics) => WorkerResult {
                status_signal: StatusSignal::Blocked,
                ..WorkerResult::ready(diagnostics)
            },
            ScriptedReply::Unavailable(reason) => return Err(anyhow!(reason)),
            ScriptedReply::Malformed => {
                fs::write(&invocation.result_path, r#"{"status_signal":"done"}"#)?;
                return Ok(());
            }
        };
        let payload = serde_json::to_string_pretty(&result)?;
        fs::write(&invocation.result_path, payload)
            .with_context(|| format!("write {}", invocation.result_path.display()))
    }
}

fn write_under(root: &Path, rel: &str, contents: &str) -> Result<()> {
    let path = root.join(rel);
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }
    fs::write(&path, contents).with_context(|| format!("write {}", path.display()))
}

/// Check runner replaying failing categories per verification round.
///
/// Rounds past the end of the script pass.
pub struct ScriptedChecks {
    rounds: RefCell<VecDeque<Vec<CheckCategory>>>,
    runs: Cell<usize>,
}

impl ScriptedChecks {
    pub fn new(rounds: Vec<Vec<CheckCategory>>) -> Self {
        Self {
            rounds: RefCell::new(rounds.into()),
            runs: Cell::new(0),
        }
    }

    pub fn passing() -> Self {
        Self::new(Vec::new())
    }

    pub fn runs(&self) -> usize {
        self.runs.get()
    }
}

impl CheckRunner for ScriptedChecks {
    fn run_checks(&self, commands: &[CheckCommand], _workdir: &Path) -> Result<Vec<CheckOutcome>> {
        self.runs.set(self.runs.get() + 1);
        let failing = self.rounds.borrow_mut().pop_front().unwrap_or_default();
        Ok(commands
            .iter()
            .map(|check| {
                if failing.contains(&check.category) {
                    CheckOutcome::fail(check, 1, format!("{} failed", check.category))
                } else {
                    CheckOutcome::pass(check)
                }
            })
            .collect())
    }
}

/// Decisions replayed from queues; defaults are continue and fix-all.
#[derive(Default)]
pub struct ScriptedDecisions {
    checkpoints: RefCell<VecDeque<CheckpointDecision>>,
    reviews: RefCell<VecDeque<ReviewResolution>>,
    asked: RefCell<Vec<Checkpoint>>,
    review_prompts: Cell<usize>,
}

impl ScriptedDecisions {
    pub fn new(checkpoints: Vec<CheckpointDecision>, reviews: Vec<ReviewResolution>) -> Self {
        Self {
            checkpoints: RefCell::new(checkpoints.into()),
            reviews: RefCell::new(reviews.into()),
            ..Self::default()
        }
    }

    pub fn asked(&self) -> Vec<Checkpoint> {
        self.asked.borrow().clone()
    }

    pub fn review_prompts(&self) -> usize {
        self.review_prompts.get()
    }
}

impl DecisionPrompt for ScriptedDecisions {
    fn checkpoint(&self, checkpoint: Checkpoint) -> Result<CheckpointDecision> {
        self.asked.borrow_mut().push(checkpoint);
        Ok(self
            .checkpoints
            .borrow_mut()
            .pop_front()
            .unwrap_or(CheckpointDecision::Continue))
    }

    fn review(&self, _findings: &[Finding]) -> Result<ReviewResolution> {
        self.review_prompts.set(self.review_prompts.get() + 1);
        Ok(self
            .reviews
            .borrow_mut()
            .pop_front()
            .unwrap_or(ReviewResolution::FixAll))
    }
}

/// Real content snapshots that also record what happened.
pub struct RecordingSnapshots {
    inner: ContentSnapshots,
    captured: RefCell<Vec<Fingerprint>>,
    restores: Cell<usize>,
}

impl RecordingSnapshots {
    pub fn new(inner: ContentSnapshots) -> Self {
        Self {
            inner,
            captured: RefCell::new(Vec::new()),
            restores: Cell::new(0),
        }
    }

    pub fn captures(&self) -> usize {
        self.captured.borrow().len()
    }

    /// Workspace fingerprint at the most recent capture.
    pub fn last_captured(&self) -> Option<Fingerprint> {
        self.captured.borrow().last().cloned()
    }

    pub fn restores(&self) -> usize {
        self.restores.get()
    }
}

impl SnapshotManager for RecordingSnapshots {
    fn capture(&self, label: &str) -> Result<Snapshot> {
        self.captured.borrow_mut().push(self.inner.fingerprint()?);
        self.inner.capture(label)
    }

    fn restore(&self, snapshot: &Snapshot) -> Result<()> {
        self.restores.set(self.restores.get() + 1);
        self.inner.restore(snapshot)
    }

    fn discard(&self, snapshot: &Snapshot) -> Result<()> {
        self.inner.discard(snapshot)
    }

    fn fingerprint(&self) -> Result<Fingerprint> {
        self.inner.fingerprint()
    }
}
