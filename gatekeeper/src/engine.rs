//! Gate engine: walks the fixed gate table for one ticket.
//!
//! Each gate is skipped when its artifact already carries a satisfying
//! status; otherwise its worker is dispatched and the postcondition checked.
//! The implementation gate hands each pending task to [`crate::refine`].
//! Review is the only gate that can send the walk backwards.

use std::fmt::Write as _;
use std::path::Path;

use anyhow::{Result, anyhow};
use tracing::{debug, info, instrument, warn};

use crate::core::attribution::{ChangeLedger, PathClassifier};
use crate::core::gates::{ArtifactStatuses, GATES, Gate, GateWorker, gate};
use crate::core::review::{ReviewPlan, plan_review, resolve_review};
use crate::core::status_graph::validate_transition;
use crate::core::tasks::{TaskList, checklist_line};
use crate::core::types::{
    ArtifactKind, ArtifactRef, ArtifactStatus, Checkpoint, CheckpointDecision, Finding, GateName,
    StatusSignal, WorkerRole,
};
use crate::error::{LoopScope, OrchestratorError};
use crate::io::artifact_store::ArtifactStore;
use crate::io::config::GatekeeperConfig;
use crate::io::decisions::DecisionPrompt;
use crate::io::dispatch::{TaskBrief, WorkerBackend, WorkerRequest, WorkerResult, dispatch};
use crate::io::instructions::{GateInstructions, InstructionRenderer};
use crate::io::journal::JournalEntry;
use crate::io::paths::TicketPaths;
use crate::io::snapshot::SnapshotManager;
use crate::io::task_store::{load_tasks, write_tasks};
use crate::io::ticket_state::{TicketState, write_ticket_state};
use crate::io::verify::{CheckRunner, VerificationReport, run_verification};
use crate::refine::refine_task;

/// External seams the engine drives.
#[derive(Clone, Copy)]
pub struct Collaborators<'a> {
    pub workers: &'a dyn WorkerBackend,
    pub checks: &'a dyn CheckRunner,
    pub snapshots: &'a dyn SnapshotManager,
    pub decisions: &'a dyn DecisionPrompt,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GateAction {
    /// Artifact already satisfied the gate.
    Skipped,
    Executed,
    /// Review ran and sent the walk back to implementation.
    Reopened,
}

/// One step of the gate walk, in visit order.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GateVisit {
    pub gate: GateName,
    pub action: GateAction,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum GateFlow {
    Advance,
    BackToImplementation,
}

/// Mutable state for one ticket invocation.
pub struct GateSession<'a> {
    pub(crate) root: &'a Path,
    pub(crate) config: &'a GatekeeperConfig,
    pub(crate) collab: Collaborators<'a>,
    pub(crate) paths: TicketPaths,
    pub(crate) store: ArtifactStore,
    pub(crate) state: TicketState,
    renderer: InstructionRenderer,
    classifier: PathClassifier,
    trace: Vec<GateVisit>,
}

impl<'a> GateSession<'a> {
    pub fn new(
        root: &'a Path,
        config: &'a GatekeeperConfig,
        collab: Collaborators<'a>,
        paths: TicketPaths,
        state: TicketState,
    ) -> Result<Self> {
        Ok(Self {
            root,
            config,
            collab,
            store: ArtifactStore::new(paths.clone()),
            paths,
            state,
            renderer: InstructionRenderer::new()?,
            classifier: config.verification.classifier()?,
            trace: Vec::new(),
        })
    }

    pub fn into_parts(self) -> (TicketState, Vec<GateVisit>) {
        (self.state, self.trace)
    }

    pub(crate) fn save_state(&self) -> Result<()> {
        write_ticket_state(&self.paths.state_path, &self.state)
    }

    pub(crate) fn renderer(&self) -> &InstructionRenderer {
        &self.renderer
    }

    /// Walk the gates starting at `from` until every gate is satisfied.
    #[instrument(skip_all, fields(ticket = %self.state.ticket_id, from = %from))]
    pub fn run_gates(&mut self, from: GateName) -> Result<()> {
        let mut current = from;
        loop {
            self.state.current_gate = current;
            self.save_state()?;

            let gate = gate(current);
            let statuses = self.store.statuses()?;
            if gate.is_satisfied(&statuses) {
                debug!(gate = %current, "gate already satisfied");
                self.trace.push(GateVisit {
                    gate: current,
                    action: GateAction::Skipped,
                });
            } else {
                info!(gate = %current, "running gate");
                let flow = self.execute(gate, &statuses)?;
                self.state
                    .artifacts
                    .insert(gate.artifact, self.store.reference(gate.artifact).locator);
                if flow == GateFlow::BackToImplementation {
                    self.trace.push(GateVisit {
                        gate: current,
                        action: GateAction::Reopened,
                    });
                    current = GateName::Implementation;
                    continue;
                }
                self.trace.push(GateVisit {
                    gate: current,
                    action: GateAction::Executed,
                });
                self.checkpoint(current)?;
            }

            match current.next() {
                Some(next) => current = next,
                None => {
                    self.ensure_all_satisfied()?;
                    self.save_state()?;
                    return Ok(());
                }
            }
        }
    }

    /// A start gate past unsatisfied gates cannot finish the ticket; the
    /// first such gate becomes the current one.
    fn ensure_all_satisfied(&mut self) -> Result<()> {
        let statuses = self.store.statuses()?;
        let Some(pending) = GATES.iter().find(|gate| !gate.is_satisfied(&statuses)) else {
            return Ok(());
        };
        warn!(gate = %pending.name, "earlier gate not satisfied");
        self.state.current_gate = pending.name;
        self.save_state()?;
        Err(blocked(
            pending.name,
            format!(
                "gate was never satisfied; run again from {} to complete the ticket",
                pending.name
            ),
        )
        .into())
    }

    fn execute(&mut self, gate: &Gate, statuses: &ArtifactStatuses) -> Result<GateFlow> {
        match (gate.name, gate.worker) {
            (_, GateWorker::Refinement) => {
                self.run_implementation()?;
                Ok(GateFlow::Advance)
            }
            (GateName::Review, GateWorker::Single(role)) => self.run_review(gate, role, statuses),
            (_, GateWorker::Single(role)) => {
                self.run_document_gate(gate, role, statuses)?;
                Ok(GateFlow::Advance)
            }
        }
    }

    fn gate_inputs(&self, gate: &Gate, statuses: &ArtifactStatuses) -> Vec<ArtifactRef> {
        gate.input_artifacts(statuses)
            .into_iter()
            .map(|kind| self.store.reference(kind))
            .collect()
    }

    fn dispatch_gate_worker(
        &mut self,
        gate: &Gate,
        role: WorkerRole,
        statuses: &ArtifactStatuses,
    ) -> Result<WorkerResult> {
        let target = self.store.reference(gate.artifact);
        let inputs = self.gate_inputs(gate, statuses);
        let instructions = self.renderer.render_gate(&GateInstructions {
            ticket: &self.state.ticket_id,
            gate,
            role,
            target: &target,
            inputs: &inputs,
        })?;
        self.dispatch_worker(gate.name, role, None, Some(target), inputs, instructions)
    }

    /// Dispatch one worker with a journal entry around the call.
    pub(crate) fn dispatch_worker(
        &mut self,
        gate: GateName,
        role: WorkerRole,
        task: Option<TaskBrief>,
        target: Option<ArtifactRef>,
        inputs: Vec<ArtifactRef>,
        instructions: String,
    ) -> Result<WorkerResult> {
        let seq = self.state.next_seq();
        self.save_state()?;
        let entry = JournalEntry::new(&self.paths, seq, gate, role.as_str());
        let request = WorkerRequest {
            ticket_id: self.state.ticket_id.clone(),
            gate,
            worker: role,
            task,
            input_artifacts: inputs,
            target_artifact: target,
            instructions,
        };
        entry.write_request(&request)?;
        let invocation = entry.invocation(
            self.root,
            self.config.worker_timeout(),
            self.config.output_limit_bytes,
        );
        let result = dispatch(self.collab.workers, &request, &invocation)?;
        entry.write_result(&result)?;
        Ok(result)
    }

    /// Run the configured verification sequence and journal it.
    pub(crate) fn verify(&mut self, ledger: &ChangeLedger) -> Result<VerificationReport> {
        let seq = self.state.next_seq();
        self.save_state()?;
        let report = run_verification(
            self.collab.checks,
            &self.config.verification.command_sequence(),
            self.root,
            ledger,
            &self.classifier,
        )?;
        JournalEntry::new(&self.paths, seq, GateName::Implementation, "verify")
            .write_verification(&report)?;
        Ok(report)
    }

    fn run_document_gate(
        &mut self,
        gate: &Gate,
        role: WorkerRole,
        statuses: &ArtifactStatuses,
    ) -> Result<()> {
        let before = statuses
            .get(&gate.artifact)
            .copied()
            .unwrap_or(ArtifactStatus::Draft);
        let result = self.dispatch_gate_worker(gate, role, statuses)?;
        if result.status_signal == StatusSignal::Blocked {
            return Err(blocked(gate.name, blocked_reason(&result)).into());
        }
        if gate.name == GateName::TaskList {
            self.record_breakdown(&result)?;
        }
        let written = self.store.read(gate.artifact)?;
        if let Some(artifact) = &written
            && artifact.markers > 1
        {
            return Err(blocked(
                gate.name,
                format!(
                    "{} artifact has {} status markers, expected one",
                    gate.artifact, artifact.markers
                ),
            )
            .into());
        }
        let after = written.map(|artifact| artifact.effective_status());
        let status = gate
            .check_postcondition(before, after)
            .map_err(|reason| blocked(gate.name, reason))?;
        debug!(gate = %gate.name, %status, "postcondition satisfied");
        Ok(())
    }

    /// Persist the breakdown as `T1..Tn`, keeping any review-fix tasks.
    fn record_breakdown(&mut self, result: &WorkerResult) -> Result<()> {
        if result.tasks.is_empty() {
            return Err(blocked(GateName::TaskList, "task breakdown returned no tasks").into());
        }
        let existing = load_tasks(&self.paths.tasks_path)?;
        let mut list = TaskList::from_breakdown(&result.tasks);
        list.tasks.extend(existing.review_fixes().cloned());
        write_tasks(&self.paths.tasks_path, &list)
            .map_err(|err| blocked(GateName::TaskList, format!("{err:#}")))?;
        info!(tasks = list.tasks.len(), "task list recorded");

        if !self.store.exists(ArtifactKind::TaskList) {
            self.store
                .write(ArtifactKind::TaskList, &render_checklist(&list), ArtifactStatus::Ready)?;
        }
        Ok(())
    }

    fn run_implementation(&mut self) -> Result<()> {
        let gate_name = GateName::Implementation;
        let mut tasks = load_tasks(&self.paths.tasks_path)?;
        if tasks.tasks.is_empty() {
            return Err(blocked(gate_name, "task list has no tasks").into());
        }
        match self.store.status(ArtifactKind::TaskList)? {
            None => return Err(blocked(gate_name, "task list artifact is missing").into()),
            Some(ArtifactStatus::Blocked | ArtifactStatus::NeedsFixes) => {
                self.store
                    .set_status(ArtifactKind::TaskList, ArtifactStatus::Ready)?;
            }
            Some(ArtifactStatus::Ready) => {}
            Some(other) => {
                return Err(blocked(
                    gate_name,
                    format!("task list status '{other}' cannot start implementation"),
                )
                .into());
            }
        }

        while let Some(task) = tasks.next_pending().cloned() {
            if let Err(err) = refine_task(self, &mut tasks, &task) {
                let parked = match err.downcast_ref::<OrchestratorError>() {
                    Some(OrchestratorError::StuckLoop { .. }) => Some(ArtifactStatus::Blocked),
                    Some(OrchestratorError::LoopExhausted { .. }) => {
                        Some(ArtifactStatus::NeedsFixes)
                    }
                    _ => None,
                };
                if let Some(status) = parked {
                    self.store.set_status(ArtifactKind::TaskList, status)?;
                }
                return Err(err);
            }
        }

        self.store
            .set_status(ArtifactKind::TaskList, ArtifactStatus::Complete)?;
        info!(done = tasks.done_count(), "implementation complete");
        Ok(())
    }

    fn run_review(
        &mut self,
        gate: &Gate,
        role: WorkerRole,
        statuses: &ArtifactStatuses,
    ) -> Result<GateFlow> {
        let before = statuses
            .get(&gate.artifact)
            .copied()
            .unwrap_or(ArtifactStatus::Draft);
        let result = self.dispatch_gate_worker(gate, role, statuses)?;
        let plan = match plan_review(result.status_signal, &result.findings) {
            Some(plan) => plan,
            None => {
                let resolution = self.collab.decisions.review(&result.findings)?;
                info!(?resolution, "review decision");
                resolve_review(resolution, &result.findings)
            }
        };

        match plan {
            ReviewPlan::Accept => {
                self.record_findings(before, ArtifactStatus::Ready, &result.findings)?;
                Ok(GateFlow::Advance)
            }
            ReviewPlan::Blocked(reason) => Err(blocked(gate.name, reason).into()),
            ReviewPlan::Fix(selected) => {
                let findings_status = match result.status_signal {
                    StatusSignal::Blocked => ArtifactStatus::Blocked,
                    _ => ArtifactStatus::NeedsFixes,
                };
                self.record_findings(before, findings_status, &result.findings)?;
                if self.state.review_cycles >= self.config.review_max_cycles {
                    warn!(cycles = self.state.review_cycles, "review loop exhausted");
                    return Err(OrchestratorError::LoopExhausted {
                        gate: gate.name,
                        scope: LoopScope::Review,
                        iteration: self.state.review_cycles,
                        failures: Vec::new(),
                        rolled_back: false,
                    }
                    .into());
                }
                self.reopen_implementation(&selected)?;
                Ok(GateFlow::BackToImplementation)
            }
        }
    }

    /// Append one fix task per finding and reopen the task list.
    fn reopen_implementation(&mut self, findings: &[Finding]) -> Result<()> {
        if !self.store.exists(ArtifactKind::TaskList) {
            return Err(blocked(GateName::Review, "task list artifact is missing").into());
        }
        self.state.review_cycles += 1;
        self.save_state()?;

        let mut tasks = load_tasks(&self.paths.tasks_path)?;
        let added = tasks.append_review_fixes(findings);
        write_tasks(&self.paths.tasks_path, &tasks)?;
        let lines: Vec<String> = added
            .iter()
            .filter_map(|id| tasks.get(*id))
            .map(checklist_line)
            .collect();
        self.store.append_lines(ArtifactKind::TaskList, &lines)?;
        if self.store.status(ArtifactKind::TaskList)? != Some(ArtifactStatus::Ready) {
            self.store
                .set_status(ArtifactKind::TaskList, ArtifactStatus::Ready)?;
        }
        info!(
            cycle = self.state.review_cycles,
            added = added.len(),
            "review reopened implementation"
        );
        Ok(())
    }

    fn record_findings(
        &self,
        before: ArtifactStatus,
        status: ArtifactStatus,
        findings: &[Finding],
    ) -> Result<()> {
        validate_transition(ArtifactKind::ReviewFindings, before, status)
            .map_err(|reason| blocked(GateName::Review, reason))?;
        self.store.write(
            ArtifactKind::ReviewFindings,
            &render_findings(self.state.review_cycles, findings),
            status,
        )
    }

    /// Inputs for code and test workers: earlier artifacts plus the task list.
    pub(crate) fn refinement_inputs(&self) -> Result<Vec<ArtifactRef>> {
        let statuses = self.store.statuses()?;
        if !statuses.contains_key(&ArtifactKind::TaskList) {
            return Err(anyhow!("task list artifact disappeared during implementation"));
        }
        let mut inputs = self.gate_inputs(gate(GateName::Implementation), &statuses);
        inputs.push(self.store.reference(ArtifactKind::TaskList));
        Ok(inputs)
    }

    fn checkpoint(&self, gate: GateName) -> Result<()> {
        if !self.config.checkpoint_after(gate) {
            return Ok(());
        }
        let Some(checkpoint) = Checkpoint::after(gate) else {
            return Ok(());
        };
        loop {
            match self.collab.decisions.checkpoint(checkpoint)? {
                CheckpointDecision::Continue => return Ok(()),
                CheckpointDecision::Pause => info!(%checkpoint, "paused at checkpoint"),
            }
        }
    }
}

fn blocked(gate: GateName, reason: impl Into<String>) -> OrchestratorError {
    OrchestratorError::GateBlocked {
        gate,
        reason: reason.into(),
    }
}

fn blocked_reason(result: &WorkerResult) -> String {
    let diagnostics = result.diagnostics.trim();
    if diagnostics.is_empty() {
        "worker signalled blocked".to_string()
    } else {
        format!("worker signalled blocked: {diagnostics}")
    }
}

fn render_checklist(list: &TaskList) -> String {
    let mut buf = String::new();
    let _ = writeln!(buf, "# Tasks\n");
    for task in &list.tasks {
        let _ = writeln!(buf, "{}", checklist_line(task));
    }
    buf
}

fn render_findings(cycle: u32, findings: &[Finding]) -> String {
    let mut buf = String::new();
    let _ = writeln!(buf, "# Review findings\n");
    let _ = writeln!(buf, "Review cycles so far: {cycle}\n");
    if findings.is_empty() {
        let _ = writeln!(buf, "No findings.");
    }
    for finding in findings {
        let _ = writeln!(buf, "- [{}] {}", finding.severity, finding.summary);
    }
    buf
}
