//! Worker dispatch over a fixed JSON contract.
//!
//! The [`WorkerBackend`] trait decouples gate orchestration from how workers
//! actually run. [`CommandWorkerBackend`] spawns the configured command per
//! role; tests use scripted backends that write results directly.

use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result, anyhow};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{debug, info, instrument, warn};

use crate::core::tasks::TaskSpec;
use crate::core::types::{ArtifactRef, Finding, GateName, StatusSignal, TicketId, WorkerRole};
use crate::error::OrchestratorError;
use crate::io::config::GatekeeperConfig;
use crate::io::process::{command_from_argv, run_command_with_timeout};
use crate::io::schema::{WORKER_RESULT_SCHEMA, validate_schema};

/// Task context handed to code/test workers.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TaskBrief {
    pub id: String,
    pub description: String,
    pub acceptance: Vec<String>,
    /// 1-indexed refinement attempt.
    pub attempt: u32,
}

/// Input bundle written to the worker's stdin as JSON.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WorkerRequest {
    pub ticket_id: TicketId,
    pub gate: GateName,
    pub worker: WorkerRole,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub task: Option<TaskBrief>,
    pub input_artifacts: Vec<ArtifactRef>,
    /// Where the gate's artifact must be written, for document gates.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub target_artifact: Option<ArtifactRef>,
    pub instructions: String,
}

/// Structured worker result (validated against `worker_result.schema.json`).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WorkerResult {
    pub produced_artifacts: Vec<ArtifactRef>,
    pub status_signal: StatusSignal,
    pub diagnostics: String,
    /// Task breakdown output.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tasks: Vec<TaskSpec>,
    /// Review output.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub findings: Vec<Finding>,
}

impl WorkerResult {
    pub fn ready(diagnostics: impl Into<String>) -> Self {
        Self {
            produced_artifacts: Vec::new(),
            status_signal: StatusSignal::Ready,
            diagnostics: diagnostics.into(),
            tasks: Vec::new(),
            findings: Vec::new(),
        }
    }
}

/// Where and how long a single dispatch runs.
#[derive(Debug, Clone)]
pub struct Invocation {
    pub workdir: PathBuf,
    /// The worker must write its JSON result here.
    pub result_path: PathBuf,
    /// Captured stdout/stderr.
    pub log_path: PathBuf,
    pub timeout: Duration,
    pub output_limit_bytes: usize,
}

/// Abstraction over worker execution backends.
pub trait WorkerBackend {
    /// Run the worker. Must leave its result JSON at `invocation.result_path`.
    fn invoke(&self, request: &WorkerRequest, invocation: &Invocation) -> Result<()>;
}

/// Backend that spawns `workers.<role>.command` from config.
pub struct CommandWorkerBackend {
    config: GatekeeperConfig,
}

impl CommandWorkerBackend {
    pub fn new(config: GatekeeperConfig) -> Self {
        Self { config }
    }
}

impl WorkerBackend for CommandWorkerBackend {
    #[instrument(skip_all, fields(worker = %request.worker, gate = %request.gate))]
    fn invoke(&self, request: &WorkerRequest, invocation: &Invocation) -> Result<()> {
        let argv = self
            .config
            .worker_command(request.worker)
            .ok_or_else(|| anyhow!("no command configured for worker '{}'", request.worker))?;
        info!(workdir = %invocation.workdir.display(), "starting worker");

        let mut cmd = command_from_argv(argv)?;
        cmd.current_dir(&invocation.workdir)
            .env("GATEKEEPER_TICKET", request.ticket_id.as_str())
            .env("GATEKEEPER_GATE", request.gate.as_str())
            .env("GATEKEEPER_WORKER", request.worker.as_str())
            .env("GATEKEEPER_RESULT_PATH", &invocation.result_path);

        let payload = serde_json::to_vec_pretty(request).context("serialize worker request")?;
        let output = run_command_with_timeout(
            cmd,
            Some(&payload),
            invocation.timeout,
            invocation.output_limit_bytes,
        )
        .with_context(|| format!("run worker '{}'", request.worker))?;

        write_log(&invocation.log_path, &output.render_log("worker"))?;

        if output.timed_out {
            warn!(timeout_secs = invocation.timeout.as_secs(), "worker timed out");
            return Err(anyhow!("worker timed out after {:?}", invocation.timeout));
        }
        if !output.status.success() {
            warn!(exit_code = ?output.status.code(), "worker failed");
            return Err(anyhow!(
                "worker exited with status {:?}: {}",
                output.status.code(),
                output.tail(5)
            ));
        }
        debug!("worker completed");
        Ok(())
    }
}

/// Invoke a worker and load its validated result.
///
/// Any failure (spawn, exit status, missing or malformed result) is reported
/// as [`OrchestratorError::WorkerUnavailable`]. There is no retry here.
#[instrument(skip_all, fields(worker = %request.worker, gate = %request.gate))]
pub fn dispatch(
    backend: &dyn WorkerBackend,
    request: &WorkerRequest,
    invocation: &Invocation,
) -> Result<WorkerResult> {
    if let Some(parent) = invocation.result_path.parent() {
        fs::create_dir_all(parent)
            .with_context(|| format!("create result dir {}", parent.display()))?;
    }
    // A stale result from an earlier attempt must never be mistaken for this one.
    if invocation.result_path.exists() {
        fs::remove_file(&invocation.result_path).with_context(|| {
            format!("remove stale result {}", invocation.result_path.display())
        })?;
    }

    let unavailable = |reason: String| OrchestratorError::WorkerUnavailable {
        gate: request.gate,
        worker: request.worker,
        reason,
    };

    if let Err(err) = backend.invoke(request, invocation) {
        return Err(unavailable(format!("{err:#}")).into());
    }
    let result = load_result(&invocation.result_path).map_err(|err| unavailable(format!("{err:#}")))?;
    debug!(signal = %result.status_signal, "worker result loaded");
    Ok(result)
}

fn load_result(path: &Path) -> Result<WorkerResult> {
    if !path.exists() {
        return Err(anyhow!("missing worker result {}", path.display()));
    }
    let contents =
        fs::read_to_string(path).with_context(|| format!("read worker result {}", path.display()))?;
    let value: Value = serde_json::from_str(&contents)
        .with_context(|| format!("parse worker result {}", path.display()))?;
    validate_schema(WORKER_RESULT_SCHEMA, &value, "worker result")?;
    let result = serde_json::from_value(value)
        .with_context(|| format!("deserialize worker result {}", path.display()))?;
    Ok(result)
}

fn write_log(path: &Path, contents: &str) -> Result<()> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)
            .with_context(|| format!("create worker log dir {}", parent.display()))?;
    }
    fs::write(path, contents).with_context(|| format!("write worker log {}", path.display()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::io::config::WorkerConfig;

    struct FakeBackend {
        result: Option<String>,
    }

    impl WorkerBackend for FakeBackend {
        fn invoke(&self, _request: &WorkerRequest, invocation: &Invocation) -> Result<()> {
            if let Some(result) = &self.result {
                fs::write(&invocation.result_path, result)?;
            }
            Ok(())
        }
    }

    fn request() -> WorkerRequest {
        WorkerRequest {
            ticket_id: TicketId::parse("PROJ-1").expect("ticket"),
            gate: GateName::Plan,
            worker: WorkerRole::Planner,
            task: None,
            input_artifacts: Vec::new(),
            target_artifact: None,
            instructions: "plan it".to_string(),
        }
    }

    fn invocation(dir: &Path) -> Invocation {
        Invocation {
            workdir: dir.to_path_buf(),
            result_path: dir.join("journal/result.json"),
            log_path: dir.join("journal/worker.log"),
            timeout: Duration::from_secs(10),
            output_limit_bytes: 10_000,
        }
    }

    fn assert_unavailable(err: &anyhow::Error, needle: &str) {
        match err.downcast_ref::<OrchestratorError>() {
            Some(OrchestratorError::WorkerUnavailable { worker, reason, .. }) => {
                assert_eq!(*worker, WorkerRole::Planner);
                assert!(reason.contains(needle), "reason was: {reason}");
            }
            other => panic!("expected WorkerUnavailable, got {other:?}"),
        }
    }

    #[test]
    fn dispatch_reads_valid_result() {
        let temp = tempfile::tempdir().expect("tempdir");
        let backend = FakeBackend {
            result: Some(
                r#"{"produced_artifacts":[{"kind":"plan","locator":"plan.md"}],"status_signal":"ready","diagnostics":"ok"}"#
                    .to_string(),
            ),
        };
        let result = dispatch(&backend, &request(), &invocation(temp.path())).expect("dispatch");
        assert_eq!(result.status_signal, StatusSignal::Ready);
        assert_eq!(result.produced_artifacts.len(), 1);
        assert!(result.tasks.is_empty());
    }

    #[test]
    fn missing_result_is_worker_unavailable() {
        let temp = tempfile::tempdir().expect("tempdir");
        let err = dispatch(&FakeBackend { result: None }, &request(), &invocation(temp.path()))
            .unwrap_err();
        assert_unavailable(&err, "missing worker result");
    }

    #[test]
    fn malformed_result_is_worker_unavailable() {
        let temp = tempfile::tempdir().expect("tempdir");
        let backend = FakeBackend {
            result: Some(r#"{"status_signal":"done"}"#.to_string()),
        };
        let err = dispatch(&backend, &request(), &invocation(temp.path())).unwrap_err();
        assert_unavailable(&err, "schema validation failed");
    }

    #[test]
    fn unconfigured_worker_is_unavailable() {
        let temp = tempfile::tempdir().expect("tempdir");
        let backend = CommandWorkerBackend::new(GatekeeperConfig::default());
        let err = dispatch(&backend, &request(), &invocation(temp.path())).unwrap_err();
        assert_unavailable(&err, "no command configured for worker 'planner'");
    }

    /// A real command worker reads the request from stdin and writes its result
    /// to the path given in the environment.
    #[cfg(unix)]
    #[test]
    fn command_backend_round_trips_through_a_process() {
        let temp = tempfile::tempdir().expect("tempdir");
        let mut config = GatekeeperConfig::default();
        config.workers.insert(
            "planner".to_string(),
            WorkerConfig {
                command: vec![
                    "sh".to_string(),
                    "-c".to_string(),
                    concat!(
                        "cat > request.json; ",
                        "printf '{\"produced_artifacts\":[],\"status_signal\":\"blocked\",\"diagnostics\":\"%s\"}' ",
                        "\"$GATEKEEPER_TICKET\" > \"$GATEKEEPER_RESULT_PATH\""
                    )
                    .to_string(),
                ],
            },
        );
        let backend = CommandWorkerBackend::new(config);
        let result = dispatch(&backend, &request(), &invocation(temp.path())).expect("dispatch");

        assert_eq!(result.status_signal, StatusSignal::Blocked);
        assert_eq!(result.diagnostics, "PROJ-1");
        let echoed = fs::read_to_string(temp.path().join("request.json")).expect("request");
        assert!(echoed.contains("\"instructions\": \"plan it\""));
        assert!(temp.path().join("journal/worker.log").is_file());
    }

    #[cfg(unix)]
    #[test]
    fn failing_command_is_unavailable() {
        let temp = tempfile::tempdir().expect("tempdir");
        let mut config = GatekeeperConfig::default();
        config.workers.insert(
            "planner".to_string(),
            WorkerConfig {
                command: vec!["sh".to_string(), "-c".to_string(), "echo nope >&2; exit 4".to_string()],
            },
        );
        let err = dispatch(
            &CommandWorkerBackend::new(config),
            &request(),
            &invocation(temp.path()),
        )
        .unwrap_err();
        assert_unavailable(&err, "nope");
    }
}
