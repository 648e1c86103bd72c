//! Orchestrator configuration stored under `.gatekeeper/config.toml`.

use std::collections::BTreeMap;
use std::fs;
use std::path::Path;
use std::time::Duration;

use anyhow::{Context, Result, anyhow};
use serde::{Deserialize, Serialize};

use crate::core::attribution::PathClassifier;
use crate::core::types::{CheckCategory, GateName, WorkerRole};
use crate::io::paths::write_atomic;

/// Orchestrator configuration (TOML).
///
/// Edited by humans. Missing fields fall back to the defaults below.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct GatekeeperConfig {
    /// Attempts per task before the refinement loop gives up.
    pub task_max_attempts: u32,

    /// Review → implementation cycles before escalating.
    pub review_max_cycles: u32,

    /// Wall-clock limit for one worker dispatch.
    pub worker_timeout_secs: u64,

    /// Wall-clock limit for one verification command.
    pub verification_timeout_secs: u64,

    /// Truncate captured stdout/stderr beyond this many bytes.
    pub output_limit_bytes: usize,

    pub checkpoints: CheckpointConfig,
    pub verification: VerificationConfig,
    pub snapshot: SnapshotConfig,

    /// Worker commands keyed by role name (`[workers.code]`).
    pub workers: BTreeMap<String, WorkerConfig>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct CheckpointConfig {
    pub enabled: bool,
    /// Gates after which a checkpoint is offered.
    pub points: Vec<GateName>,
}

impl Default for CheckpointConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            points: vec![
                GateName::Requirements,
                GateName::Plan,
                GateName::Implementation,
            ],
        }
    }
}

/// One ordered verification command.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct CheckCommand {
    pub category: CheckCategory,
    pub command: Vec<String>,
}

impl CheckCommand {
    pub fn new(category: CheckCategory, argv: &[&str]) -> Self {
        Self {
            category,
            command: argv.iter().map(|arg| arg.to_string()).collect(),
        }
    }

    pub fn display(&self) -> String {
        self.command.join(" ")
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct VerificationConfig {
    pub commands: Vec<CheckCommand>,
    /// Optional extra lint pass run after the standard commands.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub strict_lint: Option<Vec<String>>,
    /// Regexes over workspace-relative paths that mark test artifacts.
    pub test_path_patterns: Vec<String>,
}

impl Default for VerificationConfig {
    fn default() -> Self {
        Self {
            commands: vec![
                CheckCommand::new(CheckCategory::Format, &["cargo", "fmt", "--check"]),
                CheckCommand::new(CheckCategory::Lint, &["cargo", "clippy", "--all-targets"]),
                CheckCommand::new(CheckCategory::Test, &["cargo", "test"]),
            ],
            strict_lint: None,
            test_path_patterns: vec![
                r"(^|/)tests?/".to_string(),
                r"_test\.[A-Za-z0-9]+$".to_string(),
                r"(^|/)test_[^/]+$".to_string(),
            ],
        }
    }
}

impl VerificationConfig {
    /// Standard commands followed by the strict lint pass, if configured.
    pub fn command_sequence(&self) -> Vec<CheckCommand> {
        let mut sequence = self.commands.clone();
        if let Some(strict) = &self.strict_lint {
            sequence.push(CheckCommand {
                category: CheckCategory::StrictLint,
                command: strict.clone(),
            });
        }
        sequence
    }

    pub fn classifier(&self) -> Result<PathClassifier> {
        PathClassifier::new(&self.test_path_patterns)
            .map_err(|err| anyhow!("invalid verification.test_path_patterns: {err}"))
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct SnapshotConfig {
    /// Top-level names never captured or restored (besides `.gatekeeper` and `.git`).
    pub exclude: Vec<String>,
}

impl Default for SnapshotConfig {
    fn default() -> Self {
        Self {
            exclude: vec!["target".to_string()],
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct WorkerConfig {
    /// Argv; the worker request is written to stdin as JSON.
    pub command: Vec<String>,
}

impl Default for GatekeeperConfig {
    fn default() -> Self {
        Self {
            task_max_attempts: 3,
            review_max_cycles: 3,
            worker_timeout_secs: 60 * 60,
            verification_timeout_secs: 30 * 60,
            output_limit_bytes: 100_000,
            checkpoints: CheckpointConfig::default(),
            verification: VerificationConfig::default(),
            snapshot: SnapshotConfig::default(),
            workers: BTreeMap::new(),
        }
    }
}

impl GatekeeperConfig {
    pub fn validate(&self) -> Result<()> {
        if self.task_max_attempts == 0 {
            return Err(anyhow!("task_max_attempts must be > 0"));
        }
        if self.review_max_cycles == 0 {
            return Err(anyhow!("review_max_cycles must be > 0"));
        }
        if self.worker_timeout_secs == 0 {
            return Err(anyhow!("worker_timeout_secs must be > 0"));
        }
        if self.verification_timeout_secs == 0 {
            return Err(anyhow!("verification_timeout_secs must be > 0"));
        }
        if self.output_limit_bytes == 0 {
            return Err(anyhow!("output_limit_bytes must be > 0"));
        }
        for (idx, check) in self.verification.commands.iter().enumerate() {
            if check.command.first().is_none_or(|arg| arg.trim().is_empty()) {
                return Err(anyhow!(
                    "verification.commands[{idx}].command must be a non-empty array"
                ));
            }
            if check.category == CheckCategory::StrictLint {
                return Err(anyhow!(
                    "verification.commands[{idx}]: use verification.strict_lint for strict_lint"
                ));
            }
        }
        if let Some(strict) = &self.verification.strict_lint
            && strict.first().is_none_or(|arg| arg.trim().is_empty())
        {
            return Err(anyhow!("verification.strict_lint must be a non-empty array"));
        }
        self.verification.classifier()?;
        for (name, worker) in &self.workers {
            name.parse::<WorkerRole>()
                .map_err(|err| anyhow!("workers.{name}: {err}"))?;
            if worker.command.first().is_none_or(|arg| arg.trim().is_empty()) {
                return Err(anyhow!("workers.{name}.command must be a non-empty array"));
            }
        }
        Ok(())
    }

    /// Configured command for `role`, if any.
    pub fn worker_command(&self, role: WorkerRole) -> Option<&[String]> {
        self.workers
            .iter()
            .find(|(name, _)| name.parse::<WorkerRole>() == Ok(role))
            .map(|(_, worker)| worker.command.as_slice())
    }

    pub fn worker_timeout(&self) -> Duration {
        Duration::from_secs(self.worker_timeout_secs)
    }

    pub fn verification_timeout(&self) -> Duration {
        Duration::from_secs(self.verification_timeout_secs)
    }

    pub fn checkpoint_after(&self, gate: GateName) -> bool {
        self.checkpoints.enabled && self.checkpoints.points.contains(&gate)
    }
}

/// Load config from a TOML file.
///
/// If the file is missing, returns `GatekeeperConfig::default()`.
pub fn load_config(path: &Path) -> Result<GatekeeperConfig> {
    if !path.exists() {
        let cfg = GatekeeperConfig::default();
        cfg.validate()?;
        return Ok(cfg);
    }
    let contents = fs::read_to_string(path).with_context(|| format!("read {}", path.display()))?;
    let cfg: GatekeeperConfig =
        toml::from_str(&contents).with_context(|| format!("parse {}", path.display()))?;
    cfg.validate()
        .with_context(|| format!("invalid config {}", path.display()))?;
    Ok(cfg)
}

/// Atomically write config to disk (temp file + rename).
pub fn write_config(path: &Path, cfg: &GatekeeperConfig) -> Result<()> {
    cfg.validate()?;
    let mut buf = toml::to_string_pretty(cfg).context("serialize config toml")?;
    buf.push('\n');
    write_atomic(path, buf.as_bytes())
}
