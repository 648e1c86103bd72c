//! Canonical paths under `.gatekeeper/` and workspace initialization.

use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result, anyhow};

use crate::core::types::{ArtifactKind, GateName, TicketId};
use crate::io::config::{GatekeeperConfig, write_config};

pub const STATE_DIR_NAME: &str = ".gatekeeper";

const STATE_GITIGNORE: &str = "*\n";

/// Workspace-level paths.
#[derive(Debug, Clone)]
pub struct WorkspacePaths {
    pub root: PathBuf,
    pub state_dir: PathBuf,
    pub gitignore_path: PathBuf,
    pub config_path: PathBuf,
    pub tickets_dir: PathBuf,
    pub snapshots_dir: PathBuf,
}

impl WorkspacePaths {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        let root = root.into();
        let state_dir = root.join(STATE_DIR_NAME);
        Self {
            root: root.clone(),
            gitignore_path: state_dir.join(".gitignore"),
            config_path: state_dir.join("config.toml"),
            tickets_dir: state_dir.join("tickets"),
            snapshots_dir: state_dir.join("snapshots"),
            state_dir,
        }
    }

    pub fn ticket(&self, ticket: &TicketId) -> TicketPaths {
        TicketPaths::new(self.tickets_dir.join(ticket.as_str()))
    }
}

/// Per-ticket paths (`.gatekeeper/tickets/<id>/`).
#[derive(Debug, Clone)]
pub struct TicketPaths {
    pub dir: PathBuf,
    pub state_path: PathBuf,
    pub tasks_path: PathBuf,
    pub artifacts_dir: PathBuf,
    pub journal_dir: PathBuf,
}

impl TicketPaths {
    fn new(dir: PathBuf) -> Self {
        Self {
            state_path: dir.join("state.json"),
            tasks_path: dir.join("tasks.json"),
            artifacts_dir: dir.join("artifacts"),
            journal_dir: dir.join("journal"),
            dir,
        }
    }

    pub fn artifact(&self, kind: ArtifactKind) -> PathBuf {
        self.artifacts_dir.join(kind.file_name())
    }

    /// Journal entry directory for one dispatch or verification round.
    pub fn journal_entry(&self, seq: u32, gate: GateName, label: &str) -> PathBuf {
        self.journal_dir.join(format!("{seq:04}-{gate}-{label}"))
    }
}

/// Create `.gatekeeper/` scaffolding with a default config.
///
/// Existing state is left alone; `force` only rewrites the config and
/// `.gitignore`.
pub fn init_workspace(root: &Path, force: bool) -> Result<WorkspacePaths> {
    let paths = WorkspacePaths::new(root);
    if paths.state_dir.exists() && !paths.state_dir.is_dir() {
        return Err(anyhow!(
            "gatekeeper init: {} exists but is not a directory",
            paths.state_dir.display()
        ));
    }
    if paths.config_path.exists() && !force {
        return Err(anyhow!(
            "gatekeeper init: {} already exists (use --force to overwrite)",
            paths.config_path.display()
        ));
    }

    create_dir(&paths.tickets_dir)?;
    create_dir(&paths.snapshots_dir)?;
    fs::write(&paths.gitignore_path, STATE_GITIGNORE)
        .with_context(|| format!("write {}", paths.gitignore_path.display()))?;
    write_config(&paths.config_path, &GatekeeperConfig::default())?;
    Ok(paths)
}

/// Make sure the state dir exists and is ignored by version control.
pub fn ensure_state_dir(paths: &WorkspacePaths) -> Result<()> {
    create_dir(&paths.state_dir)?;
    if !paths.gitignore_path.exists() {
        fs::write(&paths.gitignore_path, STATE_GITIGNORE)
            .with_context(|| format!("write {}", paths.gitignore_path.display()))?;
    }
    Ok(())
}

pub(crate) fn create_dir(path: &Path) -> Result<()> {
    fs::create_dir_all(path).with_context(|| format!("create directory {}", path.display()))
}

/// Write via a sibling temp file and rename.
pub(crate) fn write_atomic(path: &Path, contents: &[u8]) -> Result<()> {
    let parent = path
        .parent()
        .with_context(|| format!("path missing parent {}", path.display()))?;
    create_dir(parent)?;
    let mut tmp_name = path
        .file_name()
        .with_context(|| format!("path missing file name {}", path.display()))?
        .to_os_string();
    tmp_name.push(".tmp");
    let tmp_path = parent.join(tmp_name);
    fs::write(&tmp_path, contents)
        .with_context(|| format!("write temp file {}", tmp_path.display()))?;
    fs::rename(&tmp_path, path).with_context(|| format!("replace {}", path.display()))?;
    Ok(())
}
