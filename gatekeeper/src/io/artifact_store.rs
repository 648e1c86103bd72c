//! Durable per-ticket artifact documents with embedded status markers.

use std::fs;
use std::path::PathBuf;

use anyhow::{Context, Result, anyhow};
use tracing::{debug, info, warn};

use crate::core::gates::ArtifactStatuses;
use crate::core::status_graph::{is_reopen, validate_transition};
use crate::core::status_marker::{extract_status, marker_count, set_status};
use crate::core::types::{ArtifactKind, ArtifactRef, ArtifactStatus};
use crate::io::paths::{TicketPaths, write_atomic};

/// An artifact as read from disk.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Artifact {
    pub kind: ArtifactKind,
    pub locator: PathBuf,
    /// Parsed marker value; `None` when missing or unknown.
    pub status: Option<ArtifactStatus>,
    /// Status marker lines found; a well-formed artifact has exactly one.
    pub markers: usize,
    pub content: String,
}

impl Artifact {
    /// Status with the missing/unknown marker fallback applied.
    pub fn effective_status(&self) -> ArtifactStatus {
        self.status.unwrap_or(ArtifactStatus::Draft)
    }
}

/// Artifact storage for one ticket. Single writer per ticket.
#[derive(Debug, Clone)]
pub struct ArtifactStore {
    paths: TicketPaths,
}

impl ArtifactStore {
    pub fn new(paths: TicketPaths) -> Self {
        Self { paths }
    }

    pub fn locator(&self, kind: ArtifactKind) -> PathBuf {
        self.paths.artifact(kind)
    }

    pub fn reference(&self, kind: ArtifactKind) -> ArtifactRef {
        ArtifactRef {
            kind,
            locator: self.locator(kind).display().to_string(),
        }
    }

    pub fn exists(&self, kind: ArtifactKind) -> bool {
        self.locator(kind).is_file()
    }

    /// Read an artifact; `Ok(None)` when it does not exist.
    pub fn read(&self, kind: ArtifactKind) -> Result<Option<Artifact>> {
        let locator = self.locator(kind);
        if !locator.is_file() {
            return Ok(None);
        }
        let content = fs::read_to_string(&locator)
            .with_context(|| format!("read artifact {}", locator.display()))?;
        let status = extract_status(&content);
        let markers = marker_count(&content);
        if markers > 1 {
            warn!(%kind, markers, "artifact has more than one status marker; the first wins");
        }
        debug!(%kind, ?status, "read artifact");
        Ok(Some(Artifact {
            kind,
            locator,
            status,
            markers,
            content,
        }))
    }

    /// Effective status, or `None` when the artifact does not exist.
    pub fn status(&self, kind: ArtifactKind) -> Result<Option<ArtifactStatus>> {
        Ok(self.read(kind)?.map(|artifact| artifact.effective_status()))
    }

    /// Effective statuses of every existing artifact.
    pub fn statuses(&self) -> Result<ArtifactStatuses> {
        let mut statuses = ArtifactStatuses::new();
        for kind in ArtifactKind::ALL {
            if let Some(status) = self.status(kind)? {
                statuses.insert(kind, status);
            }
        }
        Ok(statuses)
    }

    /// Replace an artifact's content, forcing its marker to `status`.
    pub fn write(&self, kind: ArtifactKind, content: &str, status: ArtifactStatus) -> Result<()> {
        let locator = self.locator(kind);
        let body = set_status(content, status);
        debug!(%kind, %status, "write artifact");
        write_atomic(&locator, body.as_bytes())
    }

    /// Move an existing artifact to `status` along its transition graph.
    pub fn set_status(&self, kind: ArtifactKind, status: ArtifactStatus) -> Result<()> {
        let artifact = self
            .read(kind)?
            .ok_or_else(|| anyhow!("cannot set status on missing {kind} artifact"))?;
        let from = artifact.effective_status();
        validate_transition(kind, from, status).map_err(|err| anyhow!(err))?;
        if is_reopen(kind, from, status) {
            info!(%kind, "artifact reopened");
        }
        self.write(kind, &artifact.content, status)
    }

    /// Rewrite an existing artifact's content in place. The marker is
    /// whatever `edit` leaves in the content.
    pub fn edit(&self, kind: ArtifactKind, edit: impl FnOnce(&str) -> String) -> Result<()> {
        let artifact = self
            .read(kind)?
            .ok_or_else(|| anyhow!("cannot edit missing {kind} artifact"))?;
        let content = edit(&artifact.content);
        write_atomic(&artifact.locator, content.as_bytes())
    }

    /// Append lines to an existing artifact, keeping its marker.
    pub fn append_lines(&self, kind: ArtifactKind, lines: &[String]) -> Result<()> {
        self.edit(kind, |existing| {
            let mut content = existing.to_string();
            if !content.is_empty() && !content.ends_with('\n') {
                content.push('\n');
            }
            for line in lines {
                content.push_str(line);
                content.push('\n');
            }
            content
        })
    }
}
