//! Shared deterministic types for the gate pipeline.
//!
//! These types are the stable vocabulary between core logic, the persisted
//! state files and the worker contract. They never touch the filesystem.

use std::fmt;
use std::str::FromStr;
use std::sync::LazyLock;

use regex::Regex;
use serde::{Deserialize, Serialize};

static TICKET_ID: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^[A-Za-z][A-Za-z0-9]*-[0-9]+$").expect("ticket id pattern should compile")
});

/// Validated ticket identifier (`PROJ-123`).
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TicketId(String);

/// Returned when a ticket identifier does not match `<letters/digits>-<number>`.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("malformed ticket id '{0}' (expected something like PROJ-123)")]
pub struct InvalidTicketId(pub String);

impl TicketId {
    pub fn parse(raw: &str) -> Result<Self, InvalidTicketId> {
        let trimmed = raw.trim();
        if !TICKET_ID.is_match(trimmed) {
            return Err(InvalidTicketId(raw.to_string()));
        }
        Ok(Self(trimmed.to_string()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for TicketId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Pipeline stages in their fixed total order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GateName {
    Requirements,
    Research,
    Plan,
    TaskList,
    Implementation,
    Review,
    Qa,
    Docs,
    Validate,
}

impl GateName {
    pub const ALL: [GateName; 9] = [
        GateName::Requirements,
        GateName::Research,
        GateName::Plan,
        GateName::TaskList,
        GateName::Implementation,
        GateName::Review,
        GateName::Qa,
        GateName::Docs,
        GateName::Validate,
    ];

    pub fn index(self) -> usize {
        self as usize
    }

    pub fn next(self) -> Option<GateName> {
        Self::ALL.get(self.index() + 1).copied()
    }

    pub fn as_str(self) -> &'static str {
        match self {
            GateName::Requirements => "requirements",
            GateName::Research => "research",
            GateName::Plan => "plan",
            GateName::TaskList => "task_list",
            GateName::Implementation => "implementation",
            GateName::Review => "review",
            GateName::Qa => "qa",
            GateName::Docs => "docs",
            GateName::Validate => "validate",
        }
    }
}

impl fmt::Display for GateName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for GateName {
    type Err = String;

    fn from_str(raw: &str) -> Result<Self, Self::Err> {
        let wanted = normalize_label(raw);
        GateName::ALL
            .iter()
            .copied()
            .find(|gate| normalize_label(gate.as_str()) == wanted)
            .ok_or_else(|| {
                let names: Vec<&str> = GateName::ALL.iter().map(|g| g.as_str()).collect();
                format!("unknown gate '{raw}' (expected one of: {})", names.join(", "))
            })
    }
}

/// Document kinds a ticket accumulates.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ArtifactKind {
    Requirements,
    ResearchNotes,
    Plan,
    TaskList,
    ReviewFindings,
    QaReport,
    Summary,
}

impl ArtifactKind {
    pub const ALL: [ArtifactKind; 7] = [
        ArtifactKind::Requirements,
        ArtifactKind::ResearchNotes,
        ArtifactKind::Plan,
        ArtifactKind::TaskList,
        ArtifactKind::ReviewFindings,
        ArtifactKind::QaReport,
        ArtifactKind::Summary,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            ArtifactKind::Requirements => "requirements",
            ArtifactKind::ResearchNotes => "research_notes",
            ArtifactKind::Plan => "plan",
            ArtifactKind::TaskList => "task_list",
            ArtifactKind::ReviewFindings => "review_findings",
            ArtifactKind::QaReport => "qa_report",
            ArtifactKind::Summary => "summary",
        }
    }

    pub fn file_name(self) -> String {
        format!("{}.md", self.as_str())
    }
}

impl fmt::Display for ArtifactKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Artifact status values. Which ones are meaningful depends on the kind
/// (see [`crate::core::status_graph`]).
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ArtifactStatus {
    Draft,
    Approved,
    Ready,
    Blocked,
    NeedsFixes,
    Complete,
}

impl ArtifactStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            ArtifactStatus::Draft => "draft",
            ArtifactStatus::Approved => "approved",
            ArtifactStatus::Ready => "ready",
            ArtifactStatus::Blocked => "blocked",
            ArtifactStatus::NeedsFixes => "needs_fixes",
            ArtifactStatus::Complete => "complete",
        }
    }

    /// Lenient parse of a marker value (`Needs Fixes`, `needs-fixes`, `NEEDS_FIXES`).
    pub fn parse_marker(raw: &str) -> Option<Self> {
        match normalize_label(raw).as_str() {
            "draft" => Some(ArtifactStatus::Draft),
            "approved" => Some(ArtifactStatus::Approved),
            "ready" => Some(ArtifactStatus::Ready),
            "blocked" => Some(ArtifactStatus::Blocked),
            "needsfixes" => Some(ArtifactStatus::NeedsFixes),
            "complete" | "completed" => Some(ArtifactStatus::Complete),
            _ => None,
        }
    }
}

impl fmt::Display for ArtifactStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Reference to an artifact handed to or returned by a worker.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ArtifactRef {
    pub kind: ArtifactKind,
    pub locator: String,
}

/// Worker-declared outcome of a dispatch.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StatusSignal {
    Ready,
    Blocked,
    NeedsFixes,
    Draft,
}

impl StatusSignal {
    pub fn as_str(self) -> &'static str {
        match self {
            StatusSignal::Ready => "ready",
            StatusSignal::Blocked => "blocked",
            StatusSignal::NeedsFixes => "needs_fixes",
            StatusSignal::Draft => "draft",
        }
    }
}

impl fmt::Display for StatusSignal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Identity of an external worker.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WorkerRole {
    Requirements,
    Research,
    Planner,
    TaskBreakdown,
    Code,
    Test,
    Reviewer,
    Qa,
    Docs,
    Validator,
}

impl WorkerRole {
    pub const ALL: [WorkerRole; 10] = [
        WorkerRole::Requirements,
        WorkerRole::Research,
        WorkerRole::Planner,
        WorkerRole::TaskBreakdown,
        WorkerRole::Code,
        WorkerRole::Test,
        WorkerRole::Reviewer,
        WorkerRole::Qa,
        WorkerRole::Docs,
        WorkerRole::Validator,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            WorkerRole::Requirements => "requirements",
            WorkerRole::Research => "research",
            WorkerRole::Planner => "planner",
            WorkerRole::TaskBreakdown => "task_breakdown",
            WorkerRole::Code => "code",
            WorkerRole::Test => "test",
            WorkerRole::Reviewer => "reviewer",
            WorkerRole::Qa => "qa",
            WorkerRole::Docs => "docs",
            WorkerRole::Validator => "validator",
        }
    }
}

impl fmt::Display for WorkerRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for WorkerRole {
    type Err = String;

    fn from_str(raw: &str) -> Result<Self, Self::Err> {
        let wanted = normalize_label(raw);
        WorkerRole::ALL
            .iter()
            .copied()
            .find(|role| normalize_label(role.as_str()) == wanted)
            .ok_or_else(|| format!("unknown worker role '{raw}'"))
    }
}

/// Which producing worker a verification failure is blamed on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Locus {
    Code,
    Test,
}

impl Locus {
    pub fn role(self) -> WorkerRole {
        match self {
            Locus::Code => WorkerRole::Code,
            Locus::Test => WorkerRole::Test,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Locus::Code => "code",
            Locus::Test => "test",
        }
    }
}

impl fmt::Display for Locus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Verification command category.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CheckCategory {
    Format,
    Lint,
    Test,
    StrictLint,
}

impl CheckCategory {
    pub fn as_str(self) -> &'static str {
        match self {
            CheckCategory::Format => "format",
            CheckCategory::Lint => "lint",
            CheckCategory::Test => "test",
            CheckCategory::StrictLint => "strict_lint",
        }
    }
}

impl fmt::Display for CheckCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Review finding severity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Severity {
    Blocking,
    Important,
    Cosmetic,
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Severity::Blocking => "blocking",
            Severity::Important => "important",
            Severity::Cosmetic => "cosmetic",
        })
    }
}

/// A single review finding as reported by the review worker.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Finding {
    pub severity: Severity,
    pub summary: String,
}

/// External answer to non-blocking review findings.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReviewResolution {
    FixAll,
    FixImportant,
    Skip,
}

/// Advisory pause points.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Checkpoint {
    AfterRequirements,
    AfterPlan,
    AfterImplementation,
}

impl Checkpoint {
    /// The checkpoint that follows `gate`, if any.
    pub fn after(gate: GateName) -> Option<Checkpoint> {
        match gate {
            GateName::Requirements => Some(Checkpoint::AfterRequirements),
            GateName::Plan => Some(Checkpoint::AfterPlan),
            GateName::Implementation => Some(Checkpoint::AfterImplementation),
            _ => None,
        }
    }

    pub fn gate(self) -> GateName {
        match self {
            Checkpoint::AfterRequirements => GateName::Requirements,
            Checkpoint::AfterPlan => GateName::Plan,
            Checkpoint::AfterImplementation => GateName::Implementation,
        }
    }
}

impl fmt::Display for Checkpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "after {}", self.gate())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CheckpointDecision {
    Continue,
    Pause,
}

/// Lowercase and drop `_`, `-` and spaces so labels compare loosely.
pub(crate) fn normalize_label(raw: &str) -> String {
    raw.trim()
        .chars()
        .filter(|c| !matches!(c, '_' | '-' | ' '))
        .map(|c| c.to_ascii_lowercase())
        .collect()
}
