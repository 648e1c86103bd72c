//! Persisted ticket bookkeeping (`.gatekeeper/tickets/<id>/state.json`).

use std::collections::BTreeMap;
use std::fs;
use std::path::Path;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::core::types::{ArtifactKind, GateName, TicketId};
use crate::io::paths::write_atomic;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TicketStatus {
    Active,
    Blocked,
    Complete,
}

/// Ticket state. Created on first run, never deleted; archived once every
/// gate is satisfied.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TicketState {
    pub ticket_id: TicketId,
    pub current_gate: GateName,
    pub status: TicketStatus,
    pub archived: bool,
    /// Locators of artifacts produced so far.
    pub artifacts: BTreeMap<ArtifactKind, String>,
    /// Review → implementation cycles taken.
    pub review_cycles: u32,
    /// Refinement attempts spent per task id.
    pub task_attempts: BTreeMap<String, u32>,
    /// Last escalation message shown to the user.
    pub last_escalation: Option<String>,
    /// Last journal sequence number used.
    pub dispatch_seq: u32,
}

impl TicketState {
    pub fn new(ticket_id: TicketId) -> Self {
        Self {
            ticket_id,
            current_gate: GateName::Requirements,
            status: TicketStatus::Active,
            archived: false,
            artifacts: BTreeMap::new(),
            review_cycles: 0,
            task_attempts: BTreeMap::new(),
            last_escalation: None,
            dispatch_seq: 0,
        }
    }

    pub fn attempts_for(&self, task: &str) -> u32 {
        self.task_attempts.get(task).copied().unwrap_or(0)
    }

    /// Allocate the next journal sequence number.
    pub fn next_seq(&mut self) -> u32 {
        self.dispatch_seq += 1;
        self.dispatch_seq
    }

    /// Clear refinement and review counters (`--reset-loops`).
    pub fn reset_loops(&mut self) {
        self.review_cycles = 0;
        self.task_attempts.clear();
    }
}

pub fn load_ticket_state(path: &Path) -> Result<TicketState> {
    debug!(path = %path.display(), "loading ticket state");
    let contents = fs::read_to_string(path)
        .with_context(|| format!("read ticket state {}", path.display()))?;
    let state: TicketState = serde_json::from_str(&contents)
        .with_context(|| format!("parse ticket state {}", path.display()))?;
    debug!(ticket = %state.ticket_id, gate = %state.current_gate, "ticket state loaded");
    Ok(state)
}

/// Load the ticket state, or start a fresh one if none exists yet.
pub fn load_or_create(path: &Path, ticket_id: &TicketId) -> Result<TicketState> {
    if path.exists() {
        load_ticket_state(path)
    } else {
        Ok(TicketState::new(ticket_id.clone()))
    }
}

/// Atomically write ticket state to disk (temp file + rename).
pub fn write_ticket_state(path: &Path, state: &TicketState) -> Result<()> {
    debug!(path = %path.display(), gate = %state.current_gate, "writing ticket state");
    let mut buf = serde_json::to_string_pretty(state)?;
    buf.push('\n');
    write_atomic(path, buf.as_bytes())
}
