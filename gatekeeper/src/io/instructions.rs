//! Per-role worker instructions rendered from embedded templates.

use anyhow::{Context, Result};
use minijinja::{Environment, context};

use crate::core::gates::Gate;
use crate::core::signature::FailureRecord;
use crate::core::types::{ArtifactRef, Locus, TicketId, WorkerRole};
use crate::io::dispatch::TaskBrief;

const GATE_TEMPLATE: &str = include_str!("templates/gate.md");
const CODE_TEMPLATE: &str = include_str!("templates/code.md");
const TEST_TEMPLATE: &str = include_str!("templates/test.md");

/// Inputs for a single-worker gate.
pub struct GateInstructions<'a> {
    pub ticket: &'a TicketId,
    pub gate: &'a Gate,
    pub role: WorkerRole,
    pub target: &'a ArtifactRef,
    pub inputs: &'a [ArtifactRef],
}

/// Inputs for one code or test dispatch inside task refinement.
pub struct RefinementInstructions<'a> {
    pub ticket: &'a TicketId,
    pub task: &'a TaskBrief,
    pub inputs: &'a [ArtifactRef],
    /// Failures from the previous attempt, empty on the first one.
    pub failures: &'a [FailureRecord],
}

pub struct InstructionRenderer {
    env: Environment<'static>,
}

impl InstructionRenderer {
    pub fn new() -> Result<Self> {
        let mut env = Environment::new();
        env.add_template("gate", GATE_TEMPLATE)
            .context("register gate template")?;
        env.add_template("code", CODE_TEMPLATE)
            .context("register code template")?;
        env.add_template("test", TEST_TEMPLATE)
            .context("register test template")?;
        Ok(Self { env })
    }

    pub fn render_gate(&self, input: &GateInstructions<'_>) -> Result<String> {
        let template = self.env.get_template("gate")?;
        let satisfied_by: Vec<&str> = input
            .gate
            .satisfied_by
            .iter()
            .map(|status| status.as_str())
            .collect();
        let rendered = template
            .render(context! {
                role => input.role.as_str(),
                ticket => input.ticket.as_str(),
                gate => input.gate.name.as_str(),
                artifact => input.gate.artifact.as_str(),
                target => &input.target.locator,
                satisfied_by => satisfied_by,
                inputs => input.inputs,
            })
            .with_context(|| format!("render {} instructions", input.gate.name))?;
        Ok(rendered)
    }

    pub fn render_refinement(
        &self,
        locus: Locus,
        input: &RefinementInstructions<'_>,
    ) -> Result<String> {
        let template = self.env.get_template(locus.as_str())?;
        let failures: Vec<&FailureRecord> = input
            .failures
            .iter()
            .filter(|failure| failure.locus == locus)
            .collect();
        let rendered = template
            .render(context! {
                ticket => input.ticket.as_str(),
                task => input.task,
                attempt => input.task.attempt,
                inputs => input.inputs,
                failures => failures,
            })
            .with_context(|| format!("render {locus} instructions"))?;
        Ok(rendered)
    }
}
