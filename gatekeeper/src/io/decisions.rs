//! Checkpoint and review decisions from a human (or a fixed policy).

use std::cell::RefCell;
use std::io::{BufRead, Write};

use anyhow::{Context, Result, anyhow};

use crate::core::types::{
    Checkpoint, CheckpointDecision, Finding, ReviewResolution, normalize_label,
};

/// Source of the two external decisions the pipeline may need.
pub trait DecisionPrompt {
    /// Blocks until the user answers. `Pause` is answered again later.
    fn checkpoint(&self, checkpoint: Checkpoint) -> Result<CheckpointDecision>;
    /// Resolution for review findings none of which is blocking.
    fn review(&self, findings: &[Finding]) -> Result<ReviewResolution>;
}

/// Non-interactive answers (`--yes`).
#[derive(Debug, Clone, Copy)]
pub struct AutoDecisions {
    pub review: ReviewResolution,
}

impl DecisionPrompt for AutoDecisions {
    fn checkpoint(&self, _checkpoint: Checkpoint) -> Result<CheckpointDecision> {
        Ok(CheckpointDecision::Continue)
    }

    fn review(&self, _findings: &[Finding]) -> Result<ReviewResolution> {
        Ok(self.review)
    }
}

/// Line-oriented prompt; re-asks until the answer parses.
pub struct TerminalPrompt<R, W> {
    input: RefCell<R>,
    output: RefCell<W>,
}

impl<R: BufRead, W: Write> TerminalPrompt<R, W> {
    pub fn new(input: R, output: W) -> Self {
        Self {
            input: RefCell::new(input),
            output: RefCell::new(output),
        }
    }

    fn ask<T>(&self, question: &str, parse: impl Fn(&str) -> Option<T>) -> Result<T> {
        loop {
            {
                let mut out = self.output.borrow_mut();
                write!(out, "{question} ").context("write prompt")?;
                out.flush().context("flush prompt")?;
            }
            let mut line = String::new();
            let read = self
                .input
                .borrow_mut()
                .read_line(&mut line)
                .context("read answer")?;
            if read == 0 {
                return Err(anyhow!("input closed before an answer was given"));
            }
            if let Some(answer) = parse(&line) {
                return Ok(answer);
            }
            writeln!(self.output.borrow_mut(), "unrecognized answer '{}'", line.trim())
                .context("write prompt")?;
        }
    }
}

impl<R: BufRead, W: Write> DecisionPrompt for TerminalPrompt<R, W> {
    fn checkpoint(&self, checkpoint: Checkpoint) -> Result<CheckpointDecision> {
        self.ask(
            &format!("Checkpoint {checkpoint}: continue or pause? [c/p]"),
            parse_checkpoint,
        )
    }

    fn review(&self, findings: &[Finding]) -> Result<ReviewResolution> {
        {
            let mut out = self.output.borrow_mut();
            writeln!(out, "Review reported {} non-blocking finding(s):", findings.len())
                .context("write prompt")?;
            for finding in findings {
                writeln!(out, "  [{}] {}", finding.severity, finding.summary)
                    .context("write prompt")?;
            }
        }
        self.ask(
            "Fix all, fix important only, or skip? [all/important/skip]",
            parse_review,
        )
    }
}

fn parse_checkpoint(raw: &str) -> Option<CheckpointDecision> {
    match normalize_label(raw).as_str() {
        "c" | "continue" | "y" | "yes" => Some(CheckpointDecision::Continue),
        "p" | "pause" | "n" | "no" => Some(CheckpointDecision::Pause),
        _ => None,
    }
}

pub fn parse_review(raw: &str) -> Option<ReviewResolution> {
    match normalize_label(raw).as_str() {
        "all" | "fixall" | "a" => Some(ReviewResolution::FixAll),
        "important" | "fiximportant" | "i" => Some(ReviewResolution::FixImportant),
        "skip" | "s" => Some(ReviewResolution::Skip),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::types::Severity;

    #[test]
    fn terminal_prompt_reasks_on_garbage() {
        let prompt = TerminalPrompt::new("maybe\npause\n".as_bytes(), Vec::new());
        let decision = prompt.checkpoint(Checkpoint::AfterPlan).expect("decision");
        assert_eq!(decision, CheckpointDecision::Pause);

        let shown = String::from_utf8(prompt.output.into_inner()).expect("utf8");
        assert_eq!(shown.matches("Checkpoint after plan").count(), 2);
        assert!(shown.contains("unrecognized answer 'maybe'"));
    }

    #[test]
    fn terminal_prompt_lists_findings() {
        let prompt = TerminalPrompt::new("fix-important\n".as_bytes(), Vec::new());
        let findings = vec![Finding {
            severity: Severity::Cosmetic,
            summary: "rename helper".to_string(),
        }];
        let resolution = prompt.review(&findings).expect("resolution");
        assert_eq!(resolution, ReviewResolution::FixImportant);

        let shown = String::from_utf8(prompt.output.into_inner()).expect("utf8");
        assert!(shown.contains("[cosmetic] rename helper"));
    }

    #[test]
    fn closed_input_is_an_error() {
        let prompt = TerminalPrompt::new("".as_bytes(), Vec::new());
        assert!(prompt.checkpoint(Checkpoint::AfterRequirements).is_err());
    }

    #[test]
    fn auto_decisions_always_continue() {
        let auto = AutoDecisions {
            review: ReviewResolution::Skip,
        };
        assert_eq!(
            auto.checkpoint(Checkpoint::AfterImplementation).expect("checkpoint"),
            CheckpointDecision::Continue
        );
        assert_eq!(auto.review(&[]).expect("review"), ReviewResolution::Skip);
    }
}
