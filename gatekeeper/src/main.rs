//! Gated development-workflow orchestrator.
//!
//! Drives one ticket at a time through requirements, research, plan, task
//! list, implementation, review, QA, docs and validate. State lives under
//! `.gatekeeper/` in the workspace.

use std::io::{BufReader, stdin, stdout};
use std::path::{Path, PathBuf};

use anyhow::Result;
use clap::{Parser, Subcommand};

use gatekeeper::core::types::{GateName, ReviewResolution, TicketId};
use gatekeeper::engine::Collaborators;
use gatekeeper::exit_codes;
use gatekeeper::io::config::load_config;
use gatekeeper::io::decisions::{AutoDecisions, DecisionPrompt, TerminalPrompt, parse_review};
use gatekeeper::io::dispatch::CommandWorkerBackend;
use gatekeeper::io::paths::{WorkspacePaths, init_workspace};
use gatekeeper::io::snapshot::ContentSnapshots;
use gatekeeper::io::verify::CommandCheckRunner;
use gatekeeper::logging;
use gatekeeper::orchestrator::{RunOptions, TicketStop, run_ticket, ticket_summary};
use gatekeeper::report::{render_outcome, render_summary};

#[derive(Parser)]
#[command(
    name = "gatekeeper",
    version,
    about = "Gated development-workflow orchestrator"
)]
struct Cli {
    /// Workspace root.
    #[arg(short = 'C', long = "dir", global = true, default_value = ".")]
    dir: PathBuf,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Create `.gatekeeper/` with a default config.
    Init {
        /// Overwrite an existing config.
        #[arg(short, long)]
        force: bool,
    },
    /// Drive a ticket through the gates until it completes or needs a human.
    Run {
        ticket: String,
        /// Start at this gate; earlier gates are not evaluated.
        #[arg(long, value_parser = parse_gate)]
        from: Option<GateName>,
        /// Clear task attempt and review cycle counters first.
        #[arg(long)]
        reset_loops: bool,
        /// Answer checkpoints with continue and review questions with `--review-default`.
        #[arg(short, long)]
        yes: bool,
        /// Review decision used with `--yes`.
        #[arg(long, value_parser = parse_resolution, default_value = "fix-important")]
        review_default: ReviewResolution,
    },
    /// Show gate, artifact statuses, task progress and loop counters.
    Status { ticket: String },
}

fn parse_gate(raw: &str) -> Result<GateName, String> {
    raw.parse()
}

fn parse_resolution(raw: &str) -> Result<ReviewResolution, String> {
    parse_review(raw).ok_or_else(|| format!("unknown review decision '{raw}' (fix-all, fix-important, skip)"))
}

fn main() {
    logging::init();
    let cli = Cli::parse();
    let code = match run(cli) {
        Ok(code) => code,
        Err(err) => {
            eprintln!("{err:#}");
            exit_codes::BLOCKED
        }
    };
    std::process::exit(code);
}

fn run(cli: Cli) -> Result<i32> {
    match cli.command {
        Command::Init { force } => {
            let paths = init_workspace(&cli.dir, force)?;
            println!("initialized {}", paths.state_dir.display());
            Ok(exit_codes::OK)
        }
        Command::Run {
            ticket,
            from,
            reset_loops,
            yes,
            review_default,
        } => {
            let Some(ticket) = parse_ticket(&ticket) else {
                return Ok(exit_codes::MALFORMED_TICKET);
            };
            let options = RunOptions { from, reset_loops };
            cmd_run(&cli.dir, &ticket, &options, yes, review_default)
        }
        Command::Status { ticket } => {
            let Some(ticket) = parse_ticket(&ticket) else {
                return Ok(exit_codes::MALFORMED_TICKET);
            };
            print!("{}", render_summary(&ticket_summary(&cli.dir, &ticket)?));
            Ok(exit_codes::OK)
        }
    }
}

fn parse_ticket(raw: &str) -> Option<TicketId> {
    match TicketId::parse(raw) {
        Ok(ticket) => Some(ticket),
        Err(err) => {
            eprintln!("{err}");
            None
        }
    }
}

fn cmd_run(
    root: &Path,
    ticket: &TicketId,
    options: &RunOptions,
    yes: bool,
    review_default: ReviewResolution,
) -> Result<i32> {
    let paths = WorkspacePaths::new(root);
    let config = load_config(&paths.config_path)?;

    let workers = CommandWorkerBackend::new(config.clone());
    let checks = CommandCheckRunner {
        timeout: config.verification_timeout(),
        output_limit_bytes: config.output_limit_bytes,
    };
    let snapshots = ContentSnapshots::new(root, &paths.snapshots_dir, &config.snapshot.exclude);
    let decisions: Box<dyn DecisionPrompt> = if yes {
        Box::new(AutoDecisions {
            review: review_default,
        })
    } else {
        Box::new(TerminalPrompt::new(BufReader::new(stdin()), stdout()))
    };

    let outcome = run_ticket(
        root,
        ticket,
        &config,
        options,
        Collaborators {
            workers: &workers,
            checks: &checks,
            snapshots: &snapshots,
            decisions: decisions.as_ref(),
        },
    )?;
    print!("{}", render_outcome(&outcome));
    Ok(match outcome.stop {
        TicketStop::Complete => exit_codes::OK,
        TicketStop::Escalated(_) => exit_codes::BLOCKED,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_run_with_options() {
        let cli = Cli::parse_from([
            "gatekeeper",
            "run",
            "PROJ-7",
            "--from",
            "task-list",
            "--yes",
            "--review-default",
            "skip",
        ]);
        match cli.command {
            Command::Run {
                ticket,
                from,
                reset_loops,
                yes,
                review_default,
            } => {
                assert_eq!(ticket, "PROJ-7");
                assert_eq!(from, Some(GateName::TaskList));
                assert!(!reset_loops);
                assert!(yes);
                assert_eq!(review_default, ReviewResolution::Skip);
            }
            _ => panic!("expected run"),
        }
    }

    #[test]
    fn review_default_is_fix_important() {
        let cli = Cli::parse_from(["gatekeeper", "-C", "/tmp/ws", "run", "PROJ-7"]);
        assert_eq!(cli.dir, PathBuf::from("/tmp/ws"));
        assert!(matches!(
            cli.command,
            Command::Run {
                review_default: ReviewResolution::FixImportant,
                ..
            }
        ));
    }

    #[test]
    fn unknown_gate_is_rejected() {
        assert!(Cli::try_parse_from(["gatekeeper", "run", "PROJ-7", "--from", "deploy"]).is_err());
    }
}
