//! Gated development-workflow orchestrator.
//!
//! A ticket moves through a fixed sequence of gates (requirements through
//! validate). Each gate is owned by an external worker and guarded by an
//! artifact status. The crate keeps the usual split:
//!
//! - **[`core`]**: Pure, deterministic logic (gate table, status graphs, task
//!   lists, failure signatures, attribution). No I/O.
//! - **[`io`]**: Side-effecting operations (filesystem, processes, workers,
//!   verification, snapshots). Isolated behind traits for tests.
//!
//! Orchestration modules ([`engine`], [`refine`], [`orchestrator`]) combine
//! the two to implement the `run` command.

pub mod core;
pub mod engine;
pub mod error;
pub mod exit_codes;
pub mod io;
pub mod logging;
pub mod orchestrator;
pub mod refine;
pub mod report;
#[cfg(any(test, feature = "test-support"))]
pub mod test_support;
