//! Deterministic, pure logic shared by the orchestrator.
//!
//! Core modules must be free of I/O side effects. They operate on in-memory
//! data and return deterministic outputs suitable for tests.

pub mod attribution;
pub mod gates;
pub mod review;
pub mod signature;
pub mod status_graph;
pub mod status_marker;
pub mod tasks;
pub mod types;
