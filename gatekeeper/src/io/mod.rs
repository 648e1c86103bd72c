//! Side-effecting operations: filesystem, processes, workers, snapshots.

pub mod artifact_store;
pub mod config;
pub mod decisions;
pub mod dispatch;
pub mod instructions;
pub mod journal;
pub mod paths;
pub mod process;
pub mod schema;
pub mod snapshot;
pub mod task_store;
pub mod ticket_state;
pub mod verify;
