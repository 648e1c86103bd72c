//! Stable exit codes for gatekeeper CLI commands.

/// Ticket complete, or the command succeeded.
pub const OK: i32 = 0;
/// Ticket blocked awaiting manual intervention, or any other error.
pub const BLOCKED: i32 = 1;
/// The ticket id is malformed.
pub const MALFORMED_TICKET: i32 = 2;
