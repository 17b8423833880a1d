//! Stable exit codes for adw CLI commands.

/// Command or workflow completed.
pub const OK: i32 = 0;
/// A phase failed, the workflow aborted, or an unexpected error occurred.
pub const FAILED: i32 = 1;
/// The run state a phase needs is missing or incomplete (run `adw plan` first).
pub const INVALID: i32 = 2;
