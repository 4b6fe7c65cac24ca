//! Stable exit codes for autocoder commands.
//!
//! `run` and `exec` forward the child's own exit code instead.

/// The command reached its success state.
pub const OK: i32 = 0;
/// The command failed: a loop stopped without success, or an error occurred.
pub const FAILED: i32 = 1;
