//! Stable exit codes for `numsolve` commands.

/// Command succeeded with at least one successful candidate.
pub const OK: i32 = 0;
/// Command failed: invalid config, unreachable capability, or run timeout.
pub const INVALID: i32 = 1;
/// Run finished, but no candidate succeeded and selection fell back.
pub const DEGRADED: i32 = 2;
