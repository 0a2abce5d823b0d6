//! Stable exit codes for refinery CLI commands.

/// Command succeeded; for `run` and `score`, the score threshold was met.
pub const OK: i32 = 0;
/// Command failed due to invalid input/config, a gateway failure or other errors.
pub const INVALID: i32 = 1;
/// `run` or `score` finished, but the record scored below the threshold.
pub const BELOW_THRESHOLD: i32 = 2;
