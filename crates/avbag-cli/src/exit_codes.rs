//! Process exit codes of `avbag`.

pub const EXIT_SUCCESS: i32 = 0;
/// `verify` found problems in the bag.
pub const EXIT_PROBLEMS_FOUND: i32 = 1;
/// Configuration error or a run-level failure before any bag was converted.
pub const EXIT_CONFIG_ERROR: i32 = 2;
