//! Exit codes of the `gbp-archive` binary.

pub const SUCCESS: i32 = 0;
pub const LOOKUP_FAILED: i32 = 1; // A buildspec matched no builds
pub const INTERNAL_ERROR: i32 = 2; // Any other failure
