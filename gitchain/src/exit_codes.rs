//! Stable exit codes for the `gitchain` CLI.

/// Command succeeded.
pub const OK: i32 = 0;
/// A git step failed, the config was invalid, or the path is not a repository.
pub const FAILED: i32 = 1;
/// `gitchain latest-tag` found no matching tag.
pub const NOT_FOUND: i32 = 2;
