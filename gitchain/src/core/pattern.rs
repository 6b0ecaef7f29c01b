//! Guard for pattern arguments that end up inside a shell script.
//!
//! Patterns are wrapped in single quotes, so a quote could close the literal and
//! a backtick or `$` could start a substitution. All three are rejected.

use crate::error::{GitError, Result};

const FORBIDDEN: [char; 3] = ['\'', '`', '$'];

pub fn validate_pattern(pattern: &str) -> Result<()> {
    if pattern.contains(FORBIDDEN) {
        return Err(GitError::UnsafePattern {
            pattern: pattern.to_string(),
        });
    }
    Ok(())
}

/// `git tag --list '<glob>' --sort=-v:refname`, newest version first.
pub fn tag_list_script(glob: &str) -> Result<String> {
    validate_pattern(glob)?;
    Ok(format!("git tag --list '{glob}' --sort=-v:refname"))
}
