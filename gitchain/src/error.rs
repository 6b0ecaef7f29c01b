//! Error type shared by the chain engine, the runner and the query helpers.
//!
//! Errors are `Clone` because a poisoned chain is an ordinary value: copying it
//! copies the failure it carries. Sources that are not clonable sit behind `Arc`.

use std::sync::Arc;

use thiserror::Error;

/// Result alias used across the library.
pub type Result<T> = std::result::Result<T, GitError>;

/// Failures a chain or a query helper can report.
#[derive(Error, Debug, Clone)]
pub enum GitError {
    /// The child process could not be started.
    #[error("spawn {command}: {source}")]
    Spawn {
        command: String,
        #[source]
        source: Arc<std::io::Error>,
    },

    /// The child started but waiting for it or reading its output failed.
    #[error("{command}: {source}")]
    Io {
        command: String,
        #[source]
        source: Arc<std::io::Error>,
    },

    /// The child exited with a code that was not on the expected-exit allowlist.
    #[error("{command} exited with {}: {}", display_code(.code), display_output(.output))]
    NonZeroExit {
        command: String,
        code: Option<i32>,
        output: Vec<u8>,
    },

    /// The runner deadline elapsed and the child was killed.
    #[error("{command} timed out after {timeout_secs}s")]
    TimedOut {
        command: String,
        timeout_secs: u64,
        output: Vec<u8>,
    },

    /// `check_staged_changes` found an empty index.
    #[error("no staged changes")]
    NoStagedChanges,

    /// A pattern argument contained shell metacharacters; nothing was spawned.
    #[error("unsafe pattern {pattern:?}: must not contain ' ` or $")]
    UnsafePattern { pattern: String },

    /// git succeeded but printed something a query helper could not interpret.
    #[error("unexpected output from {command}: {detail}")]
    UnexpectedOutput { command: String, detail: String },

    /// A caller-supplied `when_then` predicate failed.
    #[error("predicate failed: {0}")]
    Predicate(String),
}

impl GitError {
    /// Bytes the child printed before failing; empty for failures without a child.
    pub fn output(&self) -> &[u8] {
        match self {
            GitError::NonZeroExit { output, .. } | GitError::TimedOut { output, .. } => output,
            _ => &[],
        }
    }

    /// Exit code of the failed child, when it exited normally.
    pub fn exit_code(&self) -> Option<i32> {
        match self {
            GitError::NonZeroExit { code, .. } => *code,
            _ => None,
        }
    }

    /// Wrap any displayable failure as a predicate error.
    pub fn predicate(err: impl std::fmt::Display) -> Self {
        GitError::Predicate(err.to_string())
    }

    pub(crate) fn spawn(command: impl Into<String>, source: std::io::Error) -> Self {
        GitError::Spawn {
            command: command.into(),
            source: Arc::new(source),
        }
    }

    pub(crate) fn io(command: impl Into<String>, source: std::io::Error) -> Self {
        GitError::Io {
            command: command.into(),
            source: Arc::new(source),
        }
    }

    pub(crate) fn unexpected(command: impl Into<String>, detail: impl Into<String>) -> Self {
        GitError::UnexpectedOutput {
            command: command.into(),
            detail: detail.into(),
        }
    }
}

fn display_code(code: &Option<i32>) -> String {
    match code {
        Some(code) => format!("exit code {code}"),
        None => "a signal".to_string(),
    }
}

fn display_output(output: &[u8]) -> String {
    let text = String::from_utf8_lossy(output);
    let text = text.trim();
    if text.is_empty() {
        "(no output)".to_string()
    } else {
        text.to_string()
    }
}
