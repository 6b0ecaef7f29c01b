//! Debug emission for chain steps.
//!
//! Every step in debug mode hands a [`DebugRecord`] to the chain's
//! [`DebugSink`]. Public steps are `#[track_caller]`, so the record's `caller`
//! is the user's call site rather than a line inside the engine.

use std::panic::Location;

use tracing::{Level, debug, error};

use crate::error::GitError;

/// One emission: the chain state after a step, and who asked for it.
#[derive(Debug, Clone, Copy)]
pub struct DebugRecord<'a> {
    pub level: Level,
    pub output: &'a [u8],
    pub error: Option<&'a GitError>,
    pub caller: &'static Location<'static>,
}

impl<'a> DebugRecord<'a> {
    pub fn new(
        output: &'a [u8],
        error: Option<&'a GitError>,
        caller: &'static Location<'static>,
    ) -> Self {
        let level = if error.is_some() {
            Level::ERROR
        } else {
            Level::DEBUG
        };
        Self {
            level,
            output,
            error,
            caller,
        }
    }

    /// "wrong" for poisoned states, "done" otherwise.
    pub fn message(&self) -> &'static str {
        if self.error.is_some() { "wrong" } else { "done" }
    }

    pub fn output_text(&self) -> String {
        String::from_utf8_lossy(self.output).trim_end().to_string()
    }
}

/// Receives chain debug records.
pub trait DebugSink {
    fn emit(&self, record: &DebugRecord<'_>);
}

/// Forwards records to `tracing`: `debug` for success, `error` for failures.
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingSink;

impl DebugSink for TracingSink {
    fn emit(&self, record: &DebugRecord<'_>) {
        let caller = record.caller;
        let message = record.message();
        match (record.error, record.output.is_empty()) {
            (Some(err), false) => {
                let output = record.output_text();
                error!(%caller, %err, %output, "{message}");
            }
            (Some(err), true) => error!(%caller, %err, "{message}"),
            (None, false) => {
                let output = record.output_text();
                debug!(%caller, %output, "{message}");
            }
            (None, true) => debug!(%caller, "{message}"),
        }
    }
}

/// Text used by the `must_*` terminals when they abort.
pub fn abort_message(error: &GitError, output: &[u8]) -> String {
    let text = String::from_utf8_lossy(output);
    let text = text.trim_end();
    if text.is_empty() {
        format!("wrong: {error}")
    } else {
        format!("wrong: {error}\nmessage:\n{text}")
    }
}
