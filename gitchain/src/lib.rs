//! Fluent, fail-fast git command chains.
//!
//! A [`Chain`] runs git subcommands in a working directory one after another.
//! The first failure poisons the chain: later steps are skipped and the
//! failure, together with the output that produced it, reaches the caller
//! unchanged. Query helpers answer typed questions (is the index dirty, what
//! is the latest tag) without touching the chain's state.
//!
//! - **[`core`]**: Pure parsing of git output (porcelain status, line lists,
//!   tag patterns). No I/O.
//! - **[`io`]**: Process execution and runner configuration.
//! - **[`chain`]**: The engine, the command wrappers and the query helpers.

pub mod chain;
pub mod core;
pub mod error;
pub mod exit_codes;
pub mod io;
pub mod logging;
#[cfg(any(test, feature = "test-support"))]
pub mod test_support;

pub use crate::chain::{Chain, DebugRecord, DebugSink, TracingSink, set_debug_mode};
pub use crate::core::status::StatusEntry;
pub use crate::error::{GitError, Result};
pub use crate::io::process::{Captured, CommandRunner, ProcessRunner};
