//! I/O helpers: child processes and runner configuration.

pub mod config;
pub mod process;
