//! Herald CLI library.
//!
//! Argument definitions and subcommand implementations for the `herald`
//! binary.

pub mod cli;
pub mod commands;

pub use cli::{Cli, Commands, LogLevel};
pub use commands::dispatch_command;
