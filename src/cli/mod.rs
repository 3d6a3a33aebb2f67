//! CLI module for tablegate
//!
//! Provides command-line interface for:
//! - serve: reconcile the table and serve queries over HTTP
//! - plan: dry-run schema reconciliation
//! - check: validate configuration and compile queries

mod args;
mod commands;
mod errors;

pub use args::{Cli, Command};
pub use commands::{check, plan, run, run_command, serve};
pub use errors::{CliError, CliErrorCode, CliResult};
