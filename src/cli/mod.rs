//! Command line interface for relkit.
//!
//! Thin orchestrator over the pipeline stages: parses arguments, executes
//! the selected operation, and propagates exit codes unchanged.

mod args;
pub mod commands;
mod output;

pub use args::{Args, Command};
pub use output::OutputManager;

use crate::error::Result;

/// Main CLI entry point
pub async fn run() -> Result<i32> {
    let args = Args::parse_args();
    commands::execute(&args).await
}
