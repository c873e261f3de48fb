//! Top-level error types.
//!
//! The pipeline has its own typed errors ([`crate::pipeline::Error`]);
//! this layer adds CLI concerns and the conversion to a process exit
//! status.

use thiserror::Error;

/// Result type alias for top-level operations
pub type Result<T> = std::result::Result<T, RelkitError>;

/// Main error type for the relkit binary and library surface
#[derive(Error, Debug)]
pub enum RelkitError {
    /// CLI argument errors
    #[error("CLI error: {0}")]
    Cli(#[from] CliError),

    /// IO errors
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON serialization errors
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Pipeline stage errors
    #[error("{0}")]
    Pipeline(#[from] crate::pipeline::Error),

    /// Generic errors from anyhow
    #[error("{0}")]
    Anyhow(#[from] anyhow::Error),
}

impl RelkitError {
    /// Exit status to propagate to the shell.
    ///
    /// Sub-tool exit statuses pass through unchanged; everything else
    /// maps to 1.
    pub fn exit_status(&self) -> i32 {
        match self {
            RelkitError::Pipeline(e) => e.exit_status(),
            _ => 1,
        }
    }
}

/// CLI-specific errors
#[derive(Error, Debug)]
pub enum CliError {
    /// Invalid command line arguments
    #[error("Invalid arguments: {reason}")]
    InvalidArguments {
        /// Reason for the error
        reason: String,
    },

    /// Command execution failed
    #[error("Command execution failed: {command} - {reason}")]
    ExecutionFailed {
        /// Command that failed
        command: String,
        /// Reason for the error
        reason: String,
    },
}
