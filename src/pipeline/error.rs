//! Error types for pipeline stages.
//!
//! Every stage fails fast: the first fatal error aborts the run and carries
//! enough context (stage, tool, exit status, stderr) to reproduce the failure
//! manually. Retryable conditions are separate variants so the orchestrator
//! never has to inspect ad-hoc exit codes.

use std::path::PathBuf;
use std::time::Duration;

use thiserror::Error;

use crate::pipeline::verify::Divergence;

/// Result type alias for pipeline operations
pub type Result<T> = std::result::Result<T, Error>;

/// Pipeline stage errors.
#[derive(Error, Debug)]
pub enum Error {
    /// IO errors
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Manifest parse errors
    #[error("manifest error: {0}")]
    Manifest(#[from] toml::de::Error),

    /// JSON errors (tool output parsing, report serialization)
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Invalid or incomplete configuration
    #[error("configuration error: {0}")]
    Config(String),

    /// Network fetch of a pinned revision or packaging tool failed.
    ///
    /// Retryable with bounded backoff; becomes fatal once the attempt
    /// budget is exhausted.
    #[error("fetch failed for {url}: {reason}")]
    Fetch {
        /// URL or repository that could not be fetched
        url: String,
        /// Underlying failure description
        reason: String,
    },

    /// A vendored-dependency patch did not apply cleanly.
    ///
    /// Fatal and non-retryable: the pin and the patch series have diverged
    /// and a human has to reconcile them.
    #[error("patch {patch} failed to apply: {stderr}")]
    PatchApply {
        /// Patch file that was rejected
        patch: PathBuf,
        /// Output of the failed apply
        stderr: String,
    },

    /// An external tool exited with nonzero status.
    #[error("{tool} exited with status {status:?}: {stderr}")]
    ToolInvocation {
        /// Tool that was invoked
        tool: String,
        /// Exit status code, if the process exited normally
        status: Option<i32>,
        /// Captured stderr
        stderr: String,
    },

    /// An external tool could not be spawned at all.
    #[error("failed to run {tool}: {source}")]
    ToolSpawn {
        /// Tool that was invoked
        tool: String,
        /// Spawn error
        source: std::io::Error,
    },

    /// Code signing failed.
    #[error("signing failed: {0}")]
    Signing(String),

    /// The notarization service rejected the artifact.
    ///
    /// A content/policy rejection; never retried without human intervention.
    #[error("notarization rejected: {0}")]
    NotarizationRejected(String),

    /// Notarization polling exhausted its wait budget without a verdict.
    ///
    /// Distinct from [`Error::NotarizationRejected`]; the submission may
    /// still complete and the operator can retry.
    #[error("notarization timed out after {waited:?} ({polls} polls)")]
    NotarizationTimeout {
        /// Total wall time spent waiting
        waited: Duration,
        /// Number of status polls performed
        polls: u32,
    },

    /// A build tree reached the archiver with non-canonical metadata.
    #[error("build tree at {root} is not normalized: {detail}")]
    TreeNotNormalized {
        /// Tree root
        root: PathBuf,
        /// First offending entry and field
        detail: String,
    },

    /// Two independent pipeline runs produced differing artifacts.
    ///
    /// Fails the release gate; the full divergence list is carried so the
    /// operator can localize the source of nondeterminism.
    #[error("determinism check failed: {} divergence(s) between runs", report.len())]
    DeterminismMismatch {
        /// Every detected (path, field, value-A, value-B) divergence
        report: Vec<Divergence>,
    },

    /// Generic errors with a formatted message
    #[error("{0}")]
    Generic(String),
}

impl Error {
    /// Whether the condition is transient and worth retrying.
    ///
    /// Only network fetches and notarization timeouts qualify; everything
    /// else aborts the run.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            Error::Fetch { .. } | Error::NotarizationTimeout { .. }
        )
    }

    /// Exit status to propagate when this error ends the process.
    ///
    /// External-tool failures keep the sub-tool's own status; everything
    /// else maps to 1.
    pub fn exit_status(&self) -> i32 {
        match self {
            Error::ToolInvocation {
                status: Some(code), ..
            } => *code,
            _ => 1,
        }
    }
}

/// Extension trait adding filesystem context to IO results.
pub trait ErrorExt<T> {
    /// Wrap an IO error with the action being performed and the path involved.
    fn fs_context(self, action: &str, path: &std::path::Path) -> Result<T>;
}

impl<T> ErrorExt<T> for std::result::Result<T, std::io::Error> {
    fn fs_context(self, action: &str, path: &std::path::Path) -> Result<T> {
        self.map_err(|e| Error::Generic(format!("{} {}: {}", action, path.display(), e)))
    }
}

/// Extension trait adding message context to pipeline results.
pub trait Context<T> {
    /// Wrap the error with a static message.
    fn context(self, msg: &str) -> Result<T>;

    /// Wrap the error with a lazily-built message.
    fn with_context<F: FnOnce() -> String>(self, f: F) -> Result<T>;
}

impl<T> Context<T> for Result<T> {
    fn context(self, msg: &str) -> Result<T> {
        self.map_err(|e| Error::Generic(format!("{msg}: {e}")))
    }

    fn with_context<F: FnOnce() -> String>(self, f: F) -> Result<T> {
        self.map_err(|e| Error::Generic(format!("{}: {}", f(), e)))
    }
}

/// Return early with a formatted [`Error::Generic`].
#[macro_export]
macro_rules! bail {
    ($($arg:tt)*) => {
        return Err($crate::pipeline::Error::Generic(format!($($arg)*)))
    };
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn retryable_classification() {
        let fetch = Error::Fetch {
            url: "https://example.com/repo.git".into(),
            reason: "connection reset".into(),
        };
        assert!(fetch.is_retryable());

        let rejected = Error::NotarizationRejected("invalid signature".into());
        assert!(!rejected.is_retryable());

        let timeout = Error::NotarizationTimeout {
            waited: Duration::from_secs(600),
            polls: 20,
        };
        assert!(timeout.is_retryable());
    }

    #[test]
    fn tool_status_propagates() {
        let err = Error::ToolInvocation {
            tool: "makensis".into(),
            status: Some(3),
            stderr: String::new(),
        };
        assert_eq!(err.exit_status(), 3);
        assert_eq!(Error::Signing("no identity".into()).exit_status(), 1);
    }
}
