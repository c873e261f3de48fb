//! Terminal output for command results.
//!
//! Stage progress goes through `log`; this is only for the final,
//! operator-facing result lines.

/// Prints operator-facing result lines.
#[derive(Debug, Clone, Default)]
pub struct OutputManager;

impl OutputManager {
    /// Creates an output manager.
    pub fn new() -> Self {
        Self
    }

    /// Reports a produced artifact.
    pub fn artifact(&self, label: &str, path: &std::path::Path) {
        println!("{label}: {}", path.display());
    }

    /// Reports a success summary line.
    pub fn success(&self, message: &str) {
        println!("✓ {message}");
    }

    /// Reports a failure summary line to stderr.
    pub fn failure(&self, message: &str) {
        eprintln!("✗ {message}");
    }
}
