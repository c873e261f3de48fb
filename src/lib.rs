//! Deterministic multi-platform release packaging.
//!
//! Relkit turns a built application tree into byte-for-byte reproducible
//! distributables:
//!
//! - freezes a pinned, patched third-party dependency into the bundle
//! - assembles a standalone executable tree per platform
//! - normalizes filesystem metadata to canonical values
//! - writes a reproducible zip archive and a platform-native installer
//!   (AppImage, disk image, or script-driven installer)
//! - signs, notarizes, and digests the results
//! - verifies determinism by running the whole pipeline twice and
//!   structurally diffing the outputs
//!
//! It can be used both as a CLI tool and as a library dependency.

pub mod cli;
pub mod error;
pub mod pipeline;

// Re-export commonly used types
pub use error::{CliError, RelkitError, Result};
