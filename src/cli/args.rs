//! Command line argument parsing and validation.

use clap::{Parser, Subcommand};
use std::path::PathBuf;

/// Deterministic release packaging pipeline
#[derive(Parser, Debug)]
#[command(
    name = "relkit",
    version,
    about = "Deterministic release packaging pipeline",
    long_about = "Packages a built application tree into reproducible distributables.

Stages map 1:1 onto subcommands and run strictly in order:
freeze-dependency -> bundle -> archive -> make-installer -> sign -> notarize.

Independent builds from the same inputs produce byte-identical artifacts;
verify-determinism runs the whole pipeline twice and diffs the results.

Exit code 0 = success. External tool failures propagate the tool's own
exit status."
)]
pub struct Args {
    /// Path to the packaging manifest
    #[arg(short, long, value_name = "PATH", default_value = "relkit.toml")]
    pub config: PathBuf,

    /// Work directory holding run workspaces
    #[arg(long, value_name = "DIR", default_value = "build")]
    pub work_dir: PathBuf,

    /// Run identifier; runs with different ids are fully isolated
    #[arg(long, value_name = "ID")]
    pub run_id: Option<String>,

    /// Override the shared fetch cache directory
    #[arg(long, value_name = "DIR")]
    pub cache_dir: Option<PathBuf>,

    /// Target platform: linux, macos, windows (default: host)
    #[arg(short, long, value_name = "PLATFORM")]
    pub platform: Option<String>,

    /// Operation to run
    #[command(subcommand)]
    pub command: Command,
}

/// Discrete pipeline operations.
#[derive(Subcommand, Debug)]
pub enum Command {
    /// Remove the run workspace (the shared fetch cache is kept)
    Clean,

    /// Fetch, patch and build the pinned dependency
    FreezeDependency,

    /// Assemble the standalone bundle tree
    Bundle,

    /// Normalize bundle metadata and write the reproducible archive
    Archive,

    /// Wrap the normalized bundle into the platform-native installer
    MakeInstaller,

    /// Sign the artifacts in dist and refresh the digest record
    Sign,

    /// Submit the installer for notarization and await the verdict
    Notarize,

    /// Run the pipeline twice in isolated workspaces and diff the outputs
    VerifyDeterminism {
        /// Also generate installers in both runs (requires the
        /// platform's installer tool)
        #[arg(long)]
        with_installer: bool,
    },

    /// Run freeze, bundle, archive, installer and digest for this platform
    All,
}

impl Args {
    /// Parse command line arguments
    pub fn parse_args() -> Self {
        Self::parse()
    }
}
