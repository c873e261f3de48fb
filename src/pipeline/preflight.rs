//! External tool detection and availability checking.
//!
//! Runtime probes for the external tools the pipeline shells out to.
//! Results are cached so repeated stages do not re-spawn probe processes,
//! and a missing tool fails with an actionable error before any work
//! starts.

use std::sync::LazyLock;

use crate::pipeline::error::{Error, Result};
use crate::pipeline::settings::{InstallerKind, TargetPlatform};

/// Check if git is available for dependency freezing.
pub static HAS_GIT: LazyLock<bool> = LazyLock::new(|| probe("git", "--version"));

/// Check if makensis is available for script-driven installer creation.
pub static HAS_MAKENSIS: LazyLock<bool> = LazyLock::new(|| probe("makensis", "-VERSION"));

/// Check if hdiutil is available for disk image creation.
pub static HAS_HDIUTIL: LazyLock<bool> = LazyLock::new(|| probe("hdiutil", "help"));

/// Check if gpg is available for detached signatures.
pub static HAS_GPG: LazyLock<bool> = LazyLock::new(|| probe("gpg", "--version"));

fn probe(tool: &str, version_arg: &str) -> bool {
    match which::which(tool) {
        Ok(path) => {
            log::debug!("Found {} at: {}", tool, path.display());
            match std::process::Command::new(&path).arg(version_arg).output() {
                Ok(output) if output.status.success() => {
                    let version = String::from_utf8_lossy(&output.stdout);
                    log::debug!("✓ {} available: {}", tool, version.lines().next().unwrap_or(""));
                    true
                }
                Ok(output) => {
                    log::warn!(
                        "{} found at {} but probe failed (exit code: {:?})",
                        tool,
                        path.display(),
                        output.status.code()
                    );
                    false
                }
                Err(e) => {
                    log::warn!("{} found at {} but failed to execute: {}", tool, path.display(), e);
                    false
                }
            }
        }
        Err(e) => {
            log::debug!("{} not found in PATH: {}", tool, e);
            false
        }
    }
}

/// Fails fast when `tool` is absent, naming what needs installing.
pub fn require(tool: &str, available: bool, needed_for: &str) -> Result<()> {
    if available {
        Ok(())
    } else {
        Err(Error::Config(format!(
            "{tool} is required for {needed_for} but was not found in PATH"
        )))
    }
}

/// Preflight for the installer generator of `target`.
pub fn check_installer_tools(target: TargetPlatform) -> Result<()> {
    match target.installer_kind() {
        InstallerKind::ScriptInstaller => {
            require("makensis", *HAS_MAKENSIS, "the script-driven installer")
        }
        InstallerKind::DiskImage => require("hdiutil", *HAS_HDIUTIL, "disk image creation"),
        // appimagetool is fetched into the cache on demand.
        InstallerKind::AppImage => Ok(()),
    }
}
