//! Platform-native installer generation.
//!
//! Wraps the normalized bundle tree into exactly one distributable format
//! per target platform: a self-contained Linux image, a macOS disk image,
//! or a script-driven Windows installer. Each format's external tool runs
//! once per build; nonzero exit aborts the run. The input tree is
//! read-only here, and every format pins whatever build-id, serial or
//! timestamp fields its tool lets us pin.

mod appimage;
mod dmg;
mod script;
mod template;

use std::path::PathBuf;

use crate::pipeline::context::RunContext;
use crate::pipeline::error::{ErrorExt, Result};
use crate::pipeline::settings::{InstallerKind, Settings};
use crate::pipeline::tree::NormalizedTree;

/// Generates the platform-native installer for `tree`.
///
/// Returns the path of the finished artifact in the run's dist directory.
pub async fn make_installer(
    ctx: &RunContext,
    settings: &Settings,
    tree: &NormalizedTree,
) -> Result<PathBuf> {
    crate::pipeline::preflight::check_installer_tools(settings.target())?;

    let dist = ctx.dist_dir();
    tokio::fs::create_dir_all(&dist)
        .await
        .fs_context("creating dist directory", &dist)?;

    match settings.target().installer_kind() {
        InstallerKind::AppImage => appimage::generate(ctx, settings, tree, &dist).await,
        InstallerKind::DiskImage => dmg::generate(settings, tree, &dist).await,
        InstallerKind::ScriptInstaller => script::generate(settings, tree, &dist).await,
    }
}
