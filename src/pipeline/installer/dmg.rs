//! Disk image generation using hdiutil.
//!
//! Wraps the normalized bundle tree into a compressed UDZO disk image.
//! Everything hdiutil lets us pin is pinned: volume name, filesystem,
//! compression level. The staged source folder carries canonical metadata
//! already, so the image content is a function of the bundle alone.

use std::path::{Path, PathBuf};

use crate::pipeline::error::{Error, Result};
use crate::pipeline::settings::Settings;
use crate::pipeline::tree::NormalizedTree;
use crate::pipeline::utils::{fs, process};

/// Creates the disk image for `tree`, returning its path inside `out_dir`.
pub async fn generate(
    settings: &Settings,
    tree: &NormalizedTree,
    out_dir: &Path,
) -> Result<PathBuf> {
    log::info!("Creating disk image for {}", settings.product_name());

    let out_path = out_dir.join(settings.installer_name());
    let tmp_path = out_dir.join(format!("{}.partial.dmg", settings.artifact_stem()));
    if tmp_path.exists() {
        tokio::fs::remove_file(&tmp_path).await?;
    }

    let src = tree.tree().root();
    let src_str = path_str(src)?;
    let tmp_str = path_str(&tmp_path)?;

    process::run_tool(
        "hdiutil",
        &[
            "create",
            "-srcfolder",
            src_str,
            "-volname",
            settings.volume_name(),
            "-fs",
            "HFS+",
            "-format",
            "UDZO",
            "-imagekey",
            "zlib-level=9",
            "-noscrub",
            "-ov",
            tmp_str,
        ],
        None,
        &[],
    )
    .await?;

    fs::atomic_move(&tmp_path, &out_path).await?;
    log::info!("✓ Disk image written: {}", out_path.display());
    Ok(out_path)
}

fn path_str(path: &Path) -> Result<&str> {
    path.to_str()
        .ok_or_else(|| Error::Generic(format!("path is not valid UTF-8: {}", path.display())))
}
