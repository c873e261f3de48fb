//! Self-contained Linux executable image.
//!
//! Lays the normalized bundle out as an AppDir and invokes a pinned
//! `appimagetool` to produce the AppImage. The tool download is cached in
//! the shared cache under the freezer's lock discipline, and
//! `SOURCE_DATE_EPOCH` is set to the canonical instant so the embedded
//! squashfs carries no build time.

use std::path::{Path, PathBuf};

use crate::pipeline::canonical::CANONICAL_MTIME;
use crate::pipeline::context::RunContext;
use crate::pipeline::error::{Error, ErrorExt, Result};
use crate::pipeline::settings::Settings;
use crate::pipeline::tree::NormalizedTree;
use crate::pipeline::utils::{fs, http, lock, process};

/// Pinned packaging tool release.
const APPIMAGETOOL_URL: &str =
    "https://github.com/AppImage/appimagetool/releases/download/continuous/appimagetool-x86_64.AppImage";

/// Creates the AppImage for `tree`, returning its path inside `out_dir`.
pub async fn generate(
    ctx: &RunContext,
    settings: &Settings,
    tree: &NormalizedTree,
    out_dir: &Path,
) -> Result<PathBuf> {
    log::info!("Building AppImage for {}", settings.product_name());

    let tool = ensure_appimagetool(ctx).await?;

    let work_dir = out_dir.join("appimage-work");
    fs::create_dir_all(&work_dir, true).await?;
    let app_dir = work_dir.join(format!("{}.AppDir", settings.product_name()));

    build_app_dir(settings, tree, &app_dir).await?;

    let out_path = out_dir.join(settings.installer_name());
    let tmp_out = work_dir.join(settings.installer_name());

    process::run_tool(
        path_str(&tool)?,
        &["--no-appstream", path_str(&app_dir)?, path_str(&tmp_out)?],
        None,
        &[
            ("ARCH", "x86_64".to_string()),
            ("SOURCE_DATE_EPOCH", CANONICAL_MTIME.to_string()),
        ],
    )
    .await?;

    if !tmp_out.is_file() {
        return Err(Error::Generic(format!(
            "appimagetool reported success but produced no image at {}",
            tmp_out.display()
        )));
    }

    fs::atomic_move(&tmp_out, &out_path).await?;
    fs::remove_dir_all(&work_dir).await?;
    log::info!("✓ AppImage written: {}", out_path.display());
    Ok(out_path)
}

/// Lays out the AppDir: the bundle under `usr/`, an `AppRun` entry point,
/// and the desktop file the packaging tool requires.
async fn build_app_dir(
    settings: &Settings,
    tree: &NormalizedTree,
    app_dir: &Path,
) -> Result<()> {
    fs::copy_dir(tree.tree().root(), &app_dir.join("usr")).await?;

    let main_binary = &settings.bundle().main_binary;
    let app_run = app_dir.join("AppRun");
    let script = format!(
        "#!/bin/sh\nHERE=\"$(dirname \"$(readlink -f \"$0\")\")\"\nexec \"$HERE/usr/{main_binary}\" \"$@\"\n"
    );
    tokio::fs::write(&app_run, script)
        .await
        .fs_context("writing AppRun", &app_run)?;
    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        tokio::fs::set_permissions(&app_run, std::fs::Permissions::from_mode(0o755))
            .await
            .fs_context("marking AppRun executable", &app_run)?;
    }

    let desktop = app_dir.join(format!("{}.desktop", settings.product_name()));
    let contents = format!(
        "[Desktop Entry]\nType=Application\nName={}\nExec={}\nIcon={}\nCategories=Utility;\n",
        settings.product_name(),
        main_binary,
        settings.product_name(),
    );
    tokio::fs::write(&desktop, contents)
        .await
        .fs_context("writing desktop file", &desktop)?;

    // The packaging tool wants a top-level icon matching the desktop file.
    let icon = app_dir.join(format!("{}.png", settings.product_name()));
    tokio::fs::write(&icon, placeholder_icon())
        .await
        .fs_context("writing icon", &icon)?;

    Ok(())
}

/// Fetches the pinned packaging tool into the shared cache if absent.
async fn ensure_appimagetool(ctx: &RunContext) -> Result<PathBuf> {
    let tools_dir = ctx.cache_dir().join("tools");
    let tool_path = tools_dir.join("appimagetool");

    {
        let _read_lock = lock::shared(&tools_dir, "appimagetool")?;
        if tool_path.is_file() {
            return Ok(tool_path);
        }
    }

    let _write_lock = lock::exclusive(&tools_dir, "appimagetool")?;
    if tool_path.is_file() {
        return Ok(tool_path);
    }

    let bytes = http::download(APPIMAGETOOL_URL).await?;
    let tmp = tools_dir.join("appimagetool.partial");
    tokio::fs::write(&tmp, bytes)
        .await
        .fs_context("writing packaging tool", &tmp)?;
    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        tokio::fs::set_permissions(&tmp, std::fs::Permissions::from_mode(0o755))
            .await
            .fs_context("marking packaging tool executable", &tmp)?;
    }
    tokio::fs::rename(&tmp, &tool_path)
        .await
        .fs_context("installing packaging tool", &tool_path)?;
    Ok(tool_path)
}

/// Minimal 1x1 PNG used when the product ships no icon. Fixed bytes, so it
/// cannot introduce nondeterminism.
fn placeholder_icon() -> &'static [u8] {
    &[
        0x89, 0x50, 0x4E, 0x47, 0x0D, 0x0A, 0x1A, 0x0A, 0x00, 0x00, 0x00, 0x0D, 0x49, 0x48,
        0x44, 0x52, 0x00, 0x00, 0x00, 0x01, 0x00, 0x00, 0x00, 0x01, 0x08, 0x06, 0x00, 0x00,
        0x00, 0x1F, 0x15, 0xC4, 0x89, 0x00, 0x00, 0x00, 0x0D, 0x49, 0x44, 0x41, 0x54, 0x78,
        0x9C, 0x62, 0x00, 0x01, 0x00, 0x00, 0x05, 0x00, 0x01, 0x0D, 0x0A, 0x2D, 0xB4, 0x00,
        0x00, 0x00, 0x00, 0x49, 0x45, 0x4E, 0x44, 0xAE, 0x42, 0x60, 0x82,
    ]
}

fn path_str(path: &Path) -> Result<&str> {
    path.to_str()
        .ok_or_else(|| Error::Generic(format!("path is not valid UTF-8: {}", path.display())))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pipeline::normalize;
    use crate::pipeline::settings::{
        BundleSettings, PackageSettings, SettingsBuilder, TargetPlatform,
    };
    use crate::pipeline::tree::BuildTree;

    #[tokio::test]
    async fn app_dir_layout_is_complete() {
        let bundle = tempfile::tempdir().expect("tempdir");
        std::fs::write(bundle.path().join("skyhook"), b"#!/bin/sh\n").expect("write");
        let tree = normalize::normalize(BuildTree::scan(bundle.path()).expect("scan"))
            .expect("normalize");

        let settings = SettingsBuilder::new()
            .package(PackageSettings {
                product_name: "Skyhook".into(),
                version: "1.0.0".into(),
                ..Default::default()
            })
            .bundle(BundleSettings {
                app_dir: "app".into(),
                runtime_dir: None,
                main_binary: "skyhook".into(),
                loader: None,
            })
            .target(TargetPlatform::Linux)
            .build()
            .expect("settings");

        let work = tempfile::tempdir().expect("tempdir");
        let app_dir = work.path().join("Skyhook.AppDir");
        build_app_dir(&settings, &tree, &app_dir).await.expect("appdir");

        assert!(app_dir.join("AppRun").is_file());
        assert!(app_dir.join("Skyhook.desktop").is_file());
        assert!(app_dir.join("Skyhook.png").is_file());
        assert!(app_dir.join("usr/skyhook").is_file());

        let desktop = std::fs::read_to_string(app_dir.join("Skyhook.desktop")).expect("read");
        assert!(desktop.contains("Name=Skyhook"));
    }
}
