//! Script-driven installer generation.
//!
//! Renders the installer script from [`super::template::NSI_TEMPLATE`] and
//! compiles it with `makensis`. The compiler runs once per build; nonzero
//! exit is fatal. `SOURCE_DATE_EPOCH` is pinned to the canonical instant
//! so the compiler does not embed the build time.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use handlebars::Handlebars;

use crate::pipeline::canonical::CANONICAL_MTIME;
use crate::pipeline::error::{Error, ErrorExt, Result};
use crate::pipeline::settings::Settings;
use crate::pipeline::tree::NormalizedTree;
use crate::pipeline::utils::{fs, process};

/// Generates the script-driven installer for `tree`.
///
/// Returns the path of the finished installer inside `out_dir`.
pub async fn generate(
    settings: &Settings,
    tree: &NormalizedTree,
    out_dir: &Path,
) -> Result<PathBuf> {
    log::info!("Building script-driven installer for {}", settings.product_name());

    let work_dir = out_dir.join("installer-work");
    fs::create_dir_all(&work_dir, true).await?;

    let out_path = out_dir.join(settings.installer_name());
    let tmp_out = work_dir.join(settings.installer_name());

    let script_path = render_script(settings, tree, &work_dir, &tmp_out).await?;

    process::run_tool(
        "makensis",
        &[
            "-V3",
            "-INPUTCHARSET",
            "UTF8",
            script_path
                .to_str()
                .ok_or_else(|| Error::Generic("installer script path is not valid UTF-8".into()))?,
        ],
        None,
        &[("SOURCE_DATE_EPOCH", CANONICAL_MTIME.to_string())],
    )
    .await?;

    if !tmp_out.is_file() {
        return Err(Error::Generic(format!(
            "makensis reported success but produced no installer at {}",
            tmp_out.display()
        )));
    }

    fs::atomic_move(&tmp_out, &out_path).await?;
    fs::remove_dir_all(&work_dir).await?;
    log::info!("✓ Installer written: {}", out_path.display());
    Ok(out_path)
}

async fn render_script(
    settings: &Settings,
    tree: &NormalizedTree,
    work_dir: &Path,
    output_file: &Path,
) -> Result<PathBuf> {
    let mut handlebars = Handlebars::new();
    handlebars.register_escape_fn(handlebars::no_escape);

    let mut data = BTreeMap::new();
    data.insert("product_name", settings.product_name().to_string());
    data.insert("version", settings.version_string().to_string());
    data.insert(
        "publisher",
        settings
            .package()
            .publisher
            .clone()
            .unwrap_or_else(|| "Unknown Publisher".to_string()),
    );
    data.insert("install_dir", settings.install_dir().to_string());
    data.insert("main_binary", settings.bundle().main_binary.clone());
    data.insert(
        "bundle_root",
        tree.tree().root().display().to_string(),
    );
    data.insert("output_file", output_file.display().to_string());

    let rendered = handlebars
        .render_template(super::template::NSI_TEMPLATE, &data)
        .map_err(|e| Error::Generic(format!("rendering installer script: {e}")))?;

    let script_path = work_dir.join("installer.nsi");
    // NSIS expects a UTF-8 BOM.
    let mut bytes = vec![0xEF, 0xBB, 0xBF];
    bytes.extend_from_slice(rendered.as_bytes());
    tokio::fs::write(&script_path, bytes)
        .await
        .fs_context("writing installer script", &script_path)?;
    Ok(script_path)
}
