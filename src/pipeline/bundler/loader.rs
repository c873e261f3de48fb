//! Custom loader rebuild.
//!
//! On platforms where the stock launcher binary embeds nondeterministic
//! data or ships in an incompatible binary format, the bundle carries a
//! loader rebuilt from source instead. The rebuild is an opaque external
//! step; a nonzero exit aborts the bundle.

use std::path::PathBuf;

use crate::pipeline::error::{Error, Result};
use crate::pipeline::settings::{LoaderSettings, Settings};
use crate::pipeline::utils::process;

/// Rebuilds the loader and returns the path of the built binary.
pub async fn rebuild_loader(settings: &Settings, loader: &LoaderSettings) -> Result<PathBuf> {
    let source_dir = settings.resolve(&loader.source_dir);
    if !source_dir.is_dir() {
        return Err(Error::Config(format!(
            "loader source directory does not exist: {}",
            source_dir.display()
        )));
    }

    log::info!("Rebuilding platform loader in {}", source_dir.display());
    process::run_argv(&loader.build, &source_dir, &[]).await?;

    let artifact = source_dir.join(&loader.artifact);
    if !artifact.is_file() {
        return Err(Error::Generic(format!(
            "loader build succeeded but produced no binary at {}",
            artifact.display()
        )));
    }

    log::info!("✓ Loader rebuilt: {}", artifact.display());
    Ok(artifact)
}
