//! Bundle composition settings.

use std::path::PathBuf;

use serde::Deserialize;

/// What goes into the standalone executable tree.
///
/// Maps from the `[bundle]` section of `relkit.toml`. All paths are
/// relative to the manifest's directory.
#[derive(Debug, Clone, Deserialize)]
pub struct BundleSettings {
    /// Application payload directory (the built application tree).
    pub app_dir: PathBuf,

    /// Embedded interpreter/runtime directory, copied into the bundle.
    #[serde(default)]
    pub runtime_dir: Option<PathBuf>,

    /// Name of the launcher binary inside the bundle.
    pub main_binary: String,

    /// Custom loader rebuild, for platforms where the stock loader embeds
    /// nondeterministic data or ships in an incompatible binary format.
    #[serde(default)]
    pub loader: Option<LoaderSettings>,
}

/// Rebuild instructions for a platform loader binary.
#[derive(Debug, Clone, Deserialize)]
pub struct LoaderSettings {
    /// Loader source directory.
    pub source_dir: PathBuf,

    /// Build command, argv style (`["make", "all"]`).
    pub build: Vec<String>,

    /// Path of the built loader binary, relative to `source_dir`.
    pub artifact: PathBuf,
}
