//! Package metadata.

use serde::Deserialize;

/// Product metadata for the release being packaged.
///
/// Maps from the `[package]` section of `relkit.toml`.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct PackageSettings {
    /// Product name displayed to users and used in artifact names.
    pub product_name: String,

    /// Version string in semantic versioning format.
    pub version: String,

    /// Brief description of the application.
    #[serde(default)]
    pub description: String,

    /// Reverse-DNS bundle identifier (used by signing and disk images).
    #[serde(default)]
    pub identifier: Option<String>,

    /// Publisher shown by the script-driven installer.
    #[serde(default)]
    pub publisher: Option<String>,

    /// Homepage URL.
    #[serde(default)]
    pub homepage: Option<String>,
}
