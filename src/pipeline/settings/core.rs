//! Core Settings struct.

use std::path::{Path, PathBuf};

use serde::Deserialize;

use super::{BundleSettings, PackageSettings, TargetPlatform};
use crate::pipeline::freezer::PinnedDependency;

/// Installer-specific knobs.
///
/// Maps from the `[installer]` section of `relkit.toml`. Values that the
/// underlying tools would otherwise invent per build (volume names, serial
/// fields) are pinned here.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct InstallerSettings {
    /// Disk image volume name. Defaults to the product name.
    #[serde(default)]
    pub volume_name: Option<String>,

    /// Install directory name used by the script-driven installer.
    /// Defaults to the product name.
    #[serde(default)]
    pub install_dir: Option<String>,
}

/// Immutable configuration for one packaging run.
///
/// Constructed via [`super::SettingsBuilder`] from `relkit.toml` plus the
/// selected target platform. Stages read from this; nothing writes back.
#[derive(Debug, Clone)]
pub struct Settings {
    pub(super) package: PackageSettings,
    pub(super) bundle: BundleSettings,
    pub(super) dependency: Option<PinnedDependency>,
    pub(super) installer: InstallerSettings,
    pub(super) target: TargetPlatform,
    /// Directory the manifest was loaded from; relative paths resolve
    /// against it.
    pub(super) base_dir: PathBuf,
}

impl Settings {
    /// Returns the product name.
    pub fn product_name(&self) -> &str {
        &self.package.product_name
    }

    /// Returns the version string.
    pub fn version_string(&self) -> &str {
        &self.package.version
    }

    /// Returns the package metadata.
    pub fn package(&self) -> &PackageSettings {
        &self.package
    }

    /// Returns the bundle composition settings.
    pub fn bundle(&self) -> &BundleSettings {
        &self.bundle
    }

    /// Returns the pinned dependency descriptor, if one is declared.
    pub fn dependency(&self) -> Option<&PinnedDependency> {
        self.dependency.as_ref()
    }

    /// Returns the installer settings.
    pub fn installer(&self) -> &InstallerSettings {
        &self.installer
    }

    /// Returns the target platform.
    pub fn target(&self) -> TargetPlatform {
        self.target
    }

    /// Directory the manifest was loaded from.
    pub fn base_dir(&self) -> &Path {
        &self.base_dir
    }

    /// Resolves a manifest-relative path.
    pub fn resolve(&self, path: &Path) -> PathBuf {
        if path.is_absolute() {
            path.to_path_buf()
        } else {
            self.base_dir.join(path)
        }
    }

    /// Base name shared by all artifacts: `<Product>-<version>-<platform>`.
    pub fn artifact_stem(&self) -> String {
        format!(
            "{}-{}-{}",
            self.package.product_name,
            self.package.version,
            self.target.short_name()
        )
    }

    /// File name of the zip archive.
    pub fn archive_name(&self) -> String {
        format!("{}.zip", self.artifact_stem())
    }

    /// File name of the platform-native installer.
    pub fn installer_name(&self) -> String {
        use super::InstallerKind;
        match self.target.installer_kind() {
            InstallerKind::AppImage => {
                format!(
                    "{}-{}-x86_64.AppImage",
                    self.package.product_name, self.package.version
                )
            }
            InstallerKind::DiskImage => {
                format!(
                    "{}-{}.dmg",
                    self.package.product_name, self.package.version
                )
            }
            InstallerKind::ScriptInstaller => {
                format!(
                    "{}-{}-setup.exe",
                    self.package.product_name, self.package.version
                )
            }
        }
    }

    /// Disk image volume name, defaulting to the product name.
    pub fn volume_name(&self) -> &str {
        self.installer
            .volume_name
            .as_deref()
            .unwrap_or(&self.package.product_name)
    }

    /// Installer target directory name, defaulting to the product name.
    pub fn install_dir(&self) -> &str {
        self.installer
            .install_dir
            .as_deref()
            .unwrap_or(&self.package.product_name)
    }
}
