//! Manifest loading and the Settings builder.

use std::path::{Path, PathBuf};

use serde::Deserialize;

use super::{BundleSettings, InstallerSettings, PackageSettings, Settings, TargetPlatform};
use crate::pipeline::error::{Error, ErrorExt, Result};
use crate::pipeline::freezer::PinnedDependency;

/// On-disk shape of `relkit.toml`.
#[derive(Debug, Deserialize)]
struct Manifest {
    package: PackageSettings,
    bundle: BundleSettings,
    #[serde(default)]
    dependency: Option<PinnedDependency>,
    #[serde(default)]
    installer: Option<InstallerSettings>,
}

/// Builder for [`Settings`].
///
/// The usual path is [`SettingsBuilder::from_manifest`] followed by
/// [`SettingsBuilder::target`] and [`SettingsBuilder::build`]; tests
/// assemble settings field by field instead.
#[derive(Debug, Default)]
pub struct SettingsBuilder {
    package: Option<PackageSettings>,
    bundle: Option<BundleSettings>,
    dependency: Option<PinnedDependency>,
    installer: Option<InstallerSettings>,
    target: Option<TargetPlatform>,
    base_dir: Option<PathBuf>,
}

impl SettingsBuilder {
    /// Creates an empty builder.
    pub fn new() -> Self {
        Self::default()
    }

    /// Loads `relkit.toml` and seeds the builder from it.
    ///
    /// Relative paths in the manifest resolve against the manifest's own
    /// directory, not the process working directory.
    pub fn from_manifest(path: &Path) -> Result<Self> {
        let text =
            std::fs::read_to_string(path).fs_context("reading manifest", path)?;
        let manifest: Manifest = toml::from_str(&text)?;

        let base_dir = path
            .parent()
            .map(Path::to_path_buf)
            .unwrap_or_else(|| PathBuf::from("."));

        Ok(Self {
            package: Some(manifest.package),
            bundle: Some(manifest.bundle),
            dependency: manifest.dependency,
            installer: manifest.installer,
            target: None,
            base_dir: Some(base_dir),
        })
    }

    /// Sets the package metadata.
    pub fn package(mut self, package: PackageSettings) -> Self {
        self.package = Some(package);
        self
    }

    /// Sets the bundle composition.
    pub fn bundle(mut self, bundle: BundleSettings) -> Self {
        self.bundle = Some(bundle);
        self
    }

    /// Sets the pinned dependency descriptor.
    pub fn dependency(mut self, dependency: PinnedDependency) -> Self {
        self.dependency = Some(dependency);
        self
    }

    /// Sets the installer settings.
    pub fn installer(mut self, installer: InstallerSettings) -> Self {
        self.installer = Some(installer);
        self
    }

    /// Sets the target platform.
    pub fn target(mut self, target: TargetPlatform) -> Self {
        self.target = Some(target);
        self
    }

    /// Sets the base directory for resolving manifest-relative paths.
    pub fn base_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.base_dir = Some(dir.into());
        self
    }

    /// Validates and produces an immutable [`Settings`].
    pub fn build(self) -> Result<Settings> {
        let package = self
            .package
            .ok_or_else(|| Error::Config("package settings are required".into()))?;
        let bundle = self
            .bundle
            .ok_or_else(|| Error::Config("bundle settings are required".into()))?;

        if package.product_name.is_empty() {
            return Err(Error::Config("package.product_name must not be empty".into()));
        }
        if package.version.is_empty() {
            return Err(Error::Config("package.version must not be empty".into()));
        }
        if bundle.main_binary.is_empty() {
            return Err(Error::Config("bundle.main_binary must not be empty".into()));
        }

        let target = match self.target {
            Some(target) => target,
            None => TargetPlatform::host()?,
        };

        Ok(Settings {
            package,
            bundle,
            dependency: self.dependency,
            installer: self.installer.unwrap_or_default(),
            target,
            base_dir: self.base_dir.unwrap_or_else(|| PathBuf::from(".")),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const MANIFEST: &str = r#"
[package]
product_name = "Skyhook"
version = "1.4.0"
description = "Example application"
publisher = "Skyhook Project"

[bundle]
app_dir = "build/app"
runtime_dir = "build/runtime"
main_binary = "skyhook"

[dependency]
repository = "https://github.com/example/storaged"
revision = "0f3c9a1d2b4e5f60718293a4b5c6d7e8f9a0b1c2"
patches = ["patches/0001-disable-telemetry.patch"]
build = ["make", "dist"]

[installer]
volume_name = "Skyhook"
"#;

    #[test]
    fn manifest_parses_and_builds() {
        let dir = tempfile::tempdir().expect("tempdir");
        let manifest_path = dir.path().join("relkit.toml");
        std::fs::write(&manifest_path, MANIFEST).expect("write manifest");

        let settings = SettingsBuilder::from_manifest(&manifest_path)
            .expect("load")
            .target(TargetPlatform::Linux)
            .build()
            .expect("build");

        assert_eq!(settings.product_name(), "Skyhook");
        assert_eq!(settings.archive_name(), "Skyhook-1.4.0-linux.zip");
        assert_eq!(settings.installer_name(), "Skyhook-1.4.0-x86_64.AppImage");
        let dep = settings.dependency().expect("dependency");
        assert_eq!(dep.patches.len(), 1);
        // Manifest-relative paths resolve against the manifest directory.
        assert_eq!(
            settings.resolve(&settings.bundle().app_dir),
            dir.path().join("build/app")
        );
    }

    #[test]
    fn build_rejects_empty_product_name() {
        let err = SettingsBuilder::new()
            .package(PackageSettings {
                product_name: String::new(),
                version: "1.0.0".into(),
                ..Default::default()
            })
            .bundle(BundleSettings {
                app_dir: "app".into(),
                runtime_dir: None,
                main_binary: "app".into(),
                loader: None,
            })
            .target(TargetPlatform::Linux)
            .build()
            .expect_err("empty product name must be rejected");
        assert!(matches!(err, Error::Config(_)));
    }
}
