//! Target platform selection and per-platform installer formats.

use serde::Deserialize;

use crate::pipeline::error::{Error, Result};

/// Platform a release is being packaged for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TargetPlatform {
    /// Linux (zip archive + AppImage)
    Linux,
    /// macOS (zip archive + disk image)
    MacOs,
    /// Windows (zip archive + script-driven installer)
    Windows,
}

/// Platform-native installer format. Exactly one per target, never mixed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InstallerKind {
    /// Self-contained Linux executable image
    AppImage,
    /// macOS disk image
    DiskImage,
    /// Script-driven Windows installer
    ScriptInstaller,
}

impl TargetPlatform {
    /// The platform this process is running on.
    pub fn host() -> Result<Self> {
        if cfg!(target_os = "linux") {
            Ok(Self::Linux)
        } else if cfg!(target_os = "macos") {
            Ok(Self::MacOs)
        } else if cfg!(target_os = "windows") {
            Ok(Self::Windows)
        } else {
            Err(Error::Config("unsupported host platform".into()))
        }
    }

    /// Parses a platform name as given on the command line.
    pub fn parse(name: &str) -> Result<Self> {
        match name {
            "linux" => Ok(Self::Linux),
            "macos" => Ok(Self::MacOs),
            "windows" => Ok(Self::Windows),
            other => Err(Error::Config(format!(
                "invalid platform: {other}. Valid platforms: linux, macos, windows"
            ))),
        }
    }

    /// The installer format native to this platform.
    pub fn installer_kind(&self) -> InstallerKind {
        match self {
            Self::Linux => InstallerKind::AppImage,
            Self::MacOs => InstallerKind::DiskImage,
            Self::Windows => InstallerKind::ScriptInstaller,
        }
    }

    /// Short name used in artifact file names.
    pub fn short_name(&self) -> &'static str {
        match self {
            Self::Linux => "linux",
            Self::MacOs => "macos",
            Self::Windows => "windows",
        }
    }
}

impl std::fmt::Display for TargetPlatform {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.short_name())
    }
}
