//! Configuration structures for packaging runs.
//!
//! Mirrors the manifest (`relkit.toml`): package metadata, bundle
//! composition, the pinned dependency descriptor, and installer knobs,
//! assembled into an immutable [`Settings`] via [`SettingsBuilder`].

mod builder;
mod bundle;
mod core;
mod package;
mod platform;

pub use builder::SettingsBuilder;
pub use bundle::{BundleSettings, LoaderSettings};
pub use core::{InstallerSettings, Settings};
pub use package::PackageSettings;
pub use platform::{InstallerKind, TargetPlatform};
