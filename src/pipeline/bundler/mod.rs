//! Bundler: assembly of the standalone executable tree.
//!
//! Produces the build tree that all later stages operate on: the
//! application payload, the embedded runtime, the frozen dependency, and
//! the launcher binary at the bundle root. Assembly happens in a staging
//! directory that is renamed into place only on full success; a failed
//! bundle leaves nothing for the next stage to consume.

mod loader;

pub use loader::rebuild_loader;

use std::path::PathBuf;

use crate::pipeline::context::RunContext;
use crate::pipeline::error::{Error, ErrorExt, Result};
use crate::pipeline::settings::Settings;
use crate::pipeline::utils::fs;

/// Assembles the bundle tree for the target platform.
///
/// Layout:
///
/// ```text
/// bundle/
///   <main_binary>   launcher (stock, or rebuilt per [bundle.loader])
///   app/            application payload
///   runtime/        embedded interpreter/runtime (optional)
///   dep/            frozen dependency tree (when one is declared)
/// ```
pub async fn bundle(ctx: &RunContext, settings: &Settings) -> Result<PathBuf> {
    log::info!(
        "Bundling {} {} for {}",
        settings.product_name(),
        settings.version_string(),
        settings.target()
    );

    let staging = ctx.staging_dir("bundle")?;
    let result = assemble(ctx, settings, &staging).await;
    if let Err(e) = result {
        // Partial output directories are discarded, not left behind.
        fs::remove_dir_all(&staging).await.ok();
        return Err(e);
    }

    let bundle_dir = ctx.bundle_dir();
    fs::atomic_move(&staging, &bundle_dir).await?;
    log::info!("✓ Bundle assembled at {}", bundle_dir.display());
    Ok(bundle_dir)
}

async fn assemble(
    ctx: &RunContext,
    settings: &Settings,
    staging: &std::path::Path,
) -> Result<()> {
    let bundle_settings = settings.bundle();

    let app_src = settings.resolve(&bundle_settings.app_dir);
    if !app_src.is_dir() {
        return Err(Error::Config(format!(
            "application directory does not exist: {}",
            app_src.display()
        )));
    }
    fs::copy_dir(&app_src, &staging.join("app")).await?;

    if let Some(runtime_dir) = &bundle_settings.runtime_dir {
        let runtime_src = settings.resolve(runtime_dir);
        if !runtime_src.is_dir() {
            return Err(Error::Config(format!(
                "runtime directory does not exist: {}",
                runtime_src.display()
            )));
        }
        fs::copy_dir(&runtime_src, &staging.join("runtime")).await?;
    }

    if settings.dependency().is_some() {
        let frozen_dep = ctx.frozen_dir().join("dep");
        if !frozen_dep.is_dir() {
            return Err(Error::Config(
                "dependency is declared but not frozen; run freeze-dependency first".into(),
            ));
        }
        fs::copy_dir(&frozen_dep, &staging.join("dep")).await?;
    }

    install_launcher(settings, staging).await?;
    Ok(())
}

/// Places the launcher binary at the bundle root.
///
/// With a `[bundle.loader]` section, the loader is rebuilt from source and
/// its output substituted for the stock binary. Otherwise the stock
/// launcher is taken from the application payload.
async fn install_launcher(settings: &Settings, staging: &std::path::Path) -> Result<()> {
    let main_binary = &settings.bundle().main_binary;
    let launcher_dst = staging.join(main_binary);

    let launcher_src = match &settings.bundle().loader {
        Some(loader_settings) => rebuild_loader(settings, loader_settings).await?,
        None => {
            let stock = staging.join("app").join(main_binary);
            if !stock.is_file() {
                return Err(Error::Config(format!(
                    "no launcher: {main_binary} not found in application directory \
                     and no [bundle.loader] is configured"
                )));
            }
            stock
        }
    };

    fs::copy_file(&launcher_src, &launcher_dst).await?;

    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        tokio::fs::set_permissions(&launcher_dst, std::fs::Permissions::from_mode(0o755))
            .await
            .fs_context("marking launcher executable", &launcher_dst)?;
    }
    #[cfg(not(unix))]
    {
        let _ = &launcher_dst;
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pipeline::settings::{
        BundleSettings, PackageSettings, SettingsBuilder, TargetPlatform,
    };

    fn make_settings(base: &std::path::Path, runtime: bool) -> Settings {
        SettingsBuilder::new()
            .package(PackageSettings {
                product_name: "App".into(),
                version: "0.9.1".into(),
                ..Default::default()
            })
            .bundle(BundleSettings {
                app_dir: "app".into(),
                runtime_dir: runtime.then(|| "runtime".into()),
                main_binary: "app-bin".into(),
                loader: None,
            })
            .target(TargetPlatform::Linux)
            .base_dir(base)
            .build()
            .expect("settings")
    }

    #[tokio::test]
    async fn bundle_assembles_expected_layout() {
        let work = tempfile::tempdir().expect("tempdir");
        let ctx = RunContext::new(work.path(), None, Some(work.path().join("cache")))
            .expect("ctx");

        std::fs::create_dir_all(work.path().join("app")).expect("mkdir");
        std::fs::write(work.path().join("app/app-bin"), b"#!/bin/sh\n").expect("write");
        std::fs::create_dir_all(work.path().join("runtime/lib")).expect("mkdir");
        std::fs::write(work.path().join("runtime/lib/rt.so"), b"rt").expect("write");

        let settings = make_settings(work.path(), true);
        let bundle_dir = bundle(&ctx, &settings).await.expect("bundle");

        assert!(bundle_dir.join("app-bin").is_file());
        assert!(bundle_dir.join("app/app-bin").is_file());
        assert!(bundle_dir.join("runtime/lib/rt.so").is_file());
        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            let mode = std::fs::metadata(bundle_dir.join("app-bin"))
                .expect("metadata")
                .permissions()
                .mode();
            assert_eq!(mode & 0o111, 0o111);
        }
    }

    #[tokio::test]
    async fn failed_bundle_discards_partial_output() {
        let work = tempfile::tempdir().expect("tempdir");
        let ctx = RunContext::new(work.path(), None, Some(work.path().join("cache")))
            .expect("ctx");

        // Application dir exists but lacks the launcher binary.
        std::fs::create_dir_all(work.path().join("app")).expect("mkdir");

        let settings = make_settings(work.path(), false);
        let err = bundle(&ctx, &settings).await.expect_err("must fail");
        assert!(matches!(err, Error::Config(_)));
        assert!(!ctx.bundle_dir().exists());
    }
}
