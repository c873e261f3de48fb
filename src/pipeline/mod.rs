//! Release-packaging pipeline.
//!
//! Stages run strictly in order on a single worker, each consuming the
//! previous stage's output:
//!
//! freeze → bundle → normalize → {archive, installer} → sign → notarize → digest
//!
//! The driver functions here ([`package`], [`determinism_check`]) sequence
//! the stages; the command surface in [`crate::cli`] stays a thin mapping
//! onto them. Every stage takes the run's [`RunContext`] and the immutable
//! [`Settings`]; there is no ambient state.

pub mod archive;
pub mod bundler;
pub mod canonical;
pub mod context;
pub mod error;
pub mod freezer;
pub mod installer;
pub mod normalize;
pub mod preflight;
pub mod settings;
pub mod sign;
pub mod tree;
pub mod utils;
pub mod verify;

pub use context::{RunContext, Secrets};
pub use error::{Context, Error, ErrorExt, Result};
pub use settings::{Settings, SettingsBuilder, TargetPlatform};
pub use tree::{BuildTree, EntryKind, NormalizedTree, TreeEntry};

use std::path::{Path, PathBuf};

/// Artifacts produced by one packaging run.
#[derive(Debug)]
pub struct PackagedArtifacts {
    /// The reproducible zip archive.
    pub archive: PathBuf,
    /// The platform-native installer, when one was generated.
    pub installer: Option<PathBuf>,
    /// The digest record covering everything in dist.
    pub digest_record: PathBuf,
}

/// Runs the content-producing stages for one platform:
/// freeze → bundle → normalize → archive → installer → digest record.
///
/// Signing and notarization are separate operations; every signature
/// embeds a trusted timestamp that differs between runs, so they sit
/// outside the reproducible core this function produces.
pub async fn package(
    ctx: &RunContext,
    settings: &Settings,
    with_installer: bool,
) -> Result<PackagedArtifacts> {
    if let Some(descriptor) = settings.dependency() {
        freezer::freeze(ctx, descriptor, settings.base_dir()).await?;
    }

    let bundle_dir = bundler::bundle(ctx, settings).await?;

    let scanned = BuildTree::scan(&bundle_dir)?;
    let normalized = normalize::normalize(scanned)?;

    let dist = ctx.dist_dir();
    tokio::fs::create_dir_all(&dist)
        .await
        .fs_context("creating dist directory", &dist)?;

    let archive_path =
        archive::write_archive(&normalized, &dist.join(settings.archive_name())).await?;

    let installer_path = if with_installer {
        Some(installer::make_installer(ctx, settings, &normalized).await?)
    } else {
        None
    };

    let digest_record = verify::write_digest_record(&dist).await?;

    Ok(PackagedArtifacts {
        archive: archive_path,
        installer: installer_path,
        digest_record,
    })
}

/// Runs the pipeline twice in isolated workspaces and structurally diffs
/// the two artifact sets.
///
/// The two runs share nothing but the read-only fetch cache. Returns the
/// full divergence report; an empty report is the pass criterion. The
/// report is also written as JSON under `work_root` for the operator.
pub async fn determinism_check(
    work_root: &Path,
    settings: &Settings,
    with_installer: bool,
    cache_dir: Option<PathBuf>,
) -> Result<Vec<verify::Divergence>> {
    log::info!("Determinism check: running the pipeline twice");

    let ctx_a = RunContext::isolated(work_root, cache_dir.clone())?;
    let ctx_b = RunContext::isolated(work_root, cache_dir)?;

    package(&ctx_a, settings, with_installer).await?;
    package(&ctx_b, settings, with_installer).await?;

    let report = verify::diff_artifact_sets(&ctx_a.dist_dir(), &ctx_b.dist_dir())?;

    let report_path = work_root.join("determinism-report.json");
    let json = serde_json::to_vec_pretty(&report)?;
    tokio::fs::write(&report_path, json)
        .await
        .fs_context("writing determinism report", &report_path)?;

    if report.is_empty() {
        log::info!("✓ Runs {} and {} are byte-identical", ctx_a.run_id(), ctx_b.run_id());
    } else {
        log::warn!(
            "determinism check found {} divergence(s); report at {}",
            report.len(),
            report_path.display()
        );
    }

    Ok(report)
}
