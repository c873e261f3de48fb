//! Artifact freezer: vendoring of the pinned third-party dependency.
//!
//! Given a [`PinnedDependency`], produces the fixed-layout `frozen/` tree
//! in the run workspace: the dependency checked out at the exact pinned
//! revision, the patch series applied in order, and the dependency's own
//! build step run. Fetches populate a host-shared cache under advisory
//! locks; all mutation happens in the run's private staging copy.

mod descriptor;

pub use descriptor::PinnedDependency;

use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::pipeline::context::RunContext;
use crate::pipeline::error::{Error, Result};
use crate::pipeline::utils::{fs, lock, process};

/// Fetch attempts before a network failure becomes fatal.
const FETCH_MAX_ATTEMPTS: u32 = 3;

/// Initial backoff between fetch attempts; doubles per retry.
const FETCH_BACKOFF: Duration = Duration::from_secs(2);

/// Marker file written after a cache entry is fully populated.
const COMPLETE_MARKER: &str = ".relkit-complete";

/// Freezes the pinned dependency into `frozen/` in the run workspace.
///
/// Idempotent: re-running with the same descriptor replaces the frozen
/// tree with an identical one. No partial tree is ever left at the output
/// path; failures abandon the staging copy.
pub async fn freeze(ctx: &RunContext, descriptor: &PinnedDependency, patch_base: &Path) -> Result<PathBuf> {
    log::info!(
        "Freezing {} at {}",
        descriptor.repository,
        descriptor.revision
    );
    crate::pipeline::preflight::require("git", *crate::pipeline::preflight::HAS_GIT, "dependency freezing")?;

    let cached = ensure_cached(ctx, descriptor).await?;

    let staging = ctx.staging_dir("frozen")?;
    let staged_dep = staging.join("dep");

    let result = populate(descriptor, &cached, ctx.cache_dir(), &staged_dep, patch_base).await;
    if let Err(e) = result {
        // Never leave a partially-patched tree behind.
        fs::remove_dir_all(&staging).await.ok();
        return Err(e);
    }

    let frozen = ctx.frozen_dir();
    fs::atomic_move(&staging, &frozen).await?;
    log::info!("✓ Frozen dependency at {}", frozen.display());
    Ok(frozen)
}

async fn populate(
    descriptor: &PinnedDependency,
    cached: &Path,
    cache_dir: &Path,
    staged_dep: &Path,
    patch_base: &Path,
) -> Result<()> {
    // Copy out of the cache under the shared lock; the cache itself is
    // never patched or built in.
    {
        let _read_lock = lock::shared(cache_dir, &descriptor.cache_key())?;
        fs::copy_dir(cached, staged_dep).await?;
    }

    // The checkout's VCS state is not part of the frozen tree.
    fs::remove_dir_all(&staged_dep.join(".git")).await?;

    apply_patches(descriptor, staged_dep, patch_base).await?;

    if let Some(build) = &descriptor.build {
        log::info!("Running dependency build step");
        process::run_argv(build, staged_dep, &[]).await?;
    }

    Ok(())
}

/// Fetches the pinned revision into the shared cache if absent.
///
/// Population happens in a temp directory next to the final entry and is
/// renamed in while the exclusive lock is held, so concurrent runs either
/// see no entry or a complete one.
async fn ensure_cached(ctx: &RunContext, descriptor: &PinnedDependency) -> Result<PathBuf> {
    let key = descriptor.cache_key();
    let entry = ctx.cache_dir().join(&key);

    let _write_lock = lock::exclusive(ctx.cache_dir(), &key)?;

    if entry.join(COMPLETE_MARKER).is_file() {
        log::debug!("cache hit for {}", descriptor.repository);
        return Ok(entry);
    }

    fs::remove_dir_all(&entry).await?;
    let fetch_dir = ctx.cache_dir().join(format!("{key}.fetch"));
    fs::remove_dir_all(&fetch_dir).await?;

    fetch_with_retry(descriptor, &fetch_dir).await?;

    tokio::fs::write(fetch_dir.join(COMPLETE_MARKER), descriptor.revision.as_bytes()).await?;
    tokio::fs::rename(&fetch_dir, &entry).await?;
    Ok(entry)
}

async fn fetch_with_retry(descriptor: &PinnedDependency, dest: &Path) -> Result<()> {
    let mut backoff = FETCH_BACKOFF;
    let mut last_err = None;

    for attempt in 1..=FETCH_MAX_ATTEMPTS {
        match fetch_revision(descriptor, dest).await {
            Ok(()) => return Ok(()),
            Err(e) if e.is_retryable() && attempt < FETCH_MAX_ATTEMPTS => {
                log::warn!(
                    "fetch attempt {attempt}/{FETCH_MAX_ATTEMPTS} failed: {e}; retrying in {backoff:?}"
                );
                fs::remove_dir_all(dest).await?;
                tokio::time::sleep(backoff).await;
                backoff *= 2;
                last_err = Some(e);
            }
            Err(e) => return Err(e),
        }
    }

    Err(last_err.unwrap_or_else(|| Error::Fetch {
        url: descriptor.repository.clone(),
        reason: "fetch attempts exhausted".into(),
    }))
}

async fn fetch_revision(descriptor: &PinnedDependency, dest: &Path) -> Result<()> {
    let dest_str = dest
        .to_str()
        .ok_or_else(|| Error::Config(format!("cache path is not valid UTF-8: {}", dest.display())))?;

    process::run_tool(
        "git",
        &["clone", descriptor.repository.as_str(), dest_str],
        None,
        &[],
    )
    .await
    .map_err(|e| as_fetch(&descriptor.repository, e))?;

    process::run_tool(
        "git",
        &["checkout", "--detach", descriptor.revision.as_str()],
        Some(dest),
        &[],
    )
    .await
    .map_err(|e| as_fetch(&descriptor.repository, e))?;

    Ok(())
}

fn as_fetch(url: &str, err: Error) -> Error {
    match err {
        Error::ToolInvocation { stderr, .. } => Error::Fetch {
            url: url.to_string(),
            reason: stderr.lines().last().unwrap_or("git failed").to_string(),
        },
        Error::ToolSpawn { source, .. } => Error::Fetch {
            url: url.to_string(),
            reason: format!("git not available: {source}"),
        },
        other => other,
    }
}

/// Applies the descriptor's patch series, in listed order.
///
/// Each patch is checked before it is applied; the first rejected patch
/// aborts with [`Error::PatchApply`] and the caller discards the staging
/// tree, so no partially-patched dependency survives.
async fn apply_patches(
    descriptor: &PinnedDependency,
    dep_dir: &Path,
    patch_base: &Path,
) -> Result<()> {
    for patch in &descriptor.patches {
        let patch_path = if patch.is_absolute() {
            patch.clone()
        } else {
            patch_base.join(patch)
        };
        let patch_str = patch_path.to_str().ok_or_else(|| {
            Error::Config(format!("patch path is not valid UTF-8: {}", patch_path.display()))
        })?;

        log::info!("Applying patch {}", patch_path.display());

        for args in [
            ["apply", "--check", patch_str],
            ["apply", "--whitespace=nowarn", patch_str],
        ] {
            if let Err(e) = process::run_tool("git", &args, Some(dep_dir), &[]).await {
                let stderr = match e {
                    Error::ToolInvocation { stderr, .. } => stderr,
                    other => other.to_string(),
                };
                return Err(Error::PatchApply {
                    patch: patch_path.clone(),
                    stderr,
                });
            }
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pipeline::context::RunContext;

    fn descriptor_with_patch(patch: &str) -> PinnedDependency {
        PinnedDependency {
            repository: "https://example.invalid/dep.git".into(),
            revision: "deadbeef".into(),
            patches: vec![PathBuf::from(patch)],
            build: None,
        }
    }

    /// Seed a fake cache entry so the test never touches the network.
    fn seed_cache(ctx: &RunContext, descriptor: &PinnedDependency) {
        let entry = ctx.cache_dir().join(descriptor.cache_key());
        std::fs::create_dir_all(&entry).expect("mkdir");
        std::fs::write(entry.join("module.txt"), b"upstream content\n").expect("write");
        std::fs::write(entry.join(COMPLETE_MARKER), b"deadbeef").expect("marker");
    }

    #[tokio::test]
    async fn failing_patch_leaves_no_partial_tree() {
        let work = tempfile::tempdir().expect("tempdir");
        let ctx = RunContext::new(work.path(), None, Some(work.path().join("cache")))
            .expect("ctx");

        let patch_dir = work.path().join("patches");
        std::fs::create_dir_all(&patch_dir).expect("mkdir");
        // A diff against content the tree does not contain.
        std::fs::write(
            patch_dir.join("bad.patch"),
            "--- a/module.txt\n+++ b/module.txt\n@@ -1 +1 @@\n-no such line\n+replacement\n",
        )
        .expect("write patch");

        let descriptor = descriptor_with_patch("bad.patch");
        seed_cache(&ctx, &descriptor);

        let err = freeze(&ctx, &descriptor, &patch_dir)
            .await
            .expect_err("patch must be rejected");
        assert!(matches!(err, Error::PatchApply { .. }));
        assert!(!ctx.frozen_dir().exists());

        // The staging root must not retain the partially-patched copy.
        let staging_root = ctx.run_root().join("staging");
        if staging_root.exists() {
            let leftovers: Vec<_> = std::fs::read_dir(&staging_root)
                .expect("read staging")
                .collect();
            assert!(leftovers.is_empty(), "staging not cleaned: {leftovers:?}");
        }
    }

    #[tokio::test]
    async fn freeze_applies_patch_and_is_idempotent() {
        let work = tempfile::tempdir().expect("tempdir");
        let ctx = RunContext::new(work.path(), None, Some(work.path().join("cache")))
            .expect("ctx");

        let patch_dir = work.path().join("patches");
        std::fs::create_dir_all(&patch_dir).expect("mkdir");
        std::fs::write(
            patch_dir.join("good.patch"),
            "--- a/module.txt\n+++ b/module.txt\n@@ -1 +1 @@\n-upstream content\n+patched content\n",
        )
        .expect("write patch");

        let descriptor = descriptor_with_patch("good.patch");
        seed_cache(&ctx, &descriptor);

        let frozen = freeze(&ctx, &descriptor, &patch_dir).await.expect("freeze");
        let patched = std::fs::read_to_string(frozen.join("dep/module.txt")).expect("read");
        assert_eq!(patched, "patched content\n");

        // Second run replaces the tree with an identical one.
        let frozen_again = freeze(&ctx, &descriptor, &patch_dir).await.expect("refreeze");
        assert_eq!(frozen, frozen_again);
        let patched = std::fs::read_to_string(frozen_again.join("dep/module.txt")).expect("read");
        assert_eq!(patched, "patched content\n");
    }
}
