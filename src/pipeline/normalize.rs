//! Metadata normalization.
//!
//! Rewrites permissions and timestamps of every bundle entry to the
//! canonical values in [`crate::pipeline::canonical`], so everything
//! downstream of the bundler is a function of content alone. Both
//! transforms are idempotent and order-independent; content bytes are
//! never touched.
//!
//! Normalization must run after the bundler and before the archiver and
//! installer generator. That ordering is enforced structurally: those
//! stages only accept a [`NormalizedTree`], which this module (or an
//! explicit metadata check) is the only way to obtain.

use filetime::FileTime;

use crate::pipeline::canonical::{
    CANONICAL_DIR_MODE, CANONICAL_EXEC_MODE, CANONICAL_FILE_MODE, CANONICAL_MTIME,
};
use crate::pipeline::error::{ErrorExt, Result};
use crate::pipeline::tree::{BuildTree, EntryKind, NormalizedTree};

/// Sets every entry's mode to one of the two canonical values.
///
/// Files keep only the executable/non-executable distinction, decided by
/// the owner-execute bit; directories always get the canonical directory
/// mode. Idempotent: canonical modes map to themselves.
pub fn normalize_permissions(tree: &BuildTree) -> Result<()> {
    #[cfg(unix)]
    {
        use std::fs::Permissions;
        use std::os::unix::fs::PermissionsExt;

        for entry in tree.entries() {
            let mode = match entry.kind {
                EntryKind::Dir => CANONICAL_DIR_MODE,
                EntryKind::File => {
                    if entry.mode & 0o100 != 0 {
                        CANONICAL_EXEC_MODE
                    } else {
                        CANONICAL_FILE_MODE
                    }
                }
                // chmod would follow the link; the target is its own entry.
                EntryKind::Symlink => continue,
            };
            if entry.mode != mode {
                let path = tree.abs_path(entry);
                std::fs::set_permissions(&path, Permissions::from_mode(mode))
                    .fs_context("normalizing permissions", &path)?;
            }
        }
    }
    #[cfg(not(unix))]
    {
        let _ = tree;
    }
    Ok(())
}

/// Sets every entry's modification (and access) time to the canonical
/// instant. Idempotent.
pub fn normalize_timestamps(tree: &BuildTree) -> Result<()> {
    let canonical = FileTime::from_unix_time(CANONICAL_MTIME, 0);

    for entry in tree.entries() {
        let path = tree.abs_path(entry);
        match entry.kind {
            EntryKind::Symlink => {
                filetime::set_symlink_file_times(&path, canonical, canonical)
                    .fs_context("normalizing symlink timestamps", &path)?;
            }
            _ => {
                filetime::set_file_times(&path, canonical, canonical)
                    .fs_context("normalizing timestamps", &path)?;
            }
        }
    }
    Ok(())
}

/// Runs both normalizing transforms and returns the verified tree.
///
/// Re-scans after rewriting so the returned [`NormalizedTree`] reflects
/// what is actually on disk, not what was intended.
pub fn normalize(tree: BuildTree) -> Result<NormalizedTree> {
    log::info!("Normalizing metadata under {}", tree.root().display());

    normalize_permissions(&tree)?;
    normalize_timestamps(&tree)?;

    let rescanned = BuildTree::scan(tree.root())?;
    let normalized = NormalizedTree::verify(rescanned)?;
    log::info!(
        "✓ {} entries normalized",
        normalized.tree().entries().len()
    );
    Ok(normalized)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    fn build_fixture() -> tempfile::TempDir {
        let dir = tempfile::tempdir().expect("tempdir");
        fs::create_dir(dir.path().join("sub")).expect("mkdir");
        fs::write(dir.path().join("sub/data.txt"), b"data").expect("write");
        fs::write(dir.path().join("run.sh"), b"#!/bin/sh\n").expect("write");
        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            fs::set_permissions(
                dir.path().join("run.sh"),
                fs::Permissions::from_mode(0o700),
            )
            .expect("chmod");
            fs::set_permissions(
                dir.path().join("sub/data.txt"),
                fs::Permissions::from_mode(0o664),
            )
            .expect("chmod");
        }
        dir
    }

    #[test]
    fn normalize_produces_canonical_tree() {
        let dir = build_fixture();
        let tree = BuildTree::scan(dir.path()).expect("scan");
        assert!(!tree.is_normalized());

        let normalized = normalize(tree).expect("normalize");
        assert!(normalized.tree().is_normalized());

        #[cfg(unix)]
        {
            let entries = normalized.tree().entries();
            let run_sh = entries
                .iter()
                .find(|e| e.rel_path == "run.sh")
                .expect("run.sh entry");
            assert_eq!(run_sh.mode, CANONICAL_EXEC_MODE);
            let data = entries
                .iter()
                .find(|e| e.rel_path == "sub/data.txt")
                .expect("data entry");
            assert_eq!(data.mode, CANONICAL_FILE_MODE);
        }
    }

    #[test]
    fn permissions_are_idempotent() {
        let dir = build_fixture();
        let tree = BuildTree::scan(dir.path()).expect("scan");
        normalize_permissions(&tree).expect("first");
        let once = BuildTree::scan(dir.path()).expect("rescan");
        let modes_once: Vec<u32> = once.entries().iter().map(|e| e.mode).collect();

        normalize_permissions(&once).expect("second");
        let twice = BuildTree::scan(dir.path()).expect("rescan");
        let modes_twice: Vec<u32> = twice.entries().iter().map(|e| e.mode).collect();
        assert_eq!(modes_once, modes_twice);
    }

    #[test]
    fn timestamps_are_idempotent() {
        let dir = build_fixture();
        let tree = BuildTree::scan(dir.path()).expect("scan");
        normalize_timestamps(&tree).expect("first");
        let once = BuildTree::scan(dir.path()).expect("rescan");
        assert!(once.entries().iter().all(|e| e.mtime == CANONICAL_MTIME));

        normalize_timestamps(&once).expect("second");
        let twice = BuildTree::scan(dir.path()).expect("rescan");
        assert!(twice.entries().iter().all(|e| e.mtime == CANONICAL_MTIME));
    }

    #[test]
    fn content_is_never_modified() {
        let dir = build_fixture();
        let before = fs::read(dir.path().join("sub/data.txt")).expect("read");
        let tree = BuildTree::scan(dir.path()).expect("scan");
        normalize(tree).expect("normalize");
        let after = fs::read(dir.path().join("sub/data.txt")).expect("read");
        assert_eq!(before, after);
    }
}
