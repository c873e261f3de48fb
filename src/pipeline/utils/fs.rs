//! File system utilities for pipeline stages.
//!
//! Staging-and-rename discipline lives here: stages build in private
//! staging directories and only `atomic_move` results into place, so no
//! consumer ever observes partial output.

use std::io;
use std::path::Path;

use crate::pipeline::error::{Error, ErrorExt, Result};

/// Creates all of the directories of the specified path, erasing it first
/// if specified.
pub async fn create_dir_all(path: &Path, erase: bool) -> Result<()> {
    if erase {
        match tokio::fs::remove_dir_all(path).await {
            Ok(()) => {}
            Err(e) if e.kind() == io::ErrorKind::NotFound => {}
            Err(e) => return Err(e.into()),
        }
    }
    tokio::fs::create_dir_all(path)
        .await
        .fs_context("creating directory", path)?;
    Ok(())
}

/// Removes the directory and its contents if it exists.
pub async fn remove_dir_all(path: &Path) -> Result<()> {
    match tokio::fs::remove_dir_all(path).await {
        Ok(()) => Ok(()),
        Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(()),
        Err(e) => Err(e.into()),
    }
}

/// Copies a regular file, creating any parent directories of the
/// destination as necessary. Permission bits travel with the copy.
pub async fn copy_file(from: &Path, to: &Path) -> Result<()> {
    if !from.is_file() {
        return Err(Error::Generic(format!(
            "{} does not exist or is not a regular file",
            from.display()
        )));
    }
    if let Some(parent) = to.parent() {
        tokio::fs::create_dir_all(parent)
            .await
            .fs_context("creating parent directory", parent)?;
    }
    tokio::fs::copy(from, to)
        .await
        .fs_context("copying file", to)?;
    Ok(())
}

/// Recursively copies a directory tree.
///
/// Symlinks are preserved as symlinks, permission bits travel with each
/// entry, and the destination must not already exist.
pub async fn copy_dir(from: &Path, to: &Path) -> Result<()> {
    if !from.is_dir() {
        return Err(Error::Generic(format!(
            "{} does not exist or is not a directory",
            from.display()
        )));
    }
    if to.exists() {
        return Err(Error::Generic(format!(
            "copy destination already exists: {}",
            to.display()
        )));
    }

    let from = from.to_path_buf();
    let to = to.to_path_buf();
    tokio::task::spawn_blocking(move || copy_dir_sync(&from, &to))
        .await
        .map_err(|e| Error::Generic(format!("copy task panicked: {e}")))?
}

fn copy_dir_sync(from: &Path, to: &Path) -> Result<()> {
    std::fs::create_dir_all(to).fs_context("creating directory", to)?;

    for dirent in walkdir::WalkDir::new(from).follow_links(false).min_depth(1) {
        let dirent = dirent.map_err(|e| Error::Generic(format!("walking {}: {e}", from.display())))?;
        let rel = dirent
            .path()
            .strip_prefix(from)
            .map_err(|e| Error::Generic(format!("stripping copy prefix: {e}")))?;
        let dst = to.join(rel);

        let file_type = dirent.file_type();
        if file_type.is_dir() {
            std::fs::create_dir_all(&dst).fs_context("creating directory", &dst)?;
        } else if file_type.is_symlink() {
            let target = std::fs::read_link(dirent.path())
                .fs_context("reading symlink", dirent.path())?;
            #[cfg(unix)]
            std::os::unix::fs::symlink(&target, &dst).fs_context("creating symlink", &dst)?;
            #[cfg(not(unix))]
            {
                // Symlinks inside bundles are a unix concern; fall back to
                // copying the link target's content elsewhere.
                std::fs::copy(dirent.path(), &dst).fs_context("copying file", &dst)?;
            }
        } else {
            if let Some(parent) = dst.parent() {
                std::fs::create_dir_all(parent).fs_context("creating parent directory", parent)?;
            }
            std::fs::copy(dirent.path(), &dst).fs_context("copying file", &dst)?;
        }
    }
    Ok(())
}

/// Moves `from` into place at `to`, atomically when the filesystem allows.
///
/// Any existing entry at `to` is replaced only after the new content is
/// fully present: rename is used when possible, and the copy fallback for
/// cross-device moves goes through a sibling temp path.
pub async fn atomic_move(from: &Path, to: &Path) -> Result<()> {
    if let Some(parent) = to.parent() {
        tokio::fs::create_dir_all(parent)
            .await
            .fs_context("creating parent directory", parent)?;
    }

    if to.exists() {
        if to.is_dir() {
            remove_dir_all(to).await?;
        } else {
            tokio::fs::remove_file(to)
                .await
                .fs_context("removing stale artifact", to)?;
        }
    }

    match tokio::fs::rename(from, to).await {
        Ok(()) => Ok(()),
        Err(e) if e.raw_os_error() == Some(libc_exdev()) => {
            // Cross-device: copy to a temp sibling, then rename within the
            // destination filesystem.
            let tmp = to.with_extension("relkit-tmp");
            if from.is_dir() {
                remove_dir_all(&tmp).await?;
                copy_dir(from, &tmp).await?;
                remove_dir_all(from).await?;
            } else {
                copy_file(from, &tmp).await?;
                tokio::fs::remove_file(from)
                    .await
                    .fs_context("removing moved source", from)?;
            }
            tokio::fs::rename(&tmp, to)
                .await
                .fs_context("renaming into place", to)?;
            Ok(())
        }
        Err(e) => Err(Error::Generic(format!(
            "moving {} to {}: {e}",
            from.display(),
            to.display()
        ))),
    }
}

#[cfg(unix)]
fn libc_exdev() -> i32 {
    18 // EXDEV
}

#[cfg(not(unix))]
fn libc_exdev() -> i32 {
    17 // ERROR_CROSS_DEVICE maps differently; rename failure falls through
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn copy_dir_preserves_layout() {
        let src = tempfile::tempdir().expect("tempdir");
        std::fs::create_dir(src.path().join("sub")).expect("mkdir");
        std::fs::write(src.path().join("sub/a.txt"), b"a").expect("write");
        std::fs::write(src.path().join("top.txt"), b"t").expect("write");

        let dst_root = tempfile::tempdir().expect("tempdir");
        let dst = dst_root.path().join("copy");
        copy_dir(src.path(), &dst).await.expect("copy");

        assert_eq!(std::fs::read(dst.join("sub/a.txt")).expect("read"), b"a");
        assert_eq!(std::fs::read(dst.join("top.txt")).expect("read"), b"t");
    }

    #[tokio::test]
    async fn copy_dir_refuses_existing_destination() {
        let src = tempfile::tempdir().expect("tempdir");
        let dst = tempfile::tempdir().expect("tempdir");
        assert!(copy_dir(src.path(), dst.path()).await.is_err());
    }

    #[tokio::test]
    async fn atomic_move_replaces_directory() {
        let root = tempfile::tempdir().expect("tempdir");
        let staged = root.path().join("staged");
        std::fs::create_dir(&staged).expect("mkdir");
        std::fs::write(staged.join("f"), b"new").expect("write");

        let dest = root.path().join("final");
        std::fs::create_dir(&dest).expect("mkdir");
        std::fs::write(dest.join("old"), b"old").expect("write");

        atomic_move(&staged, &dest).await.expect("move");
        assert!(!staged.exists());
        assert!(dest.join("f").exists());
        assert!(!dest.join("old").exists());
    }
}
