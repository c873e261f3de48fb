//! Deterministic zip archiver.
//!
//! Serializes a normalized build tree into a single zip whose bytes are a
//! pure function of the tree's (path, content) set: entries appear in
//! canonical path order with canonical metadata and a fixed compression
//! level. Host enumeration order, build time and umask never reach the
//! archive. Any nondeterminism here invalidates every downstream
//! reproducibility guarantee, so the writer takes no options.

use std::io::{Read, Write};
use std::path::{Path, PathBuf};

use zip::write::SimpleFileOptions;
use zip::{CompressionMethod, ZipWriter};

use crate::pipeline::canonical::{ARCHIVE_COMPRESSION_LEVEL, canonical_zip_datetime};
use crate::pipeline::error::{Error, ErrorExt, Result};
use crate::pipeline::tree::{EntryKind, NormalizedTree};
use crate::pipeline::utils::fs;

/// Writes `tree` to a zip archive at `out_path`.
///
/// The tree is read-only here; only [`NormalizedTree`] is accepted, so a
/// tree with host-dependent metadata cannot reach the writer. Output goes
/// to a temp sibling first and is renamed into place on success.
pub async fn write_archive(tree: &NormalizedTree, out_path: &Path) -> Result<PathBuf> {
    log::info!("Archiving {} entries", tree.tree().entries().len());

    let tmp_path = out_path.with_extension("zip.partial");
    if let Some(parent) = out_path.parent() {
        tokio::fs::create_dir_all(parent)
            .await
            .fs_context("creating archive directory", parent)?;
    }

    let tree_clone = tree.clone();
    let tmp = tmp_path.clone();
    tokio::task::spawn_blocking(move || write_zip(&tree_clone, &tmp))
        .await
        .map_err(|e| Error::Generic(format!("archive task panicked: {e}")))??;

    fs::atomic_move(&tmp_path, out_path).await?;
    log::info!("✓ Archive written: {}", out_path.display());
    Ok(out_path.to_path_buf())
}

fn write_zip(tree: &NormalizedTree, out: &Path) -> Result<()> {
    let file = std::fs::File::create(out).fs_context("creating archive", out)?;
    let mut writer = ZipWriter::new(file);

    let base_options = SimpleFileOptions::default()
        .compression_method(CompressionMethod::Deflated)
        .compression_level(Some(ARCHIVE_COMPRESSION_LEVEL))
        .last_modified_time(canonical_zip_datetime());

    let inner = tree.tree();
    for entry in inner.entries() {
        let options = base_options.unix_permissions(entry.mode);
        match entry.kind {
            EntryKind::Dir => {
                writer
                    .add_directory(format!("{}/", entry.rel_path), options)
                    .map_err(|e| Error::Generic(format!("writing directory entry: {e}")))?;
            }
            EntryKind::File => {
                writer
                    .start_file(entry.rel_path.as_str(), options)
                    .map_err(|e| Error::Generic(format!("starting archive entry: {e}")))?;
                let src = inner.abs_path(entry);
                let mut reader =
                    std::fs::File::open(&src).fs_context("opening bundle file", &src)?;
                let mut buffer = [0u8; 8192];
                loop {
                    let n = reader.read(&mut buffer).fs_context("reading bundle file", &src)?;
                    if n == 0 {
                        break;
                    }
                    writer
                        .write_all(&buffer[..n])
                        .map_err(|e| Error::Generic(format!("writing archive entry: {e}")))?;
                }
            }
            EntryKind::Symlink => {
                let src = inner.abs_path(entry);
                let target = std::fs::read_link(&src).fs_context("reading symlink", &src)?;
                let target_str = target.to_str().ok_or_else(|| {
                    Error::Generic(format!("non-UTF-8 symlink target in {}", entry.rel_path))
                })?;
                writer
                    .add_symlink(entry.rel_path.as_str(), target_str, options)
                    .map_err(|e| Error::Generic(format!("writing symlink entry: {e}")))?;
            }
        }
    }

    writer
        .finish()
        .map_err(|e| Error::Generic(format!("finalizing archive: {e}")))?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pipeline::normalize;
    use crate::pipeline::tree::BuildTree;

    /// Builds a tree from (path, content) pairs, creating them in the
    /// order given, then normalizes it.
    fn normalized_fixture(
        dir: &Path,
        files: &[(&str, &[u8])],
    ) -> NormalizedTree {
        for (path, content) in files {
            let full = dir.join(path);
            if let Some(parent) = full.parent() {
                std::fs::create_dir_all(parent).expect("mkdir");
            }
            std::fs::write(&full, content).expect("write");
        }
        let tree = BuildTree::scan(dir).expect("scan");
        normalize::normalize(tree).expect("normalize")
    }

    #[tokio::test]
    async fn archive_is_independent_of_insertion_order() {
        // Host A inserts a/ then b/; host B inserts b/ then a/.
        let dir_a = tempfile::tempdir().expect("tempdir");
        let tree_a = normalized_fixture(
            dir_a.path(),
            &[("a/file.txt", b"hello"), ("b/file.txt", b"world")],
        );
        let dir_b = tempfile::tempdir().expect("tempdir");
        let tree_b = normalized_fixture(
            dir_b.path(),
            &[("b/file.txt", b"world"), ("a/file.txt", b"hello")],
        );

        let out = tempfile::tempdir().expect("tempdir");
        let zip_a = write_archive(&tree_a, &out.path().join("a.zip"))
            .await
            .expect("archive a");
        let zip_b = write_archive(&tree_b, &out.path().join("b.zip"))
            .await
            .expect("archive b");

        let bytes_a = std::fs::read(zip_a).expect("read a");
        let bytes_b = std::fs::read(zip_b).expect("read b");
        assert_eq!(bytes_a, bytes_b, "archives must be byte-identical");
    }

    #[tokio::test]
    async fn entries_appear_in_canonical_order() {
        let dir = tempfile::tempdir().expect("tempdir");
        let tree = normalized_fixture(
            dir.path(),
            &[("b/file.txt", b"world"), ("a/file.txt", b"hello")],
        );

        let out = tempfile::tempdir().expect("tempdir");
        let zip_path = write_archive(&tree, &out.path().join("t.zip"))
            .await
            .expect("archive");

        let file = std::fs::File::open(zip_path).expect("open");
        let mut archive = zip::ZipArchive::new(file).expect("parse");
        let names: Vec<String> = (0..archive.len())
            .map(|i| archive.by_index(i).expect("entry").name().to_string())
            .collect();
        assert_eq!(names, vec!["a/", "a/file.txt", "b/", "b/file.txt"]);

        let pos_a = names.iter().position(|n| n == "a/file.txt").expect("a");
        let pos_b = names.iter().position(|n| n == "b/file.txt").expect("b");
        assert!(pos_a < pos_b, "a/file.txt must precede b/file.txt");
    }

    #[tokio::test]
    async fn repeated_archiving_is_byte_identical() {
        let dir = tempfile::tempdir().expect("tempdir");
        let tree = normalized_fixture(dir.path(), &[("x.txt", b"payload")]);

        let out = tempfile::tempdir().expect("tempdir");
        let first = write_archive(&tree, &out.path().join("1.zip"))
            .await
            .expect("first");
        let second = write_archive(&tree, &out.path().join("2.zip"))
            .await
            .expect("second");
        assert_eq!(
            std::fs::read(first).expect("read"),
            std::fs::read(second).expect("read")
        );
    }

    #[tokio::test]
    async fn non_normalized_tree_is_refused() {
        use crate::pipeline::tree::NormalizedTree;

        let dir = tempfile::tempdir().expect("tempdir");
        std::fs::write(dir.path().join("f"), b"x").expect("write");
        let tree = BuildTree::scan(dir.path()).expect("scan");
        // The only route to write_archive is through NormalizedTree, and
        // verification rejects host metadata.
        assert!(NormalizedTree::verify(tree).is_err());
    }
}
