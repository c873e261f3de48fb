//! Build tree model.
//!
//! A [`BuildTree`] is the ordered set of entries under a bundle root:
//! relative path, kind, mode bits, modification time and size. Entries are
//! always held in canonical (lexicographic, case-sensitive) path order,
//! independent of the order the host filesystem enumerates them in, so
//! every consumer sees the same sequence on every machine.

use std::path::{Path, PathBuf};

use crate::bail;
use crate::pipeline::canonical::{
    CANONICAL_DIR_MODE, CANONICAL_EXEC_MODE, CANONICAL_FILE_MODE, CANONICAL_MTIME,
};
use crate::pipeline::error::{Error, ErrorExt, Result};

/// Entry kind within a build tree.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EntryKind {
    /// Regular file
    File,
    /// Directory
    Dir,
    /// Symbolic link
    Symlink,
}

/// One entry of a build tree.
#[derive(Debug, Clone)]
pub struct TreeEntry {
    /// Path relative to the tree root, `/`-separated.
    pub rel_path: String,
    /// Entry kind.
    pub kind: EntryKind,
    /// Permission bits (low 12 bits of the unix mode).
    pub mode: u32,
    /// Modification time, seconds since the unix epoch.
    pub mtime: i64,
    /// Content size in bytes (0 for directories).
    pub size: u64,
}

impl TreeEntry {
    /// Whether this entry already carries canonical metadata.
    pub fn is_canonical(&self) -> bool {
        let mode_ok = match self.kind {
            EntryKind::Dir => self.mode == CANONICAL_DIR_MODE,
            EntryKind::File => {
                self.mode == CANONICAL_FILE_MODE || self.mode == CANONICAL_EXEC_MODE
            }
            // Symlink modes are not meaningful on most filesystems.
            EntryKind::Symlink => true,
        };
        mode_ok && self.mtime == CANONICAL_MTIME
    }
}

/// An ordered snapshot of the directory tree rooted at `root`.
///
/// The snapshot is read-only; mutating stages (the normalizer) rewrite the
/// filesystem and re-scan. Entry order is stable across hosts because it is
/// derived from path bytes, never from directory enumeration order.
#[derive(Debug, Clone)]
pub struct BuildTree {
    root: PathBuf,
    entries: Vec<TreeEntry>,
}

impl BuildTree {
    /// Scans `root` and produces the canonical-ordered entry set.
    ///
    /// The root directory itself is not an entry. Paths must be valid UTF-8;
    /// anything else cannot be represented portably in an archive manifest
    /// and is rejected.
    pub fn scan(root: &Path) -> Result<Self> {
        if !root.is_dir() {
            bail!("build tree root is not a directory: {}", root.display());
        }

        let mut entries = Vec::new();
        for dirent in walkdir::WalkDir::new(root).follow_links(false).min_depth(1) {
            let dirent =
                dirent.map_err(|e| Error::Generic(format!("walking build tree: {e}")))?;

            let rel = dirent
                .path()
                .strip_prefix(root)
                .map_err(|e| Error::Generic(format!("stripping tree root: {e}")))?;
            let Some(rel_path) = rel.to_str().map(normalize_separators) else {
                bail!("non-UTF-8 path in build tree: {}", rel.display());
            };

            let file_type = dirent.file_type();
            let kind = if file_type.is_dir() {
                EntryKind::Dir
            } else if file_type.is_symlink() {
                EntryKind::Symlink
            } else {
                EntryKind::File
            };

            let metadata = std::fs::symlink_metadata(dirent.path())
                .fs_context("reading entry metadata", dirent.path())?;

            entries.push(TreeEntry {
                rel_path,
                kind,
                mode: mode_bits(&metadata),
                mtime: mtime_secs(&metadata)?,
                size: if kind == EntryKind::File {
                    metadata.len()
                } else {
                    0
                },
            });
        }

        entries.sort_by(|a, b| a.rel_path.cmp(&b.rel_path));

        Ok(Self {
            root: root.to_path_buf(),
            entries,
        })
    }

    /// Tree root on disk.
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Entries in canonical path order.
    pub fn entries(&self) -> &[TreeEntry] {
        &self.entries
    }

    /// Absolute path of an entry.
    pub fn abs_path(&self, entry: &TreeEntry) -> PathBuf {
        self.root.join(&entry.rel_path)
    }

    /// Whether every entry already carries canonical metadata.
    pub fn is_normalized(&self) -> bool {
        self.entries.iter().all(TreeEntry::is_canonical)
    }

    /// First entry violating canonical metadata, with the offending field.
    pub fn first_non_canonical(&self) -> Option<(String, String)> {
        for entry in &self.entries {
            if entry.mtime != CANONICAL_MTIME {
                return Some((
                    entry.rel_path.clone(),
                    format!("mtime {} != {}", entry.mtime, CANONICAL_MTIME),
                ));
            }
            if !entry.is_canonical() {
                return Some((entry.rel_path.clone(), format!("mode {:o}", entry.mode)));
            }
        }
        None
    }
}

/// A build tree whose metadata has been verified canonical.
///
/// The archiver and installer generators only accept this type, so a tree
/// cannot structurally reach them without passing through normalization
/// (or the explicit [`NormalizedTree::verify`] check).
#[derive(Debug, Clone)]
pub struct NormalizedTree(BuildTree);

impl NormalizedTree {
    /// Checks that `tree` carries canonical metadata everywhere.
    ///
    /// Returns [`Error::TreeNotNormalized`] naming the first offending
    /// entry otherwise.
    pub fn verify(tree: BuildTree) -> Result<Self> {
        if let Some((path, detail)) = tree.first_non_canonical() {
            return Err(Error::TreeNotNormalized {
                root: tree.root().to_path_buf(),
                detail: format!("{path}: {detail}"),
            });
        }
        Ok(Self(tree))
    }

    /// The verified tree.
    pub fn tree(&self) -> &BuildTree {
        &self.0
    }
}

fn normalize_separators(path: &str) -> String {
    if std::path::MAIN_SEPARATOR == '/' {
        path.to_string()
    } else {
        path.replace(std::path::MAIN_SEPARATOR, "/")
    }
}

#[cfg(unix)]
fn mode_bits(metadata: &std::fs::Metadata) -> u32 {
    use std::os::unix::fs::MetadataExt;
    metadata.mode() & 0o7777
}

#[cfg(not(unix))]
fn mode_bits(metadata: &std::fs::Metadata) -> u32 {
    if metadata.is_dir() {
        CANONICAL_DIR_MODE
    } else {
        CANONICAL_FILE_MODE
    }
}

fn mtime_secs(metadata: &std::fs::Metadata) -> Result<i64> {
    let modified = metadata
        .modified()
        .map_err(|e| Error::Generic(format!("filesystem has no mtime support: {e}")))?;
    let secs = match modified.duration_since(std::time::UNIX_EPOCH) {
        Ok(d) => d.as_secs() as i64,
        Err(e) => -(e.duration().as_secs() as i64),
    };
    Ok(secs)
}
