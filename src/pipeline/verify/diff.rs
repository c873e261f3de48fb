//! Structural diff of two artifact sets.
//!
//! The determinism test needs more than a pass/fail bit: every divergence
//! is reported as (path, field, value-A, value-B) so the operator can
//! localize the source of nondeterminism without re-running the pipeline.

use std::collections::BTreeMap;
use std::path::Path;

use serde::Serialize;

use crate::pipeline::error::Result;
use crate::pipeline::tree::{BuildTree, EntryKind};

/// One detected difference between two pipeline runs.
#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct Divergence {
    /// Relative path of the differing entry.
    pub path: String,
    /// Which aspect differs: `presence`, `kind`, `size`, `mode`, `content`.
    pub field: String,
    /// Value observed in run A.
    pub value_a: String,
    /// Value observed in run B.
    pub value_b: String,
}

impl Divergence {
    fn new(path: &str, field: &str, value_a: impl ToString, value_b: impl ToString) -> Self {
        Self {
            path: path.to_string(),
            field: field.to_string(),
            value_a: value_a.to_string(),
            value_b: value_b.to_string(),
        }
    }
}

/// Structurally compares the artifact sets under `dir_a` and `dir_b`.
///
/// Returns every divergence found: paths present on one side only, kind
/// or metadata mismatches, and content differences with the first
/// differing byte offset. An empty result means the sets are
/// byte-for-byte identical.
pub fn diff_artifact_sets(dir_a: &Path, dir_b: &Path) -> Result<Vec<Divergence>> {
    let tree_a = BuildTree::scan(dir_a)?;
    let tree_b = BuildTree::scan(dir_b)?;
    let mut report = Vec::new();

    let by_path_a: BTreeMap<&str, &crate::pipeline::tree::TreeEntry> = tree_a
        .entries()
        .iter()
        .map(|e| (e.rel_path.as_str(), e))
        .collect();
    let by_path_b: BTreeMap<&str, &crate::pipeline::tree::TreeEntry> = tree_b
        .entries()
        .iter()
        .map(|e| (e.rel_path.as_str(), e))
        .collect();

    for path in by_path_a.keys() {
        if !by_path_b.contains_key(path) {
            report.push(Divergence::new(path, "presence", "present", "missing"));
        }
    }
    for path in by_path_b.keys() {
        if !by_path_a.contains_key(path) {
            report.push(Divergence::new(path, "presence", "missing", "present"));
        }
    }

    for (path, entry_a) in &by_path_a {
        let Some(entry_b) = by_path_b.get(path) else {
            continue;
        };

        if entry_a.kind != entry_b.kind {
            report.push(Divergence::new(
                path,
                "kind",
                format!("{:?}", entry_a.kind),
                format!("{:?}", entry_b.kind),
            ));
            continue;
        }

        if entry_a.mode != entry_b.mode {
            report.push(Divergence::new(
                path,
                "mode",
                format!("{:o}", entry_a.mode),
                format!("{:o}", entry_b.mode),
            ));
        }

        if entry_a.kind != EntryKind::File {
            continue;
        }

        if entry_a.size != entry_b.size {
            report.push(Divergence::new(path, "size", entry_a.size, entry_b.size));
            continue;
        }

        if let Some(offset) = first_differing_offset(
            &tree_a.abs_path(entry_a),
            &tree_b.abs_path(entry_b),
        )? {
            report.push(Divergence::new(
                path,
                "content",
                format!("differs at byte {offset}"),
                format!("differs at byte {offset}"),
            ));
        }
    }

    // Report order follows canonical path order.
    report.sort_by(|a, b| a.path.cmp(&b.path).then_with(|| a.field.cmp(&b.field)));
    Ok(report)
}

/// Byte offset of the first difference between two same-sized files, or
/// `None` when they are identical.
fn first_differing_offset(path_a: &Path, path_b: &Path) -> Result<Option<u64>> {
    use std::io::Read;

    let mut file_a = std::fs::File::open(path_a)?;
    let mut file_b = std::fs::File::open(path_b)?;
    let mut buf_a = [0u8; 8192];
    let mut buf_b = [0u8; 8192];
    let mut offset: u64 = 0;

    loop {
        let n_a = file_a.read(&mut buf_a)?;
        let n_b = file_b.read(&mut buf_b)?;
        let n = n_a.min(n_b);
        for i in 0..n {
            if buf_a[i] != buf_b[i] {
                return Ok(Some(offset + i as u64));
            }
        }
        if n_a != n_b {
            return Ok(Some(offset + n as u64));
        }
        if n == 0 {
            return Ok(None);
        }
        offset += n as u64;
    }
}
