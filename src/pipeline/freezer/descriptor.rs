//! Pinned dependency descriptor.

use std::path::PathBuf;

use serde::Deserialize;
use sha2::{Digest, Sha256};

/// Declarative pin of the vendored third-party dependency.
///
/// Maps from the `[dependency]` section of `relkit.toml`. Immutable once
/// declared: the repository, the exact revision, and the ordered patch
/// series fully determine the frozen tree.
#[derive(Debug, Clone, Deserialize)]
pub struct PinnedDependency {
    /// Source repository URL.
    pub repository: String,

    /// Revision identifier (commit hash or tag) to check out.
    pub revision: String,

    /// Unified-diff patch files, applied in listed order. A patch that
    /// fails to apply is fatal, never skipped.
    #[serde(default)]
    pub patches: Vec<PathBuf>,

    /// The dependency's own build command, argv style, run in the patched
    /// tree. Treated as an opaque step; nonzero exit aborts the freeze.
    #[serde(default)]
    pub build: Option<Vec<String>>,
}

impl PinnedDependency {
    /// Stable cache entry name for this (repository, revision) pair.
    ///
    /// Patches are applied per run, never to the cache, so they do not
    /// participate in the key.
    pub fn cache_key(&self) -> String {
        let mut hasher = Sha256::new();
        hasher.update(self.repository.as_bytes());
        hasher.update(b"\0");
        hasher.update(self.revision.as_bytes());
        let digest = hasher.finalize();
        format!("dep-{}", hex::encode(&digest[..8]))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn descriptor(repo: &str, rev: &str) -> PinnedDependency {
        PinnedDependency {
            repository: repo.into(),
            revision: rev.into(),
            patches: vec![],
            build: None,
        }
    }

    #[test]
    fn cache_key_is_stable_and_pin_sensitive() {
        let a = descriptor("https://example.com/dep.git", "aaaa");
        let b = descriptor("https://example.com/dep.git", "aaaa");
        assert_eq!(a.cache_key(), b.cache_key());

        let other_rev = descriptor("https://example.com/dep.git", "bbbb");
        assert_ne!(a.cache_key(), other_rev.cache_key());

        let other_repo = descriptor("https://example.com/other.git", "aaaa");
        assert_ne!(a.cache_key(), other_repo.cache_key());
    }
}
