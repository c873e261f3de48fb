//! Artifact verification.
//!
//! SHA-256 digests of finished artifacts, the published digest record, and
//! the structural two-run determinism diff in [`diff`].

mod diff;

pub use diff::{Divergence, diff_artifact_sets};

use std::path::Path;

use sha2::{Digest, Sha256};
use tokio::io::AsyncReadExt;

use crate::pipeline::error::{Error, ErrorExt, Result};

/// Computes the SHA-256 digest of a file's bytes.
///
/// A pure function of content: identical bytes yield the identical
/// digest, and any single-bit change yields a different one. Reads in 8KB
/// chunks to handle large artifacts.
pub async fn digest(path: &Path) -> Result<String> {
    let mut file = tokio::fs::File::open(path)
        .await
        .fs_context("opening artifact for hashing", path)?;
    let mut hasher = Sha256::new();
    let mut buffer = vec![0u8; 8192];

    loop {
        let n = file
            .read(&mut buffer)
            .await
            .fs_context("reading artifact for hashing", path)?;
        if n == 0 {
            break;
        }
        hasher.update(&buffer[..n]);
    }

    Ok(hex::encode(hasher.finalize()))
}

/// Writes the digest record for every artifact in `dist_dir`.
///
/// One `<hex-digest>  <filename>` line per artifact, sorted by filename,
/// suitable for independent verification with standard tooling. Returns
/// the record path.
pub async fn write_digest_record(dist_dir: &Path) -> Result<std::path::PathBuf> {
    const RECORD_NAME: &str = "SHA256SUMS";

    let mut names = Vec::new();
    let mut entries = tokio::fs::read_dir(dist_dir)
        .await
        .fs_context("reading dist directory", dist_dir)?;
    while let Some(entry) = entries
        .next_entry()
        .await
        .fs_context("reading dist directory", dist_dir)?
    {
        let file_type = entry.file_type().await?;
        if !file_type.is_file() {
            continue;
        }
        let name = entry
            .file_name()
            .into_string()
            .map_err(|n| Error::Generic(format!("non-UTF-8 artifact name: {n:?}")))?;
        if name == RECORD_NAME {
            continue;
        }
        names.push(name);
    }
    names.sort();

    if names.is_empty() {
        return Err(Error::Generic(format!(
            "no artifacts to digest in {}",
            dist_dir.display()
        )));
    }

    let mut record = String::new();
    for name in &names {
        let hash = digest(&dist_dir.join(name)).await?;
        record.push_str(&format!("{hash}  {name}\n"));
    }

    let record_path = dist_dir.join(RECORD_NAME);
    tokio::fs::write(&record_path, record)
        .await
        .fs_context("writing digest record", &record_path)?;
    log::info!("✓ Digest record: {}", record_path.display());
    Ok(record_path)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn digest_is_pure_and_bit_sensitive() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("artifact.bin");

        std::fs::write(&path, b"release payload").expect("write");
        let first = digest(&path).await.expect("digest");
        let second = digest(&path).await.expect("digest");
        assert_eq!(first, second);

        // Flip one bit.
        let mut bytes = std::fs::read(&path).expect("read");
        bytes[0] ^= 0x01;
        std::fs::write(&path, bytes).expect("write");
        let flipped = digest(&path).await.expect("digest");
        assert_ne!(first, flipped);
    }

    #[tokio::test]
    async fn digest_record_is_sorted_and_complete() {
        let dir = tempfile::tempdir().expect("tempdir");
        std::fs::write(dir.path().join("b.zip"), b"bb").expect("write");
        std::fs::write(dir.path().join("a.dmg"), b"aa").expect("write");

        let record_path = write_digest_record(dir.path()).await.expect("record");
        let record = std::fs::read_to_string(record_path).expect("read");
        let lines: Vec<&str> = record.lines().collect();
        assert_eq!(lines.len(), 2);
        assert!(lines[0].ends_with("  a.dmg"));
        assert!(lines[1].ends_with("  b.zip"));
        // 64 hex chars, two spaces, name.
        assert_eq!(lines[0].split("  ").next().map(str::len), Some(64));
    }

    #[tokio::test]
    async fn empty_dist_is_an_error() {
        let dir = tempfile::tempdir().expect("tempdir");
        assert!(write_digest_record(dir.path()).await.is_err());
    }
}
