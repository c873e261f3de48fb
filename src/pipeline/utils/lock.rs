//! Advisory locking for the shared fetch cache.
//!
//! Concurrent runs on one host may share the read-only fetched dependency
//! cache. Populating an entry takes the exclusive lock; consumers take the
//! shared lock, so a half-written entry is never copied out.

use std::path::Path;

use crate::pipeline::error::{ErrorExt, Result};

/// Held advisory lock on a cache entry. Dropping releases the lock.
pub struct CacheLock {
    #[cfg(unix)]
    _flock: nix::fcntl::Flock<std::fs::File>,
    #[cfg(not(unix))]
    _file: std::fs::File,
}

fn lock_file(dir: &Path, name: &str) -> Result<std::fs::File> {
    std::fs::create_dir_all(dir).fs_context("creating cache directory", dir)?;
    let path = dir.join(format!(".{name}.lock"));
    std::fs::OpenOptions::new()
        .create(true)
        .truncate(false)
        .write(true)
        .open(&path)
        .fs_context("opening cache lock", &path)
}

#[cfg(unix)]
fn acquire(file: std::fs::File, arg: nix::fcntl::FlockArg) -> Result<CacheLock> {
    let flock = nix::fcntl::Flock::lock(file, arg)
        .map_err(|(_, errno)| crate::pipeline::Error::Generic(format!("cache lock: {errno}")))?;
    Ok(CacheLock { _flock: flock })
}

/// Takes the shared (read) lock on a cache entry.
#[cfg(unix)]
pub fn shared(dir: &Path, name: &str) -> Result<CacheLock> {
    acquire(lock_file(dir, name)?, nix::fcntl::FlockArg::LockShared)
}

/// Takes the exclusive (write) lock on a cache entry.
#[cfg(unix)]
pub fn exclusive(dir: &Path, name: &str) -> Result<CacheLock> {
    acquire(lock_file(dir, name)?, nix::fcntl::FlockArg::LockExclusive)
}

#[cfg(not(unix))]
pub fn shared(dir: &Path, name: &str) -> Result<CacheLock> {
    Ok(CacheLock {
        _file: lock_file(dir, name)?,
    })
}

#[cfg(not(unix))]
pub fn exclusive(dir: &Path, name: &str) -> Result<CacheLock> {
    Ok(CacheLock {
        _file: lock_file(dir, name)?,
    })
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;

    #[test]
    fn shared_locks_coexist() {
        let dir = tempfile::tempdir().expect("tempdir");
        let a = shared(dir.path(), "entry").expect("lock a");
        let b = shared(dir.path(), "entry").expect("lock b");
        drop(a);
        drop(b);
    }

    #[test]
    fn exclusive_lock_is_released_on_drop() {
        let dir = tempfile::tempdir().expect("tempdir");
        drop(exclusive(dir.path(), "entry").expect("first"));
        drop(exclusive(dir.path(), "entry").expect("second"));
    }
}
