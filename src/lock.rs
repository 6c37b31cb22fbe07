//! Cross-process crawl locks
//!
//! Two harvesters pointed at the same repository path would index the same
//! revisions twice and race on the checkpoint file. Each crawl key gets an
//! advisory `flock()` on a file named after its hash.

use anyhow::{Context, Result};
use fs2::FileExt;
use sha2::{Digest, Sha256};
use std::fs::{self, File};
use std::path::{Path, PathBuf};

fn lock_file_path(dir: &Path, key: &str) -> PathBuf {
    let mut hasher = Sha256::new();
    hasher.update(key.as_bytes());
    let hash = format!("{:x}", hasher.finalize());
    dir.join(format!("{}.lock", &hash[..16]))
}

/// Exclusive lock on one crawl key, released on drop
///
/// The OS releases the lock if the process dies, so a stale file never
/// blocks later runs.
#[derive(Debug)]
pub struct CrawlLock {
    _file: File,
    path: PathBuf,
}

impl CrawlLock {
    /// Try to lock `key` in the default lock directory
    pub fn try_acquire(key: &str) -> Result<Option<Self>> {
        Self::try_acquire_in(&crate::paths::PlatformPaths::default_lock_dir(), key)
    }

    /// Non-blocking: `Ok(None)` when another process holds the lock
    pub fn try_acquire_in(dir: &Path, key: &str) -> Result<Option<Self>> {
        let path = lock_file_path(dir, key);

        fs::create_dir_all(dir).context("Failed to create lock directory")?;
        let file = File::create(&path).context("Failed to create lock file")?;

        match file.try_lock_exclusive() {
            Ok(()) => {
                tracing::debug!("Acquired crawl lock for {} ({:?})", key, path);
                Ok(Some(Self { _file: file, path }))
            }
            Err(e) if e.kind() == std::io::ErrorKind::WouldBlock => {
                tracing::debug!("Crawl lock for {} is held elsewhere ({:?})", key, path);
                Ok(None)
            }
            Err(e) => Err(e).context("Failed to acquire crawl lock"),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl Drop for CrawlLock {
    fn drop(&mut self) {
        tracing::debug!("Releasing crawl lock {:?}", self.path);
    }
}
