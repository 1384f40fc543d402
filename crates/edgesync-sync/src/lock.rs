//! # Cycle Lock
//!
//! Advisory file lock (`{sync_dir}/sync.lock`) held for the whole of one
//! sync cycle. It excludes concurrent cycles in this process as well as in
//! other processes sharing the sync-data directory.
//!
//! The lock is released when the [`CycleLock`] is dropped, including on
//! panic or early return.

use std::fs::{self, File, OpenOptions};
use std::path::{Path, PathBuf};

use fs2::FileExt;
use tracing::debug;

use crate::error::{SyncError, SyncResult};

/// Lock file name inside the sync-data directory.
pub const LOCK_FILE: &str = "sync.lock";

/// A held cycle lock.
#[derive(Debug)]
pub struct CycleLock {
    path: PathBuf,
    file: File,
}

impl CycleLock {
    /// Tries to take the lock without waiting.
    ///
    /// Returns `Ok(None)` when another cycle holds it.
    pub fn try_acquire(dir: &Path) -> SyncResult<Option<CycleLock>> {
        fs::create_dir_all(dir).map_err(|e| SyncError::LockFailed(e.to_string()))?;

        let path = dir.join(LOCK_FILE);
        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(false)
            .open(&path)
            .map_err(|e| SyncError::LockFailed(format!("{}: {e}", path.display())))?;

        match file.try_lock_exclusive() {
            Ok(()) => {
                debug!(?path, "Cycle lock acquired");
                Ok(Some(CycleLock { path, file }))
            }
            Err(e) if e.kind() == fs2::lock_contended_error().kind() => Ok(None),
            Err(e) => Err(SyncError::LockFailed(e.to_string())),
        }
    }

    /// Path of the lock file.
    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl Drop for CycleLock {
    fn drop(&mut self) {
        let _ = FileExt::unlock(&self.file);
        debug!(path = ?self.path, "Cycle lock released");
    }
}
