//! # Watermark Store
//!
//! Per-entity "synchronized up to" timestamps, one small file each.
//!
//! ## On-Disk Layout
//! ```text
//! {sync_dir}/
//! ├── orders_last_sync.dat       "2025-07-08 10:15:00"
//! ├── customers_last_sync.dat    "2025-07-08 10:15:02"
//! └── sync.lock                  (cycle lock, see lock.rs)
//! ```
//!
//! ## Read Path
//! ```text
//! get(entity)
//!   1. value recorded in memory after a failed write   → that
//!   2. file present and parses                         → file value
//!   3. otherwise (missing, empty, garbage)             → default epoch
//! ```
//!
//! Writes go to a temporary file that is then renamed over the target, so
//! a crash never leaves a half-written timestamp behind.

use std::collections::HashMap;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use edgesync_core::entity::is_valid_identifier;
use edgesync_core::Timestamp;

use crate::error::{SyncError, SyncResult};

/// Suffix of every watermark file.
pub const WATERMARK_SUFFIX: &str = "_last_sync.dat";

/// Durable per-entity watermarks.
#[derive(Debug)]
pub struct WatermarkStore {
    dir: PathBuf,
    default_epoch: Timestamp,
    /// Values whose write failed; served by `get` until cleared.
    pending: Mutex<HashMap<String, Timestamp>>,
}

impl WatermarkStore {
    /// Creates a store rooted at `dir`. The directory is created on the
    /// first write.
    pub fn new(dir: impl Into<PathBuf>, default_epoch: Timestamp) -> Self {
        WatermarkStore {
            dir: dir.into(),
            default_epoch,
            pending: Mutex::new(HashMap::new()),
        }
    }

    /// Sync-data directory.
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Value returned for entities never synchronized.
    pub fn default_epoch(&self) -> Timestamp {
        self.default_epoch
    }

    fn path_for(&self, entity: &str) -> SyncResult<PathBuf> {
        if !is_valid_identifier(entity) {
            return Err(SyncError::InvalidEntityName(entity.to_string()));
        }
        Ok(self.dir.join(format!("{entity}{WATERMARK_SUFFIX}")))
    }

    /// Returns the entity's watermark. Never fails: anything unreadable
    /// counts as "never synced".
    pub async fn get(&self, entity: &str) -> Timestamp {
        if let Some(pending) = self.pending.lock().await.get(entity) {
            return *pending;
        }

        let path = match self.path_for(entity) {
            Ok(path) => path,
            Err(e) => {
                warn!(entity = %entity, error = %e, "Using default watermark");
                return self.default_epoch;
            }
        };

        match tokio::fs::read_to_string(&path).await {
            Ok(contents) => match Timestamp::parse_loose(&contents) {
                Some(ts) => ts,
                None => {
                    warn!(entity = %entity, ?path, "Unparseable watermark, treating as never synced");
                    self.default_epoch
                }
            },
            Err(e) if e.kind() == ErrorKind::NotFound => self.default_epoch,
            Err(e) => {
                warn!(entity = %entity, error = %e, "Failed to read watermark");
                self.default_epoch
            }
        }
    }

    /// Persists `value`. A failed write is logged and the value kept in
    /// memory instead.
    pub async fn set(&self, entity: &str, value: Timestamp) {
        match self.write(entity, value).await {
            Ok(()) => {
                self.pending.lock().await.remove(entity);
                debug!(entity = %entity, watermark = %value, "Watermark updated");
            }
            Err(e) => {
                warn!(
                    entity = %entity,
                    watermark = %value,
                    error = %e,
                    "Failed to persist watermark, keeping it in memory"
                );
                self.pending.lock().await.insert(entity.to_string(), value);
            }
        }
    }

    async fn write(&self, entity: &str, value: Timestamp) -> SyncResult<()> {
        let path = self.path_for(entity)?;
        tokio::fs::create_dir_all(&self.dir).await?;

        let tmp = path.with_extension("dat.tmp");
        tokio::fs::write(&tmp, value.to_canonical()).await?;
        tokio::fs::rename(&tmp, &path).await?;
        Ok(())
    }

    /// Sets the watermark only if `value` is later than the current one.
    /// Returns whether it moved.
    pub async fn advance(&self, entity: &str, value: Timestamp) -> bool {
        let current = self.get(entity).await;
        if value <= current {
            debug!(entity = %entity, current = %current, proposed = %value, "Watermark not advanced");
            return false;
        }
        self.set(entity, value).await;
        true
    }

    /// Forgets one entity's progress. Returns whether a file was removed.
    pub async fn reset(&self, entity: &str) -> SyncResult<bool> {
        let path = self.path_for(entity)?;
        self.pending.lock().await.remove(entity);

        match tokio::fs::remove_file(&path).await {
            Ok(()) => {
                info!(entity = %entity, "Watermark reset");
                Ok(true)
            }
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(false),
            Err(e) => Err(e.into()),
        }
    }

    /// Forgets every entity's progress. Only `*_last_sync.dat` files are
    /// touched. Returns the number of files removed.
    pub async fn reset_all(&self) -> SyncResult<usize> {
        self.pending.lock().await.clear();

        let mut entries = match tokio::fs::read_dir(&self.dir).await {
            Ok(entries) => entries,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(0),
            Err(e) => return Err(e.into()),
        };

        let mut removed = 0;
        while let Some(entry) = entries.next_entry().await? {
            let name = entry.file_name();
            let is_watermark = name
                .to_str()
                .is_some_and(|n| n.ends_with(WATERMARK_SUFFIX));
            if is_watermark {
                tokio::fs::remove_file(entry.path()).await?;
                removed += 1;
            }
        }

        info!(removed, "All watermarks reset");
        Ok(removed)
    }

    /// Drops in-memory fallbacks. Called at the end of a cycle.
    pub async fn clear_pending(&self) {
        self.pending.lock().await.clear();
    }

    /// Drops one entity's in-memory fallback, for writes made outside a cycle.
    pub async fn release_pending(&self, entity: &str) {
        self.pending.lock().await.remove(entity);
    }
}
