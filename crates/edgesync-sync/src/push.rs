//! # Push Engine
//!
//! Edge → master for one entity.
//!
//! ## Push Flow
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                      PushEngine::push(entity, snapshot)                 │
//! │                                                                         │
//! │  SELECT * WHERE created_at > snapshot OR updated_at > snapshot          │
//! │     │                                                                   │
//! │     ├── no rows ──► ok(0, "No changes to push"), no request,           │
//! │     │               watermark untouched                                 │
//! │     ▼                                                                   │
//! │  normalize date fields                                                  │
//! │  POST {base}/push/{entity}  [records]                                  │
//! │     │                                                                   │
//! │     ├── non-2xx / timeout ──► failed, watermark kept                   │
//! │     ▼                                                                   │
//! │  advance(entity, now)                                                   │
//! │  ok("Pushed N records for {entity}")                                   │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

use tracing::{debug, info, warn};

use edgesync_core::{EntityResult, Record, Timestamp};
use edgesync_db::Database;

use crate::catalog::EntityDescriptor;
use crate::clock::Clock;
use crate::error::{SyncError, SyncResult};
use crate::transport::RemoteTransport;
use crate::watermark::WatermarkStore;

/// Pushes one entity at a time to the master.
pub struct PushEngine<'a> {
    db: &'a Database,
    transport: &'a dyn RemoteTransport,
    watermarks: &'a WatermarkStore,
    clock: &'a dyn Clock,
}

impl<'a> PushEngine<'a> {
    pub fn new(
        db: &'a Database,
        transport: &'a dyn RemoteTransport,
        watermarks: &'a WatermarkStore,
        clock: &'a dyn Clock,
    ) -> Self {
        PushEngine {
            db,
            transport,
            watermarks,
            clock,
        }
    }

    /// Pushes rows of `entity` changed after `snapshot`.
    pub async fn push(&self, entity: &EntityDescriptor, snapshot: Timestamp) -> EntityResult {
        let records = match self.local_changes(entity, snapshot).await {
            Ok(records) => records,
            Err(e) => {
                warn!(entity = %entity.name, error = %e, "Could not read local changes");
                return EntityResult::failed(e.to_string());
            }
        };

        if records.is_empty() {
            debug!(entity = %entity.name, "Nothing to push");
            return EntityResult::ok(0, format!("No changes to push for {}", entity.name));
        }

        let count = records.len();
        if let Err(e) = self.transport.push(&entity.name, &records).await {
            warn!(entity = %entity.name, count, error = %e, "Push failed");
            return EntityResult::failed(e.to_string());
        }

        self.watermarks.advance(&entity.name, self.clock.now()).await;

        info!(entity = %entity.name, count, "Push complete");
        EntityResult::ok(count, format!("Pushed {} records for {}", count, entity.name))
    }

    async fn local_changes(
        &self,
        entity: &EntityDescriptor,
        snapshot: Timestamp,
    ) -> SyncResult<Vec<Record>> {
        if !entity.capabilities.queryable {
            return Err(SyncError::NotQueryable(entity.name.clone()));
        }

        let repo = self.db.entity(&entity.table)?;
        let mut records = repo.changed_since(&entity.schema, snapshot).await?;

        for record in &mut records {
            let dropped = record.normalize_dates();
            if !dropped.is_empty() {
                debug!(entity = %entity.name, fields = ?dropped, "Dropped unparseable local dates");
            }
        }

        Ok(records)
    }
}
