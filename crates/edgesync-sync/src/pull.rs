//! # Pull Engine
//!
//! Master → edge for one entity.
//!
//! ## Pull Flow
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                      PullEngine::pull(entity, snapshot)                 │
//! │                                                                         │
//! │  GET {base}/pull/{entity}?since={snapshot}                             │
//! │     │                                                                   │
//! │     ├── non-2xx / not an array / timeout ──► failed, watermark kept    │
//! │     │                                                                   │
//! │     ▼                                                                   │
//! │  BEGIN                                                                  │
//! │    UpsertResolver::apply_batch(records, snapshot)                       │
//! │    (stale skipped, bad records rejected, batch continues)               │
//! │  COMMIT ──── failure ──► failed, watermark kept                        │
//! │     │                                                                   │
//! │     ▼                                                                   │
//! │  advance(entity, now)       (also when zero records were applied)      │
//! │  ok("Pulled N records for {entity}")                                   │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

use tracing::{info, warn};

use edgesync_core::{ApplyReport, EntityResult, Timestamp};
use edgesync_db::Database;

use crate::catalog::EntityDescriptor;
use crate::clock::Clock;
use crate::error::{SyncError, SyncResult};
use crate::resolver::UpsertResolver;
use crate::transport::RemoteTransport;
use crate::watermark::WatermarkStore;

/// Pulls one entity at a time from the master.
pub struct PullEngine<'a> {
    db: &'a Database,
    transport: &'a dyn RemoteTransport,
    watermarks: &'a WatermarkStore,
    clock: &'a dyn Clock,
    send_since: bool,
}

impl<'a> PullEngine<'a> {
    pub fn new(
        db: &'a Database,
        transport: &'a dyn RemoteTransport,
        watermarks: &'a WatermarkStore,
        clock: &'a dyn Clock,
        send_since: bool,
    ) -> Self {
        PullEngine {
            db,
            transport,
            watermarks,
            clock,
            send_since,
        }
    }

    /// Pulls `entity`, comparing inbound records against `snapshot` (the
    /// watermark read at cycle start).
    pub async fn pull(&self, entity: &EntityDescriptor, snapshot: Timestamp) -> EntityResult {
        match self.try_pull(entity, snapshot).await {
            Ok(report) => {
                self.watermarks.advance(&entity.name, self.clock.now()).await;

                let mut message = format!("Pulled {} records for {}", report.applied, entity.name);
                if report.stale > 0 || !report.rejected.is_empty() {
                    message.push_str(&format!(
                        " ({} stale, {} rejected)",
                        report.stale,
                        report.rejected.len()
                    ));
                }

                info!(
                    entity = %entity.name,
                    received = report.received,
                    applied = report.applied,
                    stale = report.stale,
                    rejected = report.rejected.len(),
                    "Pull complete"
                );
                EntityResult::ok(report.applied, message)
            }
            Err(e) => {
                warn!(entity = %entity.name, error = %e, "Pull failed");
                EntityResult::failed(e.to_string())
            }
        }
    }

    async fn try_pull(
        &self,
        entity: &EntityDescriptor,
        snapshot: Timestamp,
    ) -> SyncResult<ApplyReport> {
        if !entity.pulls() {
            return Err(SyncError::NotUpsertable(entity.name.clone()));
        }

        let since = self.send_since.then_some(snapshot);
        let records = self.transport.pull(&entity.name, since).await?;

        let repo = self.db.entity(&entity.table)?;
        let resolver = UpsertResolver::new(&repo, &entity.schema, snapshot);

        let mut tx = self.db.begin().await?;
        let report = resolver.apply_batch(&mut *tx, records).await?;
        tx.commit().await?;

        Ok(report)
    }
}
