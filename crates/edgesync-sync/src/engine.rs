//! # Sync Engine
//!
//! Orchestrates one full sync cycle and serves the peer-facing operations
//! (status, reset, local pull/push) against the same catalog and
//! watermark store.
//!
//! ## Cycle State Machine
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                           SyncEngine::sync()                            │
//! │                                                                         │
//! │  Idle                                                                   │
//! │   │  try sync.lock ── held elsewhere ──► "sync already in progress"    │
//! │   ▼                                                                     │
//! │  ProbingNetwork ── offline ──► Done "offline, sync postponed"          │
//! │   │                            (no entity contacted)                    │
//! │   ▼                                                                     │
//! │  Discovering        catalog rebuilt, watermarks snapshotted            │
//! │   ▼                                                                     │
//! │  Pulling            every pullable entity, one after another           │
//! │   ▼                                                                     │
//! │  Pushing            every pushable entity, one after another           │
//! │   ▼                                                                     │
//! │  Done               CycleResult { success, message, pull, push }       │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Snapshot Ordering
//! Each entity's watermark is read once, before the pull phase. Pull
//! staleness checks and push change selection both compare against that
//! snapshot, so local edits made since the previous cycle are pushed even
//! when the pull in between advanced the watermark.
//!
//! A cycle never returns an error: every failure ends up in the
//! [`CycleResult`].

use std::collections::{BTreeMap, HashMap};
use std::path::PathBuf;
use std::sync::Arc;

use serde::Serialize;
use serde_json::Value;
use tokio::sync::RwLock;
use tracing::{debug, error, info, info_span, warn, Instrument};
use uuid::Uuid;

use edgesync_core::{
    CycleResult, EntityResult, EntityStatus, PhaseReport, Record, Timestamp,
};
use edgesync_db::Database;

use crate::catalog::{Catalog, EntityCatalog, EntityDescriptor};
use crate::clock::{Clock, SystemClock};
use crate::config::SyncConfig;
use crate::error::{SyncError, SyncResult};
use crate::lock::CycleLock;
use crate::probe::{NetworkProbe, TcpProbe};
use crate::pull::PullEngine;
use crate::push::PushEngine;
use crate::resolver::UpsertResolver;
use crate::transport::{HttpTransport, RemoteTransport};
use crate::watermark::WatermarkStore;

// =============================================================================
// Cycle Phase
// =============================================================================

/// Where the engine is within a cycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum CyclePhase {
    #[default]
    Idle,
    ProbingNetwork,
    Discovering,
    Pulling,
    Pushing,
    Done,
}

impl std::fmt::Display for CyclePhase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            CyclePhase::Idle => write!(f, "idle"),
            CyclePhase::ProbingNetwork => write!(f, "probing_network"),
            CyclePhase::Discovering => write!(f, "discovering"),
            CyclePhase::Pulling => write!(f, "pulling"),
            CyclePhase::Pushing => write!(f, "pushing"),
            CyclePhase::Done => write!(f, "done"),
        }
    }
}

// =============================================================================
// Peer Push Receipt
// =============================================================================

/// Outcome of records pushed to this instance by a peer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PushReceipt {
    pub processed: usize,
    pub total_received: usize,
    pub stale: usize,
    pub errors: Vec<String>,
}

// =============================================================================
// Sync Engine
// =============================================================================

/// The sync engine. Share it behind an `Arc`.
pub struct SyncEngine {
    db: Database,
    catalog: EntityCatalog,
    watermarks: WatermarkStore,
    transport: Option<Arc<dyn RemoteTransport>>,
    probe: Arc<dyn NetworkProbe>,
    clock: Arc<dyn Clock>,
    sync_dir: PathBuf,
    send_since: bool,
    phase: RwLock<CyclePhase>,
}

impl SyncEngine {
    /// Current cycle phase.
    pub async fn phase(&self) -> CyclePhase {
        *self.phase.read().await
    }

    async fn set_phase(&self, phase: CyclePhase) {
        debug!(phase = %phase, "Cycle phase");
        *self.phase.write().await = phase;
    }

    /// Watermark store backing this engine.
    pub fn watermarks(&self) -> &WatermarkStore {
        &self.watermarks
    }

    /// Database backing this engine.
    pub fn database(&self) -> &Database {
        &self.db
    }

    // =========================================================================
    // Full Cycle
    // =========================================================================

    /// Runs one full cycle: lock, probe, discover, pull all, push all.
    pub async fn sync(&self) -> CycleResult {
        let cycle_id = Uuid::new_v4();
        let span = info_span!("sync_cycle", cycle_id = %cycle_id);
        self.run_cycle().instrument(span).await
    }

    async fn run_cycle(&self) -> CycleResult {
        let _lock = match CycleLock::try_acquire(&self.sync_dir) {
            Ok(Some(lock)) => lock,
            Ok(None) => {
                info!("Another sync cycle holds the lock");
                return CycleResult::in_progress();
            }
            Err(e) => {
                error!(error = %e, "Could not take the sync lock");
                return CycleResult::aborted(e.to_string());
            }
        };

        let Some(transport) = self.transport.as_deref() else {
            warn!("No remote configured, cycle skipped");
            return CycleResult::aborted("Remote base URL is not configured");
        };

        info!("Sync cycle starting");

        self.set_phase(CyclePhase::ProbingNetwork).await;
        if !self.probe.is_online().await {
            info!("Offline, sync postponed");
            self.set_phase(CyclePhase::Done).await;
            return CycleResult::offline();
        }

        self.set_phase(CyclePhase::Discovering).await;
        let catalog = self.catalog.discover().await;
        let snapshot = self.snapshot(&catalog).await;

        self.set_phase(CyclePhase::Pulling).await;
        let puller = PullEngine::new(
            &self.db,
            transport,
            &self.watermarks,
            self.clock.as_ref(),
            self.send_since,
        );
        let mut pulled = BTreeMap::new();
        for entity in catalog.iter().filter(|e| e.pulls()) {
            let result = puller.pull(entity, snapshot_of(&snapshot, entity)).await;
            pulled.insert(entity.name.clone(), result);
        }
        let pull = PhaseReport::aggregate("Pulled", pulled);

        self.set_phase(CyclePhase::Pushing).await;
        let pusher = PushEngine::new(&self.db, transport, &self.watermarks, self.clock.as_ref());
        let mut pushed: BTreeMap<String, EntityResult> = BTreeMap::new();
        for entity in catalog.iter() {
            if !entity.pushes() {
                debug!(entity = %entity.name, "Entity not pushable, skipped");
                continue;
            }
            let result = pusher.push(entity, snapshot_of(&snapshot, entity)).await;
            pushed.insert(entity.name.clone(), result);
        }
        let push = PhaseReport::aggregate("Pushed", pushed);

        self.watermarks.clear_pending().await;
        self.set_phase(CyclePhase::Done).await;

        let result = CycleResult::completed(pull, push);
        info!(
            success = result.success,
            pull_success = result.pull.as_ref().is_some_and(|p| p.success),
            push_success = result.push.as_ref().is_some_and(|p| p.success),
            "{}",
            result.message
        );
        result
    }

    async fn snapshot(&self, catalog: &Catalog) -> HashMap<String, Timestamp> {
        let mut snapshot = HashMap::with_capacity(catalog.len());
        for entity in catalog.iter() {
            let watermark = self.watermarks.get(&entity.name).await;
            snapshot.insert(entity.name.clone(), watermark);
        }
        snapshot
    }

    // =========================================================================
    // Status, Tables, Reset
    // =========================================================================

    /// Discovers the current catalog.
    pub async fn tables(&self) -> Catalog {
        self.catalog.discover().await
    }

    /// Status of every discovered entity.
    pub async fn status(&self) -> BTreeMap<String, EntityStatus> {
        let catalog = self.catalog.discover().await;
        let mut status = BTreeMap::new();
        for entity in catalog.iter() {
            status.insert(entity.name.clone(), self.describe(entity).await);
        }
        status
    }

    /// Status of one entity.
    pub async fn entity_status(&self, name: &str) -> SyncResult<EntityStatus> {
        let catalog = self.catalog.discover().await;
        let entity = catalog.require(name)?;
        Ok(self.describe(entity).await)
    }

    async fn describe(&self, entity: &EntityDescriptor) -> EntityStatus {
        let last_sync = self.watermarks.get(&entity.name).await;

        let counts = async {
            let repo = self.catalog.repository(entity)?;
            let total = repo.count().await?;
            let pending = if entity.capabilities.queryable {
                repo.count_changed_since(&entity.schema, last_sync).await?
            } else {
                0
            };
            Ok::<_, SyncError>((total, pending))
        };

        match counts.await {
            Ok((total_records, pending_sync)) => EntityStatus {
                model: entity.model.clone(),
                last_sync,
                total_records,
                pending_sync,
                error: None,
            },
            Err(e) => {
                warn!(entity = %entity.name, error = %e, "Could not read entity counts");
                EntityStatus {
                    model: entity.model.clone(),
                    last_sync,
                    total_records: 0,
                    pending_sync: 0,
                    error: Some(e.to_string()),
                }
            }
        }
    }

    /// Forgets one entity's progress, or every entity's when `name` is
    /// `None`. Returns the number of watermark files removed.
    pub async fn reset(&self, name: Option<&str>) -> SyncResult<usize> {
        match name {
            Some(name) => {
                if self.catalog.registry().get(name).is_none() {
                    return Err(SyncError::UnknownEntity(name.to_string()));
                }
                let removed = self.watermarks.reset(name).await?;
                Ok(usize::from(removed))
            }
            None => self.watermarks.reset_all().await,
        }
    }

    // =========================================================================
    // Peer Operations
    // =========================================================================

    /// Records of `name` changed after `since`, or after this instance's
    /// own watermark when `since` is absent.
    pub async fn serve_pull(&self, name: &str, since: Option<Timestamp>) -> SyncResult<Vec<Record>> {
        let catalog = self.catalog.discover().await;
        let entity = catalog.require(name)?;
        if !entity.capabilities.queryable {
            return Err(SyncError::NotQueryable(name.to_string()));
        }

        let since = match since {
            Some(since) => since,
            None => self.watermarks.get(name).await,
        };

        let repo = self.catalog.repository(entity)?;
        let mut records = repo.changed_since(&entity.schema, since).await?;
        for record in &mut records {
            record.normalize_dates();
        }

        info!(entity = %name, since = %since, count = records.len(), "Served pull");
        Ok(records)
    }

    /// Applies records pushed by a peer. The batch runs in one
    /// transaction; the watermark advances when anything was applied.
    pub async fn serve_push(&self, name: &str, values: Vec<Value>) -> SyncResult<PushReceipt> {
        let catalog = self.catalog.discover().await;
        let entity = catalog.require(name)?;
        if !entity.pulls() {
            return Err(SyncError::NotUpsertable(name.to_string()));
        }

        let watermark = self.watermarks.get(name).await;
        let repo = self.catalog.repository(entity)?;
        let resolver = UpsertResolver::new(&repo, &entity.schema, watermark);

        let mut tx = self.db.begin().await?;
        let report = resolver.apply_batch(&mut *tx, values).await?;
        tx.commit().await?;

        if report.applied > 0 {
            self.watermarks.advance(name, self.clock.now()).await;
            // No cycle end will clear a fallback left by a failed write here
            self.watermarks.release_pending(name).await;
        }

        info!(
            entity = %name,
            processed = report.applied,
            received = report.received,
            errors = report.rejected.len(),
            "Served push"
        );

        Ok(PushReceipt {
            processed: report.applied,
            total_received: report.received,
            stale: report.stale,
            errors: report.error_messages(),
        })
    }
}

fn snapshot_of(snapshot: &HashMap<String, Timestamp>, entity: &EntityDescriptor) -> Timestamp {
    snapshot
        .get(&entity.name)
        .copied()
        .unwrap_or_else(Timestamp::default_epoch)
}

// =============================================================================
// Builder Pattern
// =============================================================================

/// Builder for creating a SyncEngine with injected collaborators.
pub struct SyncEngineBuilder {
    config: SyncConfig,
    db: Option<Database>,
    transport: Option<Arc<dyn RemoteTransport>>,
    probe: Option<Arc<dyn NetworkProbe>>,
    clock: Option<Arc<dyn Clock>>,
}

impl SyncEngineBuilder {
    /// Creates a new builder with the given config.
    pub fn new(config: SyncConfig) -> Self {
        SyncEngineBuilder {
            config,
            db: None,
            transport: None,
            probe: None,
            clock: None,
        }
    }

    /// Sets the database connection.
    pub fn with_database(mut self, db: Database) -> Self {
        self.db = Some(db);
        self
    }

    /// Replaces the HTTP transport.
    pub fn with_transport(mut self, transport: Arc<dyn RemoteTransport>) -> Self {
        self.transport = Some(transport);
        self
    }

    /// Replaces the TCP connectivity probe.
    pub fn with_probe(mut self, probe: Arc<dyn NetworkProbe>) -> Self {
        self.probe = Some(probe);
        self
    }

    /// Replaces the system clock.
    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = Some(clock);
        self
    }

    /// Builds the SyncEngine.
    ///
    /// Without an explicit transport, an HTTP transport is created when
    /// `remote.base_url` is set. Without either, cycles are refused but
    /// status, reset and peer operations still work.
    pub fn build(self) -> SyncResult<SyncEngine> {
        let config = self.config;
        config.validate()?;

        let db = self
            .db
            .ok_or_else(|| SyncError::InvalidConfig("Database required".into()))?;

        let transport = match self.transport {
            Some(transport) => Some(transport),
            None if config.remote.base_url.is_some() => {
                let http = HttpTransport::new(config.base_url()?, config.remote_timeout())?;
                Some(Arc::new(http) as Arc<dyn RemoteTransport>)
            }
            None => None,
        };

        let probe = self
            .probe
            .unwrap_or_else(|| Arc::new(TcpProbe::from_settings(&config.probe)));
        let clock = self.clock.unwrap_or_else(|| Arc::new(SystemClock));

        let sync_dir = config.sync_dir();
        let watermarks = WatermarkStore::new(&sync_dir, config.watermark.default_epoch);
        let catalog = EntityCatalog::new(
            db.clone(),
            config.registry(),
            config.catalog.denylist.clone(),
        );

        Ok(SyncEngine {
            db,
            catalog,
            watermarks,
            transport,
            probe,
            clock,
            sync_dir,
            send_since: config.remote.send_since,
            phase: RwLock::new(CyclePhase::Idle),
        })
    }
}
