//! # edgesync-sync: Edge ↔ Master Sync Engine
//!
//! This crate replicates rows of the host application's tables between an
//! edge instance and a central master over HTTP, in both directions, on a
//! schedule, tolerating intermittent connectivity.
//!
//! ## Architecture Overview
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                        Sync Engine Architecture                         │
//! │                                                                         │
//! │  ┌──────────────────────────────────────────────────────────────────┐  │
//! │  │                 SyncEngine (Cycle Orchestrator)                  │  │
//! │  │                                                                  │  │
//! │  │  sync.lock → probe → discover → pull all → push all → result    │  │
//! │  └────────────────────────────┬─────────────────────────────────────┘  │
//! │                               │                                         │
//! │         ┌─────────────────────┼─────────────────────┐                  │
//! │         ▼                     ▼                     ▼                   │
//! │  ┌────────────────┐  ┌────────────────┐  ┌────────────────────────┐    │
//! │  │ EntityCatalog  │  │  PullEngine    │  │  PushEngine            │    │
//! │  │                │  │                │  │                        │    │
//! │  │ Registry minus │  │ GET pull/{e}   │  │ Local rows changed     │    │
//! │  │ denylist, with │  │ UpsertResolver │  │ after the watermark,   │    │
//! │  │ live tables    │  │ in one tx      │  │ POST push/{e}          │    │
//! │  └────────────────┘  └────────────────┘  └────────────────────────┘    │
//! │                                                                         │
//! │  ┌────────────────┐  ┌────────────────┐  ┌────────────────────────┐    │
//! │  │ WatermarkStore │  │ NetworkProbe   │  │ RemoteTransport        │    │
//! │  │                │  │                │  │                        │    │
//! │  │ {e}_last_sync  │  │ TCP :80 to a   │  │ reqwest, bounded       │    │
//! │  │ .dat per entity│  │ few well-known │  │ timeout                │    │
//! │  │                │  │ hosts          │  │                        │    │
//! │  └────────────────┘  └────────────────┘  └────────────────────────┘    │
//! │                                                                         │
//! │  ┌─────────────────────────────────────────────────────────────────┐   │
//! │  │                       PeerServer (axum)                          │   │
//! │  │ /api/sync/{tables,status,pull,push,reset,full} over SyncEngine  │   │
//! │  └─────────────────────────────────────────────────────────────────┘   │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Module Organization
//!
//! ### Cycle
//! - [`engine`] - `SyncEngine` orchestrator and builder
//! - [`catalog`] - Per-cycle entity discovery
//! - [`pull`] - Master → edge, one entity
//! - [`push`] - Edge → master, one entity
//! - [`resolver`] - Idempotent upsert of inbound records
//!
//! ### Collaborators
//! - [`watermark`] - Durable per-entity progress
//! - [`lock`] - One cycle at a time
//! - [`probe`] - Connectivity gate
//! - [`transport`] - HTTP client for the master
//! - [`clock`] - Injectable "now"
//!
//! ### Surface
//! - [`server`] - Peer HTTP API
//! - [`config`] - TOML + environment configuration
//! - [`error`] - Sync error types
//!
//! ## Usage
//!
//! ```rust,ignore
//! use std::sync::Arc;
//! use edgesync_db::{Database, DbConfig};
//! use edgesync_sync::{SyncConfig, SyncEngineBuilder};
//!
//! let config = SyncConfig::load(None)?;
//! let db = Database::new(DbConfig::new(config.database_path())).await?;
//!
//! let engine = Arc::new(SyncEngineBuilder::new(config).with_database(db).build()?);
//!
//! let result = engine.sync().await;
//! println!("{}: {}", result.success, result.message);
//! ```

// =============================================================================
// Module Declarations
// =============================================================================

pub mod catalog;
pub mod clock;
pub mod config;
pub mod engine;
pub mod error;
pub mod lock;
pub mod probe;
pub mod pull;
pub mod push;
pub mod resolver;
pub mod server;
pub mod transport;
pub mod watermark;

// =============================================================================
// Re-exports
// =============================================================================

pub use catalog::{Catalog, EntityCatalog, EntityDescriptor};
pub use clock::{Clock, FixedClock, SystemClock};
pub use config::SyncConfig;
pub use engine::{CyclePhase, PushReceipt, SyncEngine, SyncEngineBuilder};
pub use error::{SyncError, SyncResult};
pub use lock::CycleLock;
pub use probe::{NetworkProbe, StaticProbe, TcpProbe};
pub use resolver::{ApplyOutcome, UpsertResolver};
pub use server::{PeerHandle, PeerServer};
pub use transport::{HttpTransport, RemoteTransport};
pub use watermark::WatermarkStore;
