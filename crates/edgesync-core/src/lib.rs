//! # edgesync-core: Pure Sync Policy for EdgeSync
//!
//! This crate holds every rule of the sync engine that can be decided without
//! touching a database, a socket or a file.
//!
//! ## Architecture Position
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                        EdgeSync Architecture                            │
//! │                                                                         │
//! │  ┌─────────────────────────────────────────────────────────────────┐   │
//! │  │                  apps/agent (CLI, scheduler)                    │   │
//! │  └─────────────────────────────┬───────────────────────────────────┘   │
//! │                                │                                        │
//! │  ┌─────────────────────────────▼───────────────────────────────────┐   │
//! │  │            edgesync-sync (catalog, pull, push, cycle)           │   │
//! │  └─────────────────────────────┬───────────────────────────────────┘   │
//! │                                │                                        │
//! │  ┌─────────────────────────────▼───────────────────────────────────┐   │
//! │  │               ★ edgesync-core (THIS CRATE) ★                    │   │
//! │  │                                                                 │   │
//! │  │   ┌───────────┐  ┌───────────┐  ┌───────────┐  ┌───────────┐  │   │
//! │  │   │ timestamp │  │  record   │  │  policy   │  │  report   │  │   │
//! │  │   │ canonical │  │  id/date  │  │ admit or  │  │ per-entity│  │   │
//! │  │   │  format   │  │  fields   │  │ skip/drop │  │  results  │  │   │
//! │  │   └───────────┘  └───────────┘  └───────────┘  └───────────┘  │   │
//! │  │                                                                 │   │
//! │  │   NO I/O • NO DATABASE • NO NETWORK • PURE FUNCTIONS           │   │
//! │  └─────────────────────────────────────────────────────────────────┘   │
//! │                                │                                        │
//! │  ┌─────────────────────────────▼───────────────────────────────────┐   │
//! │  │                edgesync-db (SQLite entity tables)               │   │
//! │  └─────────────────────────────────────────────────────────────────┘   │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Modules
//!
//! - [`timestamp`] - Canonical `YYYY-MM-DD HH:MM:SS` timestamps
//! - [`record`] - Records exchanged with the master
//! - [`entity`] - Entity definitions and the static registry
//! - [`policy`] - Upsert admission (id check, staleness, date normalization)
//! - [`report`] - Per-entity, per-phase and per-cycle results
//! - [`error`] - Domain error types
//!
//! ## Example Usage
//!
//! ```rust
//! use edgesync_core::policy::{admit, Admission};
//! use edgesync_core::record::Record;
//! use edgesync_core::timestamp::Timestamp;
//!
//! let watermark: Timestamp = "2025-07-07 00:00:00".parse().unwrap();
//! let record = Record::from_value(serde_json::json!({
//!     "id": "ord-1",
//!     "updated_at": "2025-07-08T10:00:00Z",
//! }))
//! .unwrap();
//!
//! match admit(record, watermark) {
//!     Admission::Accept(normalized) => {
//!         assert_eq!(normalized.get_str("updated_at"), Some("2025-07-08 10:00:00"));
//!     }
//!     other => panic!("unexpected: {other:?}"),
//! }
//! ```

// =============================================================================
// Module Declarations
// =============================================================================

pub mod entity;
pub mod error;
pub mod policy;
pub mod record;
pub mod report;
pub mod timestamp;

// =============================================================================
// Re-exports
// =============================================================================

pub use entity::{Capabilities, EntityDefinition, EntityRegistry};
pub use error::{CoreError, CoreResult, ValidationError};
pub use policy::{admit, Admission};
pub use record::Record;
pub use report::{
    ApplyReport, CycleResult, EntityResult, EntityStatus, PhaseReport, RecordRejection,
};
pub use timestamp::Timestamp;

// =============================================================================
// Constants
// =============================================================================

/// Field every record must carry to be persisted.
pub const ID_FIELD: &str = "id";

/// Creation timestamp field.
pub const CREATED_AT: &str = "created_at";

/// Last-modification timestamp field.
pub const UPDATED_AT: &str = "updated_at";

/// Date fields normalized to canonical form before storage or transmission.
pub const DATE_FIELDS: [&str; 2] = [CREATED_AT, UPDATED_AT];

/// Watermark of an entity that has never been synchronized.
pub const DEFAULT_EPOCH: &str = "2025-07-07 00:00:00";
