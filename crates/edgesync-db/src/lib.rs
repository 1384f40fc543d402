//! # edgesync-db: Database Layer for EdgeSync
//!
//! This crate provides access to the edge instance's SQLite database.
//! It uses sqlx for async operations.
//!
//! ## Architecture Position
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                        EdgeSync Data Flow                               │
//! │                                                                         │
//! │  Pull engine / push engine / peer server                               │
//! │       │                                                                 │
//! │       ▼                                                                 │
//! │  ┌─────────────────────────────────────────────────────────────────┐   │
//! │  │                   edgesync-db (THIS CRATE)                      │   │
//! │  │                                                                 │   │
//! │  │   ┌───────────────┐    ┌──────────────────────────────────┐    │   │
//! │  │   │   Database    │    │  EntityRepository                │    │   │
//! │  │   │   (pool.rs)   │    │  (repository/entity.rs)          │    │   │
//! │  │   │               │    │                                  │    │   │
//! │  │   │ SqlitePool    │◄───│ schema                           │    │   │
//! │  │   │ Transactions  │    │ changed_since / count            │    │   │
//! │  │   │               │    │ upsert (id merge)                │    │   │
//! │  │   └───────────────┘    └──────────────────────────────────┘    │   │
//! │  │                                                                 │   │
//! │  └─────────────────────────────────────────────────────────────────┘   │
//! │       │                                                                 │
//! │       ▼                                                                 │
//! │  ┌─────────────────────────────────────────────────────────────────┐   │
//! │  │          SQLite Database (schema owned by the host app)         │   │
//! │  └─────────────────────────────────────────────────────────────────┘   │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Module Organization
//!
//! - [`pool`] - Connection pool creation and configuration
//! - [`error`] - Database error types
//! - [`repository`] - Entity table repository
//!
//! ## Usage
//!
//! ```rust,ignore
//! use edgesync_db::{Database, DbConfig};
//!
//! let db = Database::new(DbConfig::new("path/to/app.db")).await?;
//! let orders = db.entity("orders")?;
//! let schema = orders.schema().await?;
//! let changed = orders.changed_since(&schema, watermark).await?;
//! ```

// =============================================================================
// Module Declarations
// =============================================================================

pub mod error;
pub mod pool;
pub mod repository;

// =============================================================================
// Re-exports
// =============================================================================

pub use error::{DbError, DbResult};
pub use pool::{Database, DbConfig};
pub use repository::entity::{EntityRepository, TableSchema, UpsertOutcome};
