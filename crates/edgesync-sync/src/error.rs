//! # Sync Error Types
//!
//! Error types for sync operations.
//!
//! ## Error Hierarchy
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                       Sync Error Categories                             │
//! │                                                                         │
//! │  ┌─────────────────┐  ┌─────────────────┐  ┌─────────────────────────┐ │
//! │  │  Configuration  │  │  Connectivity   │  │   Remote Protocol       │ │
//! │  │                 │  │  (cycle-scoped) │  │   (entity-scoped)       │ │
//! │  │  InvalidConfig  │  │  ConnectionFail │  │  RemoteStatus           │ │
//! │  │  InvalidUrl     │  │  Timeout        │  │  InvalidResponse        │ │
//! │  │  ConfigLoad/Save│  │                 │  │                         │ │
//! │  └─────────────────┘  └─────────────────┘  └─────────────────────────┘ │
//! │                                                                         │
//! │  ┌─────────────────┐  ┌─────────────────┐  ┌─────────────────────────┐ │
//! │  │    Database     │  │  Persistence    │  │  Discovery / Requests   │ │
//! │  │                 │  │  (watermarks,   │  │                         │ │
//! │  │  Database(DbErr)│  │   lock file)    │  │  UnknownEntity          │ │
//! │  │                 │  │  Persistence    │  │  InvalidPayload         │ │
//! │  │                 │  │  LockFailed     │  │  NotUpsertable          │ │
//! │  └─────────────────┘  └─────────────────┘  └─────────────────────────┘ │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! None of these escape a sync cycle: the engine turns them into
//! `EntityResult`/`CycleResult` values. They do escape the peer server's
//! handlers, where they become HTTP status codes.

use thiserror::Error;

use edgesync_db::DbError;

/// Result type alias for sync operations.
pub type SyncResult<T> = Result<T, SyncError>;

/// Sync error type covering all possible sync failures.
#[derive(Debug, Error)]
pub enum SyncError {
    // =========================================================================
    // Configuration Errors
    // =========================================================================
    /// Invalid sync configuration.
    #[error("Invalid sync configuration: {0}")]
    InvalidConfig(String),

    /// Invalid remote base URL.
    #[error("Invalid remote URL: {0}")]
    InvalidUrl(String),

    /// Failed to load config file.
    #[error("Failed to load config: {0}")]
    ConfigLoadFailed(String),

    /// Failed to save config file.
    #[error("Failed to save config: {0}")]
    ConfigSaveFailed(String),

    // =========================================================================
    // Connectivity Errors
    // =========================================================================
    /// Could not reach the remote master.
    #[error("Connection failed: {0}")]
    ConnectionFailed(String),

    /// Remote call exceeded its timeout.
    #[error("Request timed out after {0} seconds")]
    Timeout(u64),

    // =========================================================================
    // Remote Protocol Errors
    // =========================================================================
    /// Remote answered with a non-2xx status.
    #[error("Server responded with HTTP {status}")]
    RemoteStatus { status: u16 },

    /// Remote answered 2xx with an unusable body.
    #[error("Invalid response: {0}")]
    InvalidResponse(String),

    // =========================================================================
    // Storage Errors
    // =========================================================================
    /// Database operation failed.
    #[error("Database error: {0}")]
    Database(#[from] DbError),

    /// Watermark or lock file I/O failed.
    #[error("Persistence error: {0}")]
    Persistence(String),

    /// Cycle lock could not be taken for a reason other than contention.
    #[error("Failed to acquire sync lock: {0}")]
    LockFailed(String),

    // =========================================================================
    // Entity / Request Errors
    // =========================================================================
    /// Entity is not in this cycle's catalog.
    #[error("Table '{0}' not found or not available for sync")]
    UnknownEntity(String),

    /// Entity name cannot be used as a table or file name.
    #[error("Invalid entity name: '{0}'")]
    InvalidEntityName(String),

    /// Inbound body is not a JSON array of records.
    #[error("Invalid data format: {0}")]
    InvalidPayload(String),

    /// Entity has no timestamp column to select changes by.
    #[error("Table '{0}' has no created_at/updated_at column")]
    NotQueryable(String),

    /// Entity table cannot be merged by id.
    #[error("Table '{0}' has no id column")]
    NoIdColumn(String),

    /// Entity is declared push-only and cannot be written from outside.
    #[error("Table '{0}' does not accept inbound records")]
    NotUpsertable(String),

    /// Value could not be serialized.
    #[error("Serialization failed: {0}")]
    SerializationFailed(String),

    // =========================================================================
    // Internal Errors
    // =========================================================================
    /// Peer server could not bind.
    #[error("Server error: {0}")]
    ServerError(String),

    /// Internal sync engine error.
    #[error("Internal error: {0}")]
    Internal(String),
}

// =============================================================================
// Error Conversions
// =============================================================================

impl From<serde_json::Error> for SyncError {
    fn from(err: serde_json::Error) -> Self {
        SyncError::SerializationFailed(err.to_string())
    }
}

impl From<url::ParseError> for SyncError {
    fn from(err: url::ParseError) -> Self {
        SyncError::InvalidUrl(err.to_string())
    }
}

impl From<std::io::Error> for SyncError {
    fn from(err: std::io::Error) -> Self {
        SyncError::Persistence(err.to_string())
    }
}

impl From<toml::de::Error> for SyncError {
    fn from(err: toml::de::Error) -> Self {
        SyncError::ConfigLoadFailed(err.to_string())
    }
}

impl From<toml::ser::Error> for SyncError {
    fn from(err: toml::ser::Error) -> Self {
        SyncError::ConfigSaveFailed(err.to_string())
    }
}

impl From<sqlx::Error> for SyncError {
    fn from(err: sqlx::Error) -> Self {
        SyncError::Database(DbError::from(err))
    }
}

impl From<edgesync_core::CoreError> for SyncError {
    fn from(err: edgesync_core::CoreError) -> Self {
        SyncError::InvalidConfig(err.to_string())
    }
}

// =============================================================================
// Error Categorization
// =============================================================================

impl SyncError {
    /// Returns true if the caller sent a request this instance cannot
    /// serve (peer server 4xx).
    pub fn is_client_error(&self) -> bool {
        matches!(
            self,
            SyncError::UnknownEntity(_)
                | SyncError::InvalidEntityName(_)
                | SyncError::InvalidPayload(_)
                | SyncError::NotQueryable(_)
                | SyncError::NotUpsertable(_)
        )
    }
}
