//! # Error Types
//!
//! Domain-specific error types for edgesync-core.
//!
//! ## Error Hierarchy
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                         Error Types                                     │
//! │                                                                         │
//! │  edgesync-core errors (this file)                                      │
//! │  ├── CoreError        - Definition and timestamp failures              │
//! │  └── ValidationError  - A single inbound record is unusable            │
//! │                                                                         │
//! │  edgesync-db errors (separate crate)                                   │
//! │  └── DbError          - Database operation failures                    │
//! │                                                                         │
//! │  edgesync-sync errors (separate crate)                                 │
//! │  └── SyncError        - Transport, persistence, discovery failures     │
//! │                                                                         │
//! │  Flow: ValidationError → RecordRejection (report) → EntityResult       │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! `ValidationError` never aborts a batch. It is captured per record and
//! accumulated into an [`ApplyReport`](crate::report::ApplyReport).

use thiserror::Error;

// =============================================================================
// Core Error
// =============================================================================

/// Errors raised by pure domain operations.
#[derive(Debug, Error)]
pub enum CoreError {
    /// Text is not a recognizable timestamp.
    #[error("Invalid timestamp: '{0}'")]
    InvalidTimestamp(String),

    /// Entity definition is not usable (bad name, bad table identifier).
    #[error("Invalid entity definition '{name}': {reason}")]
    InvalidDefinition { name: String, reason: String },

    /// Two definitions map to the same table.
    #[error("Duplicate entity '{0}' in registry")]
    DuplicateEntity(String),

    /// Value received where a record (JSON object) was expected.
    #[error("Expected a JSON object record, got {0}")]
    NotAnObject(String),

    /// Validation error (wraps ValidationError).
    #[error("Validation error: {0}")]
    Validation(#[from] ValidationError),
}

// =============================================================================
// Validation Error
// =============================================================================

/// A single inbound record cannot be applied.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
    /// The record has no usable `id`.
    #[error("Missing ID")]
    MissingId,

    /// The `id` field holds a value that cannot identify a row.
    #[error("Invalid ID: {0}")]
    InvalidId(String),

    /// Element of an inbound batch is not a JSON object.
    #[error("Record at index {index} is not an object")]
    NotAnObject { index: usize },

    /// The record carries no field that maps to a column.
    #[error("Record {id} has no storable fields")]
    NoStorableFields { id: String },
}

// =============================================================================
// Result Type Alias
// =============================================================================

/// Convenience type alias for Results with CoreError.
pub type CoreResult<T> = Result<T, CoreError>;
