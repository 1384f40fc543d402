//! # Database Error Types
//!
//! Error types for database operations.
//!
//! ## Error Flow
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                    Error Propagation                                    │
//! │                                                                         │
//! │  SQLite Error (sqlx::Error)                                            │
//! │       │                                                                 │
//! │       ▼                                                                 │
//! │  DbError (this module) ← Adds context and categorization               │
//! │       │                                                                 │
//! │       ▼                                                                 │
//! │  SyncError::Database (edgesync-sync)                                   │
//! │       │                                                                 │
//! │       ▼                                                                 │
//! │  EntityResult { success: false, message } ← never escapes a cycle      │
//! │                                                                         │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

use thiserror::Error;

/// SQLite primary result code for a violated constraint.
const SQLITE_CONSTRAINT: i32 = 19;

/// SQLite primary result code for a value that does not fit its column.
const SQLITE_MISMATCH: i32 = 20;

/// Database operation errors.
///
/// These errors wrap sqlx errors and provide additional context
/// for logging and per-entity result messages.
///
/// ## Batch Classification
/// ```text
/// Constraint (SQLITE_CONSTRAINT*, SQLITE_MISMATCH)  → that row is rejected
/// everything else (READONLY, BUSY, LOCKED, FULL,    → the batch is aborted
///   IOERR, CORRUPT, I/O, protocol, pool, ...)
/// ```
#[derive(Debug, Error)]
pub enum DbError {
    /// Entity table is missing from the database.
    #[error("Table not found: {0}")]
    TableNotFound(String),

    /// Table or column name is not a plain SQL identifier.
    ///
    /// Entity names are interpolated into SQL, so anything outside
    /// `[A-Za-z_][A-Za-z0-9_]*` is refused before a query is built.
    #[error("Invalid identifier: '{0}'")]
    InvalidIdentifier(String),

    /// Table has neither `created_at` nor `updated_at`.
    #[error("Table {0} has no timestamp column to select changes by")]
    NotQueryable(String),

    /// One row was refused: NOT NULL, UNIQUE, CHECK, FOREIGN KEY or a
    /// datatype mismatch.
    #[error("Constraint failed: {0}")]
    Constraint(String),

    /// Database connection failed.
    ///
    /// ## When This Occurs
    /// - Database file doesn't exist and can't be created
    /// - File permissions issue
    /// - Disk full
    #[error("Connection failed: {0}")]
    ConnectionFailed(String),

    /// Statement failed for a reason unrelated to the row being written
    /// (read-only or locked database, full disk, I/O error, corruption).
    #[error("Query failed: {0}")]
    QueryFailed(String),

    /// Pool exhausted (all connections in use).
    #[error("Connection pool exhausted")]
    PoolExhausted,

    /// Internal database error.
    #[error("Internal database error: {0}")]
    Internal(String),
}

impl DbError {
    /// Returns true when the error must abort the batch it occurred in.
    /// Only a constraint failure is confined to a single row.
    pub fn is_fatal(&self) -> bool {
        !matches!(self, DbError::Constraint(_))
    }
}

/// Convert sqlx errors to DbError.
///
/// ## Error Mapping
/// ```text
/// sqlx::Error::Database       → Constraint or QueryFailed, by result code
/// sqlx::Error::PoolTimedOut   → DbError::PoolExhausted
/// sqlx::Error::PoolClosed     → DbError::ConnectionFailed
/// Other (Io, Protocol, ...)   → DbError::Internal
/// ```
impl From<sqlx::Error> for DbError {
    fn from(err: sqlx::Error) -> Self {
        match err {
            sqlx::Error::Database(db_err) => {
                let message = db_err.message().to_string();
                if is_row_level(db_err.code().as_deref(), db_err.kind()) {
                    DbError::Constraint(message)
                } else {
                    DbError::QueryFailed(message)
                }
            }

            sqlx::Error::PoolTimedOut => DbError::PoolExhausted,

            sqlx::Error::PoolClosed => DbError::ConnectionFailed("Pool is closed".to_string()),

            _ => DbError::Internal(err.to_string()),
        }
    }
}

/// SQLite reports extended result codes; the low byte is the primary code.
fn is_row_level(code: Option<&str>, kind: sqlx::error::ErrorKind) -> bool {
    use sqlx::error::ErrorKind;

    let primary = code.and_then(|c| c.parse::<i32>().ok()).map(|c| c & 0xff);
    matches!(primary, Some(SQLITE_CONSTRAINT | SQLITE_MISMATCH))
        || matches!(
            kind,
            ErrorKind::UniqueViolation
                | ErrorKind::ForeignKeyViolation
                | ErrorKind::NotNullViolation
                | ErrorKind::CheckViolation
        )
}

/// Result type for database operations.
pub type DbResult<T> = Result<T, DbError>;

#[cfg(test)]
mod tests {
    use super::*;
    use sqlx::error::ErrorKind;

    #[test]
    fn test_result_codes() {
        // SQLITE_CONSTRAINT_NOTNULL, SQLITE_CONSTRAINT_PRIMARYKEY, SQLITE_MISMATCH
        assert!(is_row_level(Some("1299"), ErrorKind::Other));
        assert!(is_row_level(Some("1555"), ErrorKind::Other));
        assert!(is_row_level(Some("20"), ErrorKind::Other));

        // SQLITE_READONLY, SQLITE_BUSY, SQLITE_FULL, SQLITE_IOERR_WRITE, SQLITE_CORRUPT
        for code in ["8", "5", "13", "778", "11"] {
            assert!(!is_row_level(Some(code), ErrorKind::Other), "code {code}");
        }
        assert!(!is_row_level(None, ErrorKind::Other));
        assert!(is_row_level(None, ErrorKind::UniqueViolation));
    }

    #[test]
    fn test_only_constraints_are_confined_to_a_row() {
        assert!(!DbError::Constraint("NOT NULL constraint failed: orders.total".into()).is_fatal());
        assert!(DbError::QueryFailed("attempt to write a readonly database".into()).is_fatal());
        assert!(DbError::PoolExhausted.is_fatal());
        assert!(DbError::Internal("disk I/O error".into()).is_fatal());
    }

    #[test]
    fn test_pool_closed_maps_to_connection_failed() {
        let err: DbError = sqlx::Error::PoolClosed.into();
        assert!(matches!(err, DbError::ConnectionFailed(_)));
        assert!(err.is_fatal());
    }

    #[test]
    fn test_io_error_is_fatal() {
        let io = std::io::Error::new(std::io::ErrorKind::Other, "disk I/O error");
        let err: DbError = sqlx::Error::Io(io).into();
        assert!(matches!(err, DbError::Internal(_)));
        assert!(err.is_fatal());
    }
}
