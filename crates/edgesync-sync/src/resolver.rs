//! # Upsert Resolver
//!
//! Applies inbound records (pulled from the master, or pushed to the peer
//! server) to one local table.
//!
//! ## Per-Record Flow
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                 UpsertResolver::apply(conn, index, value)               │
//! │                                                                         │
//! │  not a JSON object          ──► Rejected (NotAnObject)                 │
//! │  admit(record, watermark)                                               │
//! │     Reject(MissingId ...)   ──► Rejected                               │
//! │     Stale                   ──► Stale (skipped, not an error)          │
//! │     Accept(normalized)                                                  │
//! │        no field maps to a column ──► Rejected (NoStorableFields)       │
//! │        repository.upsert()                                              │
//! │           Inserted / Updated     ──► Applied                           │
//! │           constraint / mismatch  ──► Rejected (batch continues)        │
//! │           any other db failure   ──► Err (batch aborts)                │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! Re-applying the same record against the same watermark produces the
//! same row.

use serde_json::Value;
use sqlx::SqliteConnection;
use tracing::{debug, warn};

use edgesync_core::{
    admit, Admission, ApplyReport, Record, RecordRejection, Timestamp, ValidationError, ID_FIELD,
};
use edgesync_db::{EntityRepository, TableSchema, UpsertOutcome};

use crate::error::SyncResult;

/// What happened to one inbound record.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ApplyOutcome {
    Applied(UpsertOutcome),
    Stale,
    Rejected(RecordRejection),
}

/// Merges inbound records into one table against a fixed watermark.
#[derive(Debug, Clone)]
pub struct UpsertResolver<'a> {
    repo: &'a EntityRepository,
    schema: &'a TableSchema,
    watermark: Timestamp,
}

impl<'a> UpsertResolver<'a> {
    pub fn new(repo: &'a EntityRepository, schema: &'a TableSchema, watermark: Timestamp) -> Self {
        UpsertResolver {
            repo,
            schema,
            watermark,
        }
    }

    /// Applies one record. Fails only when the database refuses the write
    /// for a reason other than the record itself.
    pub async fn apply(
        &self,
        conn: &mut SqliteConnection,
        index: usize,
        value: Value,
    ) -> SyncResult<ApplyOutcome> {
        let record = match Record::from_value(value) {
            Ok(record) => record,
            Err(_) => {
                return Ok(self.rejected(index, None, ValidationError::NotAnObject { index }));
            }
        };

        let record = match admit(record, self.watermark) {
            Admission::Accept(record) => record,
            Admission::Stale { id, effective } => {
                debug!(
                    table = %self.repo.table(),
                    id = %id,
                    effective = %effective,
                    watermark = %self.watermark,
                    "Skipping stale record"
                );
                return Ok(ApplyOutcome::Stale);
            }
            Admission::Reject(err) => return Ok(self.rejected(index, None, err)),
        };

        // admit() only accepts records with an id
        let id = record.id().ok();

        if !self.has_storable_field(&record) {
            let err = ValidationError::NoStorableFields {
                id: id.clone().unwrap_or_default(),
            };
            return Ok(self.rejected(index, id, err));
        }

        match self.repo.upsert(conn, self.schema, &record).await {
            Ok(outcome) => Ok(ApplyOutcome::Applied(outcome)),
            Err(e) if e.is_fatal() => Err(e.into()),
            Err(e) => Ok(self.rejected(index, id, e)),
        }
    }

    /// Applies a whole batch, collecting per-record outcomes.
    pub async fn apply_batch(
        &self,
        conn: &mut SqliteConnection,
        values: Vec<Value>,
    ) -> SyncResult<ApplyReport> {
        let mut report = ApplyReport::new(values.len());

        for (index, value) in values.into_iter().enumerate() {
            match self.apply(conn, index, value).await? {
                ApplyOutcome::Applied(_) => report.record_applied(),
                ApplyOutcome::Stale => report.record_stale(),
                ApplyOutcome::Rejected(rejection) => report.record_rejected(rejection),
            }
        }

        Ok(report)
    }

    /// An id-only record is storable; a record whose other fields all miss
    /// the table is not.
    fn has_storable_field(&self, record: &Record) -> bool {
        let mut others = record.iter().filter(|(name, _)| name.as_str() != ID_FIELD).peekable();
        if others.peek().is_none() {
            return true;
        }
        others.any(|(name, _)| self.schema.has(name))
    }

    fn rejected(&self, index: usize, id: Option<String>, reason: impl ToString) -> ApplyOutcome {
        let rejection = RecordRejection::new(index, id, reason);
        warn!(
            table = %self.repo.table(),
            index,
            reason = %rejection.reason,
            "Record rejected"
        );
        ApplyOutcome::Rejected(rejection)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use edgesync_db::{Database, DbConfig};
    use serde_json::json;
    use crate::error::SyncError;

    async fn setup() -> (Database, EntityRepository, TableSchema) {
        let db = Database::new(DbConfig::in_memory()).await.unwrap();
        sqlx::query(
            "CREATE TABLE orders (id TEXT PRIMARY KEY, total INTEGER NOT NULL DEFAULT 0, created_at TEXT, updated_at TEXT)",
        )
        .execute(db.pool())
        .await
        .unwrap();
        let repo = db.entity("orders").unwrap();
        let schema = repo.schema().await.unwrap();
        (db, repo, schema)
    }

    fn watermark() -> Timestamp {
        "2025-07-07 00:00:00".parse().unwrap()
    }

    #[tokio::test]
    async fn test_batch_mixes_outcomes() {
        let (db, repo, schema) = setup().await;
        let resolver = UpsertResolver::new(&repo, &schema, watermark());
        let mut conn = db.pool().acquire().await.unwrap();

        let report = resolver
            .apply_batch(
                &mut conn,
                vec![
                    json!({"id": "o-1", "total": 5, "updated_at": "2025-07-08T09:00:00Z"}),
                    json!({"id": "o-2", "total": 6, "updated_at": "2025-07-07 00:00:00"}),
                    json!({"total": 7}),
                    json!("not a record"),
                    json!({"id": "o-3", "unknown_column": 1}),
                ],
            )
            .await
            .unwrap();
        drop(conn);

        assert_eq!(report.received, 5);
        assert_eq!(report.applied, 1);
        assert_eq!(report.stale, 1);
        assert_eq!(report.rejected.len(), 3);
        assert_eq!(report.rejected[0].reason, "Missing ID");
        assert_eq!(report.rejected[2].id.as_deref(), Some("o-3"));

        let updated_at: String =
            sqlx::query_scalar("SELECT updated_at FROM orders WHERE id = 'o-1'")
                .fetch_one(db.pool())
                .await
                .unwrap();
        assert_eq!(updated_at, "2025-07-08 09:00:00");
        let stale_rows: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM orders WHERE id = 'o-2'")
            .fetch_one(db.pool())
            .await
            .unwrap();
        assert_eq!(stale_rows, 0);
    }

    #[tokio::test]
    async fn test_reapplying_is_idempotent() {
        let (db, repo, schema) = setup().await;
        let resolver = UpsertResolver::new(&repo, &schema, watermark());
        let record = json!({"id": "o-1", "total": 5, "created_at": "2025-07-08 00:00:00"});

        let mut conn = db.pool().acquire().await.unwrap();
        let first = resolver.apply(&mut conn, 0, record.clone()).await.unwrap();
        let second = resolver.apply(&mut conn, 0, record).await.unwrap();
        drop(conn);

        assert_eq!(first, ApplyOutcome::Applied(UpsertOutcome::Inserted));
        assert_eq!(second, ApplyOutcome::Applied(UpsertOutcome::Updated));
        assert_eq!(repo.count().await.unwrap(), 1);
        let total: i64 = sqlx::query_scalar("SELECT total FROM orders WHERE id = 'o-1'")
            .fetch_one(db.pool())
            .await
            .unwrap();
        assert_eq!(total, 5);
    }

    #[tokio::test]
    async fn test_constraint_failure_rejects_only_that_record() {
        let (db, repo, schema) = setup().await;
        let resolver = UpsertResolver::new(&repo, &schema, watermark());
        let mut conn = db.pool().acquire().await.unwrap();

        let report = resolver
            .apply_batch(
                &mut conn,
                vec![
                    json!({"id": "o-1", "total": null}),
                    json!({"id": "o-2", "total": 2}),
                ],
            )
            .await
            .unwrap();
        drop(conn);

        assert_eq!(report.applied, 1);
        assert_eq!(report.rejected.len(), 1);
        assert_eq!(report.rejected[0].id.as_deref(), Some("o-1"));
        assert_eq!(
            report.error_messages()[0].split(':').next(),
            Some("Record o-1")
        );
    }

    #[tokio::test]
    async fn test_read_only_database_aborts_batch() {
        let (db, repo, schema) = setup().await;
        let resolver = UpsertResolver::new(&repo, &schema, watermark());
        let mut conn = db.pool().acquire().await.unwrap();
        sqlx::query("PRAGMA query_only = 1")
            .execute(&mut *conn)
            .await
            .unwrap();

        let result = resolver
            .apply_batch(
                &mut conn,
                vec![
                    json!({"id": "o-1", "total": 1}),
                    json!({"id": "o-2", "total": 2}),
                ],
            )
            .await;

        match result {
            Err(SyncError::Database(e)) => assert!(e.is_fatal()),
            other => panic!("expected a fatal database error, got {other:?}"),
        }
    }
}
