//! # Entity Table Repository
//!
//! Generic access to one syncable table. Entity tables belong to the host
//! application and are only known at runtime, so every statement here is
//! built from the table's introspected columns instead of a checked macro.
//!
//! ## Id-Merge Upsert
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                  upsert(conn, schema, record)                           │
//! │                                                                         │
//! │  record fields ──► keep those with a matching column                   │
//! │                    (others dropped, debug log)                          │
//! │       │                                                                 │
//! │       ▼                                                                 │
//! │  UPDATE "t" SET a = ?, b = ? WHERE "id" = ?                            │
//! │       │                                                                 │
//! │       ├── rows_affected > 0 ──► Updated                                │
//! │       │                                                                 │
//! │       └── rows_affected = 0 ──► INSERT INTO "t" (id, a, b) VALUES ...  │
//! │                                  ──► Inserted                           │
//! │                                                                         │
//! │  Works with or without a UNIQUE/PRIMARY KEY on "id".                   │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! Upserts take a `&mut SqliteConnection` so a whole pulled batch can run
//! inside one transaction.

use serde::Serialize;
use serde_json::Value;
use sqlx::query::Query;
use sqlx::sqlite::{SqliteArguments, SqliteRow};
use sqlx::{Column, Row, Sqlite, SqliteConnection, SqlitePool, TypeInfo, ValueRef};
use tracing::debug;

use edgesync_core::entity::is_valid_identifier;
use edgesync_core::{Record, Timestamp, CREATED_AT, ID_FIELD, UPDATED_AT};

use crate::error::{DbError, DbResult};

type SqliteQuery<'q> = Query<'q, Sqlite, SqliteArguments<'q>>;

// =============================================================================
// Schema
// =============================================================================

/// Column layout of an entity table, read from `PRAGMA table_info`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TableSchema {
    pub table: String,
    pub columns: Vec<String>,
}

impl TableSchema {
    /// True when the table has `column`.
    pub fn has(&self, column: &str) -> bool {
        self.columns.iter().any(|c| c == column)
    }

    /// True when the table has an `id` column.
    pub fn has_id(&self) -> bool {
        self.has(ID_FIELD)
    }

    /// True when changes can be selected by timestamp.
    pub fn is_queryable(&self) -> bool {
        self.has(CREATED_AT) || self.has(UPDATED_AT)
    }

    fn date_columns(&self) -> Vec<&'static str> {
        [CREATED_AT, UPDATED_AT]
            .into_iter()
            .filter(|c| self.has(c))
            .collect()
    }
}

/// What an upsert did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UpsertOutcome {
    Inserted,
    Updated,
}

// =============================================================================
// Repository
// =============================================================================

/// Repository for one entity table.
#[derive(Debug, Clone)]
pub struct EntityRepository {
    pool: SqlitePool,
    table: String,
}

impl EntityRepository {
    /// Creates a repository, refusing names that are not plain identifiers.
    pub fn new(pool: SqlitePool, table: &str) -> DbResult<Self> {
        if !is_valid_identifier(table) {
            return Err(DbError::InvalidIdentifier(table.to_string()));
        }
        Ok(EntityRepository {
            pool,
            table: table.to_string(),
        })
    }

    /// Table name.
    pub fn table(&self) -> &str {
        &self.table
    }

    /// Reads the table's columns. Fails with `TableNotFound` when the
    /// table has none (SQLite reports missing tables as empty).
    pub async fn schema(&self) -> DbResult<TableSchema> {
        let columns: Vec<String> =
            sqlx::query_scalar("SELECT name FROM pragma_table_info(?1) ORDER BY cid")
                .bind(&self.table)
                .fetch_all(&self.pool)
                .await?;

        if columns.is_empty() {
            return Err(DbError::TableNotFound(self.table.clone()));
        }

        Ok(TableSchema {
            table: self.table.clone(),
            columns,
        })
    }

    /// Total number of rows.
    pub async fn count(&self) -> DbResult<i64> {
        let sql = format!("SELECT COUNT(*) FROM {}", quote_ident(&self.table));
        let count: i64 = sqlx::query_scalar(&sql).fetch_one(&self.pool).await?;
        Ok(count)
    }

    /// Rows whose `created_at` or `updated_at` is after `since`.
    pub async fn changed_since(
        &self,
        schema: &TableSchema,
        since: Timestamp,
    ) -> DbResult<Vec<Record>> {
        let (clause, binds) = self.changed_clause(schema)?;
        let order = if schema.has_id() {
            format!(" ORDER BY {}", quote_ident(ID_FIELD))
        } else {
            String::new()
        };
        let sql = format!(
            "SELECT * FROM {} WHERE {}{}",
            quote_ident(&self.table),
            clause,
            order
        );

        let since = since.to_canonical();
        let mut query = sqlx::query(&sql);
        for _ in 0..binds {
            query = query.bind(since.as_str());
        }

        let rows = query.fetch_all(&self.pool).await?;
        rows.iter().map(row_to_record).collect()
    }

    /// Number of rows changed after `since`.
    pub async fn count_changed_since(
        &self,
        schema: &TableSchema,
        since: Timestamp,
    ) -> DbResult<i64> {
        let (clause, binds) = self.changed_clause(schema)?;
        let sql = format!(
            "SELECT COUNT(*) FROM {} WHERE {}",
            quote_ident(&self.table),
            clause
        );

        let since = since.to_canonical();
        let mut query = sqlx::query_scalar(&sql);
        for _ in 0..binds {
            query = query.bind(since.as_str());
        }

        let count: i64 = query.fetch_one(&self.pool).await?;
        Ok(count)
    }

    /// Merges `record` by id: overwrite the row's fields if it exists,
    /// insert it otherwise. Fields without a matching column are dropped.
    pub async fn upsert(
        &self,
        conn: &mut SqliteConnection,
        schema: &TableSchema,
        record: &Record,
    ) -> DbResult<UpsertOutcome> {
        let id = record
            .get(ID_FIELD)
            .filter(|v| !v.is_null())
            .ok_or_else(|| DbError::Constraint(format!("{}: record without id", self.table)))?;

        let mut fields: Vec<(&str, &Value)> = Vec::with_capacity(record.len());
        for (name, value) in record.iter() {
            if schema.has(name) {
                fields.push((name.as_str(), value));
            } else {
                debug!(table = %self.table, field = %name, "Dropping field with no column");
            }
        }

        let updates: Vec<&(&str, &Value)> =
            fields.iter().filter(|(name, _)| *name != ID_FIELD).collect();

        let exists = if updates.is_empty() {
            self.exists(conn, id).await?
        } else {
            let assignments = updates
                .iter()
                .map(|(name, _)| format!("{} = ?", quote_ident(name)))
                .collect::<Vec<_>>()
                .join(", ");
            let sql = format!(
                "UPDATE {} SET {} WHERE {} = ?",
                quote_ident(&self.table),
                assignments,
                quote_ident(ID_FIELD)
            );

            let mut query = sqlx::query(&sql);
            for (_, value) in &updates {
                query = bind_json(query, value);
            }
            query = bind_json(query, id);

            query.execute(&mut *conn).await?.rows_affected() > 0
        };

        if exists {
            return Ok(UpsertOutcome::Updated);
        }

        let column_list = fields
            .iter()
            .map(|(name, _)| quote_ident(name))
            .collect::<Vec<_>>()
            .join(", ");
        let placeholders = vec!["?"; fields.len()].join(", ");
        let sql = format!(
            "INSERT INTO {} ({}) VALUES ({})",
            quote_ident(&self.table),
            column_list,
            placeholders
        );

        let mut query = sqlx::query(&sql);
        for (_, value) in &fields {
            query = bind_json(query, value);
        }
        query.execute(&mut *conn).await?;

        Ok(UpsertOutcome::Inserted)
    }

    async fn exists(&self, conn: &mut SqliteConnection, id: &Value) -> DbResult<bool> {
        let sql = format!(
            "SELECT COUNT(*) FROM {} WHERE {} = ?1",
            quote_ident(&self.table),
            quote_ident(ID_FIELD)
        );
        let row = bind_json(sqlx::query(&sql), id)
            .fetch_one(&mut *conn)
            .await?;
        let count: i64 = row.try_get(0)?;

        Ok(count > 0)
    }

    /// `(created_at > ? OR updated_at > ?)` for whichever columns exist,
    /// with the number of placeholders.
    fn changed_clause(&self, schema: &TableSchema) -> DbResult<(String, usize)> {
        let columns = schema.date_columns();
        if columns.is_empty() {
            return Err(DbError::NotQueryable(self.table.clone()));
        }

        let clause = columns
            .iter()
            .map(|c| format!("{} > ?", quote_ident(c)))
            .collect::<Vec<_>>()
            .join(" OR ");

        Ok((format!("({clause})"), columns.len()))
    }
}

// =============================================================================
// Value Mapping
// =============================================================================

fn quote_ident(name: &str) -> String {
    format!("\"{}\"", name.replace('"', "\"\""))
}

/// Binds a JSON value using the closest SQLite storage class.
/// Arrays and objects are stored as JSON text.
fn bind_json<'q>(query: SqliteQuery<'q>, value: &'q Value) -> SqliteQuery<'q> {
    match value {
        Value::Null => query.bind(None::<String>),
        Value::Bool(b) => query.bind(*b),
        Value::Number(n) => {
            if let Some(i) = n.as_i64() {
                query.bind(i)
            } else if let Some(f) = n.as_f64() {
                query.bind(f)
            } else {
                query.bind(n.to_string())
            }
        }
        Value::String(s) => query.bind(s.as_str()),
        other => query.bind(other.to_string()),
    }
}

/// Decodes a row by the runtime storage class of each value.
fn row_to_record(row: &SqliteRow) -> DbResult<Record> {
    let mut record = Record::new();

    for column in row.columns() {
        let index = column.ordinal();
        let raw = row.try_get_raw(index)?;
        if raw.is_null() {
            record.insert(column.name(), Value::Null);
            continue;
        }
        let storage = raw.type_info().name().to_string();

        let value = match storage.as_str() {
            "INTEGER" => Value::from(row.try_get::<i64, _>(index)?),
            "REAL" => serde_json::Number::from_f64(row.try_get::<f64, _>(index)?)
                .map(Value::Number)
                .unwrap_or(Value::Null),
            "BLOB" => {
                let bytes: Vec<u8> = row.try_get(index)?;
                Value::String(String::from_utf8_lossy(&bytes).into_owned())
            }
            _ => Value::String(row.try_get::<String, _>(index)?),
        };

        record.insert(column.name(), value);
    }

    Ok(record)
}

// =============================================================================
// Unit Tests
// =============================================================================
