//! PostgreSQL durable store.
//!
//! Records live in one table keyed by id. Strong consistency comes from
//! reading the primary; create-once comes from `INSERT ... ON CONFLICT DO
//! NOTHING`, whose affected-row count tells the two outcomes apart.

use std::fmt;

use async_trait::async_trait;
use deadpool_postgres::{Pool, PoolError};
use dekstore_core::{BackendError, ConfigError, KeyRecord, RecordDocument, RecordId};
use dekstore_storage::{DurableStore, InsertOutcome};
use serde_json::Value as JsonValue;
use tokio_postgres::types::Json;

use crate::config::{validate_table_name, PgConfig};

// ============================================================================
// SQL
// ============================================================================

/// DDL for the key table. `table` must already be validated.
pub fn create_table_sql(table: &str) -> String {
    format!(
        "CREATE TABLE IF NOT EXISTS {table} (\n    \
             id TEXT PRIMARY KEY,\n    \
             keys JSONB NOT NULL,\n    \
             created_at TIMESTAMPTZ NOT NULL DEFAULT now()\n\
         )"
    )
}

/// Point read by id.
pub fn select_sql(table: &str) -> String {
    format!("SELECT id, keys FROM {table} WHERE id = $1")
}

/// Conditional insert; affects zero rows when the id is taken.
pub fn insert_sql(table: &str) -> String {
    format!("INSERT INTO {table} (id, keys) VALUES ($1, $2) ON CONFLICT (id) DO NOTHING")
}

// ============================================================================
// STORE
// ============================================================================

/// [`DurableStore`] backed by a PostgreSQL table.
#[derive(Clone)]
pub struct PgDurableStore {
    pool: Pool,
    table: String,
    select: String,
    insert: String,
}

impl PgDurableStore {
    /// Wrap an existing pool. Fails if `table` is not a plain identifier.
    pub fn new(pool: Pool, table: impl Into<String>) -> Result<Self, ConfigError> {
        let table = table.into();
        validate_table_name(&table)?;
        Ok(Self {
            pool,
            select: select_sql(&table),
            insert: insert_sql(&table),
            table,
        })
    }

    /// Build a pool from `config` and wrap it.
    pub fn from_config(config: &PgConfig) -> dekstore_core::KeyStoreResult<Self> {
        config.validate()?;
        let pool = config.create_pool()?;
        Ok(Self::new(pool, config.table.clone())?)
    }

    /// Table this store reads and writes.
    pub fn table(&self) -> &str {
        &self.table
    }

    /// Current pool size for observability.
    pub fn pool_size(&self) -> usize {
        self.pool.status().size
    }

    /// Create the key table if it does not exist.
    pub async fn ensure_schema(&self) -> Result<(), BackendError> {
        let conn = self.pool.get().await.map_err(pool_error)?;
        conn.batch_execute(&create_table_sql(&self.table))
            .await
            .map_err(query_error)?;
        tracing::info!(table = %self.table, "key table ready");
        Ok(())
    }
}

impl fmt::Debug for PgDurableStore {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PgDurableStore")
            .field("table", &self.table)
            .field("pool_size", &self.pool.status().size)
            .finish()
    }
}

#[async_trait]
impl DurableStore for PgDurableStore {
    async fn get_consistent(&self, id: &RecordId) -> Result<Option<RecordDocument>, BackendError> {
        let conn = self.pool.get().await.map_err(pool_error)?;
        let row = conn
            .query_opt(self.select.as_str(), &[&id.as_str()])
            .await
            .map_err(query_error)?;

        let Some(row) = row else {
            return Ok(None);
        };

        let malformed = |e: tokio_postgres::Error| BackendError::MalformedRecord {
            id: id.to_string(),
            reason: e.to_string(),
        };
        let stored_id: String = row.try_get("id").map_err(malformed)?;
        let keys: JsonValue = row.try_get("keys").map_err(malformed)?;

        Ok(Some(serde_json::json!({ "id": stored_id, "keys": keys })))
    }

    async fn insert_if_absent(&self, record: &KeyRecord) -> Result<InsertOutcome, BackendError> {
        let conn = self.pool.get().await.map_err(pool_error)?;
        let affected = conn
            .execute(self.insert.as_str(), &[&record.id.as_str(), &Json(&record.keys)])
            .await
            .map_err(query_error)?;

        if affected == 0 {
            Ok(InsertOutcome::AlreadyExists)
        } else {
            Ok(InsertOutcome::Inserted)
        }
    }
}

// ============================================================================
// ERROR MAPPING
// ============================================================================

fn pool_error(err: PoolError) -> BackendError {
    tracing::debug!(error = ?err, "connection pool error");
    match err {
        PoolError::Timeout(_) => BackendError::Connection {
            reason: "timed out waiting for a pooled connection".to_string(),
        },
        PoolError::Closed => BackendError::Connection {
            reason: "connection pool is closed".to_string(),
        },
        other => BackendError::Connection {
            reason: other.to_string(),
        },
    }
}

fn query_error(err: tokio_postgres::Error) -> BackendError {
    tracing::debug!(error = ?err, "postgres error");
    if err.is_closed() {
        return BackendError::Connection {
            reason: "connection closed".to_string(),
        };
    }
    let reason = match err.as_db_error() {
        Some(db) => format!("{}: {}", db.code().code(), db.message()),
        None => err.to_string(),
    };
    BackendError::Query { reason }
}
