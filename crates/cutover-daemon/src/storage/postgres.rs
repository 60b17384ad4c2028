//! PostgreSQL storage implementation

use super::traits::*;
use crate::error::StorageError;
use async_trait::async_trait;
use cutover_types::{StackId, StackRecord};
use serde_json::Value;
use sqlx::{postgres::PgPoolOptions, PgPool, Row};
use std::time::Duration;

/// PostgreSQL-backed storage
#[derive(Debug, Clone)]
pub struct PostgresStorage {
    pool: PgPool,
}

impl PostgresStorage {
    /// Connect to PostgreSQL and initialize schema
    pub async fn new(
        url: &str,
        max_connections: u32,
        connect_timeout_secs: u64,
    ) -> Result<Self, StorageError> {
        let pool = PgPoolOptions::new()
            .max_connections(max_connections)
            .acquire_timeout(Duration::from_secs(connect_timeout_secs))
            .connect(url)
            .await
            .map_err(|e| StorageError::Connection(e.to_string()))?;

        let storage = Self { pool };
        storage.initialize_schema().await?;
        Ok(storage)
    }

    async fn initialize_schema(&self) -> Result<(), StorageError> {
        let statements = [
            r#"
            CREATE TABLE IF NOT EXISTS stacks (
                id TEXT PRIMARY KEY,
                stack_name TEXT NOT NULL,
                stack_version TEXT NOT NULL,
                status TEXT NOT NULL,
                data JSONB NOT NULL,
                creation_time TIMESTAMPTZ NOT NULL,
                updated_at TIMESTAMPTZ NOT NULL
            );
            "#,
            r#"CREATE INDEX IF NOT EXISTS stacks_stack_name ON stacks(stack_name);"#,
            r#"
            CREATE TABLE IF NOT EXISTS stack_locks (
                id TEXT PRIMARY KEY,
                expires_at TIMESTAMPTZ NOT NULL
            );
            "#,
        ];

        for stmt in statements {
            sqlx::query(stmt)
                .execute(&self.pool)
                .await
                .map_err(|e| StorageError::Query(e.to_string()))?;
        }

        Ok(())
    }

    fn to_json(record: &StackRecord) -> Result<Value, StorageError> {
        serde_json::to_value(record)
            .map_err(|e| StorageError::InvalidData(format!("json serialize error: {}", e)))
    }

    fn from_json(value: Value) -> Result<StackRecord, StorageError> {
        serde_json::from_value(value)
            .map_err(|e| StorageError::InvalidData(format!("json deserialize error: {}", e)))
    }

    /// Decode listed rows, dropping any that no longer parse so one bad row
    /// does not stall every other stack
    fn decode_listed(rows: Vec<(String, Value)>) -> Vec<StackRecord> {
        rows.into_iter()
            .filter_map(|(id, data)| match Self::from_json(data) {
                Ok(record) => Some(record),
                Err(e) => {
                    tracing::error!(stack_id = %id, error = %e, "Skipping unreadable stack record");
                    None
                }
            })
            .collect()
    }
}

#[async_trait]
impl StackStorage for PostgresStorage {
    async fn get(&self, id: &StackId) -> StorageResult<StackRecord> {
        let row = sqlx::query("SELECT data FROM stacks WHERE id = $1")
            .bind(id.as_str())
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| StorageError::Query(e.to_string()))?
            .ok_or_else(|| StorageError::NotFound(id.clone()))?;

        let data: Value = row
            .try_get("data")
            .map_err(|e| StorageError::Query(e.to_string()))?;
        Self::from_json(data)
    }

    async fn list(&self) -> StorageResult<Vec<StackRecord>> {
        let rows = sqlx::query("SELECT id, data FROM stacks ORDER BY id")
            .fetch_all(&self.pool)
            .await
            .map_err(|e| StorageError::Query(e.to_string()))?;

        let rows = rows
            .into_iter()
            .map(|row| {
                let id: String = row
                    .try_get("id")
                    .map_err(|e| StorageError::Query(e.to_string()))?;
                let data: Value = row
                    .try_get("data")
                    .map_err(|e| StorageError::Query(e.to_string()))?;
                Ok((id, data))
            })
            .collect::<StorageResult<Vec<_>>>()?;

        Ok(Self::decode_listed(rows))
    }

    async fn upsert(&self, record: StackRecord) -> StorageResult<()> {
        let data = Self::to_json(&record)?;
        let updated_at = chrono::Utc::now();

        // creation_time is kept from the first insert
        sqlx::query(
            r#"
            INSERT INTO stacks (id, stack_name, stack_version, status, data, creation_time, updated_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7)
            ON CONFLICT (id)
            DO UPDATE SET
                status = EXCLUDED.status,
                data = EXCLUDED.data,
                updated_at = EXCLUDED.updated_at
            "#,
        )
        .bind(record.id.as_str())
        .bind(&record.stack_name)
        .bind(&record.stack_version)
        .bind(record.status.to_string())
        .bind(data)
        .bind(record.creation_time)
        .bind(updated_at)
        .execute(&self.pool)
        .await
        .map_err(|e| StorageError::Query(e.to_string()))?;

        Ok(())
    }

    async fn delete(&self, id: &StackId) -> StorageResult<bool> {
        let result = sqlx::query("DELETE FROM stacks WHERE id = $1")
            .bind(id.as_str())
            .execute(&self.pool)
            .await
            .map_err(|e| StorageError::Query(e.to_string()))?;
        Ok(result.rows_affected() > 0)
    }

    async fn lock(&self, id: &StackId, ttl_ms: u64) -> StorageResult<bool> {
        let ttl_ms = i64::try_from(ttl_ms)
            .map_err(|_| StorageError::InvalidData(format!("lock ttl too large: {}", ttl_ms)))?;

        // Only an expired row is overwritten; a live one leaves zero rows affected
        let result = sqlx::query(
            r#"
            INSERT INTO stack_locks (id, expires_at)
            VALUES ($1, now() + ($2::BIGINT * INTERVAL '1 millisecond'))
            ON CONFLICT (id)
            DO UPDATE SET expires_at = EXCLUDED.expires_at
            WHERE stack_locks.expires_at <= now()
            "#,
        )
        .bind(id.as_str())
        .bind(ttl_ms)
        .execute(&self.pool)
        .await
        .map_err(|e| StorageError::Query(e.to_string()))?;

        Ok(result.rows_affected() == 1)
    }

    async fn unlock(&self, id: &StackId) -> StorageResult<()> {
        sqlx::query("DELETE FROM stack_locks WHERE id = $1")
            .bind(id.as_str())
            .execute(&self.pool)
            .await
            .map_err(|e| StorageError::Query(e.to_string()))?;
        Ok(())
    }
}
