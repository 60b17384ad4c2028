//! Storage trait definitions

use crate::error::StorageError;
use async_trait::async_trait;
use cutover_types::{StackId, StackRecord};

/// Result type for storage operations
pub type StorageResult<T> = Result<T, StorageError>;

/// Persistence for stack records plus a per-stack advisory lock
#[async_trait]
pub trait StackStorage: Send + Sync {
    /// Get a record by ID; `StorageError::NotFound` if absent
    async fn get(&self, id: &StackId) -> StorageResult<StackRecord>;

    /// List all records
    async fn list(&self) -> StorageResult<Vec<StackRecord>>;

    /// Create or update a record
    async fn upsert(&self, record: StackRecord) -> StorageResult<()>;

    /// Delete a record. Deleting an absent record is not an error; the
    /// return value tells whether anything was removed.
    async fn delete(&self, id: &StackId) -> StorageResult<bool>;

    /// Try to take the lock for `id`. Returns `false` when another holder's
    /// lock has not yet expired.
    async fn lock(&self, id: &StackId, ttl_ms: u64) -> StorageResult<bool>;

    /// Release the lock for `id`; releasing a free lock is a no-op
    async fn unlock(&self, id: &StackId) -> StorageResult<()>;
}
