//! In-memory storage implementation

use super::traits::*;
use crate::error::StorageError;
use async_trait::async_trait;
use cutover_types::{StackId, StackRecord};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::{Mutex, RwLock};
use tokio::time::{Duration, Instant};

/// In-memory storage for development and testing
#[derive(Debug, Clone, Default)]
pub struct InMemoryStorage {
    records: Arc<RwLock<HashMap<StackId, StackRecord>>>,
    locks: Arc<Mutex<HashMap<StackId, Instant>>>,
}

impl InMemoryStorage {
    /// Create a new in-memory storage
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a storage pre-populated with records
    pub fn with_records(records: impl IntoIterator<Item = StackRecord>) -> Self {
        let records = records
            .into_iter()
            .map(|record| (record.id.clone(), record))
            .collect();
        Self {
            records: Arc::new(RwLock::new(records)),
            locks: Arc::default(),
        }
    }

    /// Whether a live lock is held for `id`
    pub async fn is_locked(&self, id: &StackId) -> bool {
        let locks = self.locks.lock().await;
        locks.get(id).is_some_and(|expiry| *expiry > Instant::now())
    }
}

#[async_trait]
impl StackStorage for InMemoryStorage {
    async fn get(&self, id: &StackId) -> StorageResult<StackRecord> {
        let records = self.records.read().await;
        records
            .get(id)
            .cloned()
            .ok_or_else(|| StorageError::NotFound(id.clone()))
    }

    async fn list(&self) -> StorageResult<Vec<StackRecord>> {
        let records = self.records.read().await;
        let mut all: Vec<_> = records.values().cloned().collect();
        all.sort_by(|a, b| a.id.as_str().cmp(b.id.as_str()));
        Ok(all)
    }

    async fn upsert(&self, record: StackRecord) -> StorageResult<()> {
        let mut records = self.records.write().await;
        records.insert(record.id.clone(), record);
        Ok(())
    }

    async fn delete(&self, id: &StackId) -> StorageResult<bool> {
        let mut records = self.records.write().await;
        Ok(records.remove(id).is_some())
    }

    async fn lock(&self, id: &StackId, ttl_ms: u64) -> StorageResult<bool> {
        // Check and insert under one guard so two callers cannot both win
        let mut locks = self.locks.lock().await;
        let now = Instant::now();

        if let Some(expiry) = locks.get(id) {
            if *expiry > now {
                return Ok(false);
            }
        }

        locks.insert(id.clone(), now + Duration::from_millis(ttl_ms));
        Ok(true)
    }

    async fn unlock(&self, id: &StackId) -> StorageResult<()> {
        let mut locks = self.locks.lock().await;
        locks.remove(id);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::record;
    use cutover_types::StackStatus;

    #[tokio::test]
    async fn test_record_crud() {
        let storage = InMemoryStorage::new();
        let id = StackId::new("app-1");

        assert!(matches!(
            storage.get(&id).await,
            Err(StorageError::NotFound(missing)) if missing == id
        ));

        storage.upsert(record("app", "1", StackStatus::New)).await.unwrap();
        assert_eq!(storage.get(&id).await.unwrap().stack_version, "1");

        let mut updated = storage.get(&id).await.unwrap();
        updated.status = StackStatus::Deployed;
        storage.upsert(updated).await.unwrap();
        assert_eq!(storage.get(&id).await.unwrap().status, StackStatus::Deployed);
        assert_eq!(storage.list().await.unwrap().len(), 1);

        assert!(storage.delete(&id).await.unwrap());
        assert!(!storage.delete(&id).await.unwrap());
        assert!(storage.list().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_lock_is_exclusive() {
        let storage = InMemoryStorage::new();
        let id = StackId::new("app-1");

        assert!(storage.lock(&id, 60_000).await.unwrap());
        assert!(!storage.lock(&id, 60_000).await.unwrap());
        assert!(storage.is_locked(&id).await);

        // Other ids are independent
        assert!(storage.lock(&StackId::new("app-2"), 60_000).await.unwrap());

        storage.unlock(&id).await.unwrap();
        assert!(!storage.is_locked(&id).await);
        assert!(storage.lock(&id, 60_000).await.unwrap());
    }

    #[tokio::test]
    async fn test_concurrent_lock_attempts() {
        let storage = InMemoryStorage::new();
        let id = StackId::new("app-1");

        let attempts = (0..16).map(|_| {
            let storage = storage.clone();
            let id = id.clone();
            tokio::spawn(async move { storage.lock(&id, 60_000).await.unwrap() })
        });

        let mut acquired = 0;
        for attempt in attempts {
            if attempt.await.unwrap() {
                acquired += 1;
            }
        }
        assert_eq!(acquired, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_expired_lock_can_be_reacquired() {
        let storage = InMemoryStorage::new();
        let id = StackId::new("app-1");

        assert!(storage.lock(&id, 1_000).await.unwrap());
        tokio::time::advance(Duration::from_millis(500)).await;
        assert!(!storage.lock(&id, 1_000).await.unwrap());

        tokio::time::advance(Duration::from_millis(600)).await;
        assert!(storage.lock(&id, 1_000).await.unwrap());
    }

    #[tokio::test]
    async fn test_unlock_is_idempotent() {
        let storage = InMemoryStorage::new();
        let id = StackId::new("app-1");
        storage.unlock(&id).await.unwrap();
        storage.unlock(&id).await.unwrap();
        assert!(storage.lock(&id, 1_000).await.unwrap());
    }
}
