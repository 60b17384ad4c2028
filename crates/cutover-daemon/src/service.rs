//! Direct stack operations
//!
//! User-triggered mutations that call the deployment tool immediately
//! instead of waiting for the next reconciliation cycle. Each mutation holds
//! the stack's lock for its whole duration, so it never interleaves with the
//! reconciler working on the same stack.

use crate::config::SchedulerConfig;
use crate::error::{StackError, StackResult, StorageError};
use crate::executor::CommandExecutor;
use crate::storage::StackStorage;
use chrono::Utc;
use cutover_types::{
    NewStack, StackId, StackRecord, StackStatus, StackValidationError, CREATE_IN_PROGRESS,
    MAX_TRAFFIC_WEIGHT,
};
use std::sync::Arc;
use tracing::{error, info, warn};

/// Create, inspect and change stacks on behalf of a user
pub struct StackService {
    storage: Arc<dyn StackStorage>,
    executor: Arc<dyn CommandExecutor>,
    lock_ttl_ms: u64,
}

impl StackService {
    pub fn new(
        config: &SchedulerConfig,
        storage: Arc<dyn StackStorage>,
        executor: Arc<dyn CommandExecutor>,
    ) -> Self {
        Self {
            storage,
            executor,
            lock_ttl_ms: config.lock_ttl_ms,
        }
    }

    /// Create the infrastructure stack and record it as being created
    pub async fn create(&self, request: NewStack) -> StackResult<StackRecord> {
        let disable_rollback = request.disable_rollback;
        let record = StackRecord::from_request(request, Utc::now())?;
        let id = record.id.clone();

        self.acquire(&id).await?;
        let result = self.create_locked(record, disable_rollback).await;
        self.release(&id).await;
        result
    }

    async fn create_locked(
        &self,
        mut record: StackRecord,
        disable_rollback: bool,
    ) -> StackResult<StackRecord> {
        // Checked under the lock so two creates of one id cannot both pass
        match self.storage.get(&record.id).await {
            Ok(_) => return Err(StackError::AlreadyExists(record.id)),
            Err(StorageError::NotFound(_)) => {}
            Err(e) => return Err(e.into()),
        }

        info!(
            stack_id = %record.id,
            image_version = %record.image_version,
            traffic = record.traffic_weight,
            "Creating stack"
        );

        self.executor
            .create(
                &record.template_body,
                &record.stack_version,
                &record.image_version,
                &record.parameters,
                disable_rollback,
                &record.creation_tags(),
            )
            .await
            .map_err(|e| {
                error!(stack_id = %record.id, error = %e, "Failed to create stack");
                StackError::CreateFailed(e)
            })?;

        record.status = StackStatus::mirror(CREATE_IN_PROGRESS);
        self.storage.upsert(record.clone()).await?;
        Ok(record)
    }

    /// Get a stack record by ID
    pub async fn get(&self, id: &StackId) -> StackResult<StackRecord> {
        Ok(self.storage.get(id).await?)
    }

    /// List all stack records
    pub async fn list(&self) -> StackResult<Vec<StackRecord>> {
        Ok(self.storage.list().await?)
    }

    /// Route `traffic_weight` percent of the traffic to a stack now
    pub async fn change_traffic(&self, id: &StackId, traffic_weight: u8) -> StackResult<StackRecord> {
        if traffic_weight > MAX_TRAFFIC_WEIGHT {
            return Err(StackValidationError::TrafficOutOfRange(traffic_weight).into());
        }

        self.acquire(id).await?;
        let result = self.change_traffic_locked(id, traffic_weight).await;
        self.release(id).await;
        result
    }

    async fn change_traffic_locked(
        &self,
        id: &StackId,
        traffic_weight: u8,
    ) -> StackResult<StackRecord> {
        let mut record = self.storage.get(id).await?;

        let domains = self
            .executor
            .domains(&record.stack_name)
            .await
            .map_err(|e| {
                error!(stack_id = %id, error = %e, "Failed to get domains; traffic not switched");
                StackError::TrafficNotUpdated(e.to_string())
            })?;

        if domains.is_empty() {
            info!(stack_id = %id, "Stack has no domains; traffic not switched");
            return Err(StackError::TrafficNotUpdated(
                "stack does not have a domain".to_string(),
            ));
        }

        info!(stack_id = %id, traffic = traffic_weight, "Switching traffic");
        self.executor
            .traffic_set(&record.stack_name, &record.stack_version, traffic_weight)
            .await
            .map_err(|e| {
                error!(stack_id = %id, error = %e, "Failed to switch traffic");
                StackError::TrafficNotUpdated(e.to_string())
            })?;

        record.traffic_weight = traffic_weight;
        self.storage.upsert(record.clone()).await?;
        Ok(record)
    }

    /// Point a stack at another machine image and replace its instances
    pub async fn update_image(&self, id: &StackId, image: &str) -> StackResult<StackRecord> {
        self.acquire(id).await?;
        let result = self.update_image_locked(id, image).await;
        self.release(id).await;
        result
    }

    async fn update_image_locked(&self, id: &StackId, image: &str) -> StackResult<StackRecord> {
        let mut record = self.storage.get(id).await?;

        info!(stack_id = %id, image, "Updating machine image");
        self.executor
            .patch_image(&record.stack_name, &record.stack_version, image)
            .await
            .map_err(StackError::ImageNotUpdated)?;
        self.executor
            .respawn_instances(&record.stack_name, &record.stack_version)
            .await
            .map_err(StackError::ImageNotUpdated)?;

        record.image = Some(image.to_string());
        self.storage.upsert(record.clone()).await?;
        Ok(record)
    }

    /// Delete a stack's infrastructure.
    ///
    /// Unknown ids succeed. The record itself is removed by the reconciler
    /// once the infrastructure stack is gone.
    pub async fn delete(&self, id: &StackId) -> StackResult<()> {
        self.acquire(id).await?;
        let result = self.delete_locked(id).await;
        self.release(id).await;
        result
    }

    async fn delete_locked(&self, id: &StackId) -> StackResult<()> {
        let record = match self.storage.get(id).await {
            Ok(record) => record,
            Err(StorageError::NotFound(_)) => {
                info!(stack_id = %id, "Stack not found; nothing to delete");
                return Ok(());
            }
            Err(e) => return Err(e.into()),
        };

        info!(stack_id = %id, "Removing stack");
        self.executor
            .remove(&record.stack_name, &record.stack_version)
            .await
            .map_err(|e| {
                error!(stack_id = %id, error = %e, "Failed to remove stack");
                StackError::DeleteFailed(e)
            })?;
        info!(stack_id = %id, "Stack removed");
        Ok(())
    }

    async fn acquire(&self, id: &StackId) -> StackResult<()> {
        if self.storage.lock(id, self.lock_ttl_ms).await? {
            Ok(())
        } else {
            Err(StackError::Busy(id.clone()))
        }
    }

    async fn release(&self, id: &StackId) {
        if let Err(e) = self.storage.unlock(id).await {
            warn!(stack_id = %id, error = %e, "Failed to unlock stack");
        }
    }
}
