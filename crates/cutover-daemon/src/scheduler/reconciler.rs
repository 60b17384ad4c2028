//! Reconciliation cycle

use crate::config::SchedulerConfig;
use crate::deployer::{create_deployer, Deployer, ReconcileContext};
use crate::error::{DaemonError, DaemonResult, StorageError};
use crate::executor::CommandExecutor;
use crate::storage::StackStorage;
use cutover_types::{
    DeploymentStrategy, InfrastructureSnapshot, Outcome, StackId, StackRecord,
};
use futures_util::{stream, FutureExt, StreamExt};
use std::collections::HashMap;
use std::fmt;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;

/// Counts of what one reconciliation cycle did
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CycleReport {
    /// Records saved with a recomputed status
    pub updated: usize,
    /// Records deleted, either terminal or with no infrastructure left
    pub removed: usize,
    /// Records left alone because another holder had their lock
    pub skipped: usize,
    /// Records whose processing hit a storage error or a panic
    pub failed: usize,
}

impl CycleReport {
    fn add(&mut self, result: RecordResult) {
        match result {
            RecordResult::Updated => self.updated += 1,
            RecordResult::Removed => self.removed += 1,
            RecordResult::Skipped => self.skipped += 1,
            RecordResult::Failed => self.failed += 1,
        }
    }
}

impl fmt::Display for CycleReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "updated={} removed={} skipped={} failed={}",
            self.updated, self.removed, self.skipped, self.failed
        )
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum RecordResult {
    Updated,
    Removed,
    Skipped,
    Failed,
}

/// Runs reconciliation cycles over every stack record
pub struct Reconciler {
    storage: Arc<dyn StackStorage>,
    executor: Arc<dyn CommandExecutor>,
    deployers: HashMap<DeploymentStrategy, Arc<dyn Deployer>>,
    lock_ttl_ms: u64,
    max_concurrent_records: usize,
}

impl Reconciler {
    pub fn new(
        config: &SchedulerConfig,
        storage: Arc<dyn StackStorage>,
        executor: Arc<dyn CommandExecutor>,
    ) -> Self {
        let deployers = [DeploymentStrategy::Cutover, DeploymentStrategy::DeployAndForget]
            .into_iter()
            .map(|strategy| (strategy, create_deployer(strategy, executor.clone())))
            .collect();

        Self {
            storage,
            executor,
            deployers,
            lock_ttl_ms: config.lock_ttl_ms,
            max_concurrent_records: config.max_concurrent_records.max(1),
        }
    }

    /// Replace the deployer used for one strategy
    pub fn with_deployer(mut self, strategy: DeploymentStrategy, deployer: Arc<dyn Deployer>) -> Self {
        self.deployers.insert(strategy, deployer);
        self
    }

    /// Run one full reconciliation cycle.
    ///
    /// Fails before touching any record when the infrastructure snapshot or
    /// the record list cannot be read. Per-record failures are logged and
    /// counted in the report.
    pub async fn run_cycle(&self) -> DaemonResult<CycleReport> {
        let snapshot = self.executor.snapshot().await.map_err(|e| {
            tracing::error!(error = %e, "Failed to read infrastructure; cycle aborted");
            DaemonError::Snapshot(e)
        })?;

        let records = self.storage.list().await?;
        let (terminal, live): (Vec<_>, Vec<_>) =
            records.into_iter().partition(|r| r.status.is_terminal());

        tracing::debug!(
            stacks = snapshot.len(),
            records = live.len(),
            terminal = terminal.len(),
            "Reconciling"
        );

        let mut report = CycleReport::default();

        for record in &terminal {
            tracing::info!(stack_id = %record.id, status = %record.status, "Deleting finished stack record");
            match self.storage.delete(&record.id).await {
                Ok(_) => report.add(RecordResult::Removed),
                Err(e) => {
                    tracing::error!(stack_id = %record.id, error = %e, "Failed to delete stack record");
                    report.add(RecordResult::Failed);
                }
            }
        }

        let mut families: HashMap<&str, Vec<StackRecord>> = HashMap::new();
        for record in &live {
            families
                .entry(record.stack_name.as_str())
                .or_default()
                .push(record.clone());
        }

        let pending: Vec<_> = live
            .iter()
            .map(|record| {
                let siblings = families
                    .get(record.stack_name.as_str())
                    .map(Vec::as_slice)
                    .unwrap_or(&[]);
                self.reconcile_record(&record.id, &snapshot, siblings)
            })
            .collect();
        let results: Vec<RecordResult> = stream::iter(pending)
            .buffer_unordered(self.max_concurrent_records)
            .collect()
            .await;

        for result in results {
            report.add(result);
        }

        tracing::info!(
            updated = report.updated,
            removed = report.removed,
            skipped = report.skipped,
            failed = report.failed,
            "Reconciliation cycle finished"
        );

        Ok(report)
    }

    /// Lock a record, reconcile it and release the lock
    async fn reconcile_record(
        &self,
        id: &StackId,
        snapshot: &InfrastructureSnapshot,
        siblings: &[StackRecord],
    ) -> RecordResult {
        match self.storage.lock(id, self.lock_ttl_ms).await {
            Ok(true) => {}
            Ok(false) => {
                tracing::debug!(stack_id = %id, "Stack is locked; skipping");
                return RecordResult::Skipped;
            }
            Err(e) => {
                tracing::error!(stack_id = %id, error = %e, "Failed to lock stack");
                return RecordResult::Failed;
            }
        }

        let result = AssertUnwindSafe(self.reconcile_locked(id, snapshot, siblings))
            .catch_unwind()
            .await;

        if let Err(e) = self.storage.unlock(id).await {
            tracing::error!(stack_id = %id, error = %e, "Failed to unlock stack");
        }

        result.unwrap_or_else(|_| {
            tracing::error!(stack_id = %id, "Reconciliation panicked");
            RecordResult::Failed
        })
    }

    async fn reconcile_locked(
        &self,
        id: &StackId,
        snapshot: &InfrastructureSnapshot,
        siblings: &[StackRecord],
    ) -> RecordResult {
        // Re-read under the lock; a direct operation may have changed it
        let mut record = match self.storage.get(id).await {
            Ok(record) => record,
            Err(StorageError::NotFound(_)) => {
                tracing::debug!(stack_id = %id, "Stack record vanished; skipping");
                return RecordResult::Skipped;
            }
            Err(e) => {
                tracing::error!(stack_id = %id, error = %e, "Failed to load stack record");
                return RecordResult::Failed;
            }
        };

        if record.status.is_terminal() {
            return RecordResult::Skipped;
        }

        let Some(deployer) = self.deployers.get(&record.strategy) else {
            tracing::error!(stack_id = %id, strategy = %record.strategy, "No deployer for strategy");
            return RecordResult::Failed;
        };

        let context = ReconcileContext { snapshot, siblings };
        let outcome = deployer.handle(&record, &context).await;

        match outcome {
            Outcome::Removed => {
                tracing::info!(stack_id = %id, "Stack no longer exists; deleting record");
                match self.storage.delete(id).await {
                    Ok(_) => RecordResult::Removed,
                    Err(e) => {
                        tracing::error!(stack_id = %id, error = %e, "Failed to delete stack record");
                        RecordResult::Failed
                    }
                }
            }
            Outcome::Status(status) => {
                if status != record.status {
                    tracing::info!(
                        stack_id = %id,
                        deployer = deployer.name(),
                        from = %record.status,
                        to = %status,
                        "Stack status changed"
                    );
                }
                record.status = status;
                match self.storage.upsert(record).await {
                    Ok(()) => RecordResult::Updated,
                    Err(e) => {
                        tracing::error!(stack_id = %id, error = %e, "Failed to save stack record");
                        RecordResult::Failed
                    }
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::Operation;
    use crate::storage::InMemoryStorage;
    use crate::testing::{record, Call, RecordingExecutor};
    use async_trait::async_trait;
    use cutover_types::StackStatus;

    fn reconciler(storage: &InMemoryStorage, executor: &Arc<RecordingExecutor>) -> Reconciler {
        Reconciler::new(
            &SchedulerConfig::default(),
            Arc::new(storage.clone()),
            executor.clone(),
        )
    }

    #[tokio::test]
    async fn test_deploying_without_infrastructure_is_deleted() {
        let storage = InMemoryStorage::with_records(vec![record("app", "7", StackStatus::Deploying)]);
        let executor = Arc::new(RecordingExecutor::new());

        let report = reconciler(&storage, &executor).run_cycle().await.unwrap();

        assert_eq!(report.removed, 1);
        assert_eq!(report.updated, 0);
        assert!(storage.list().await.unwrap().is_empty());
        assert!(!storage.is_locked(&StackId::new("app-7")).await);
    }

    #[tokio::test]
    async fn test_create_complete_becomes_deployed() {
        let storage = InMemoryStorage::with_records(vec![record("app", "7", StackStatus::Deploying)]);
        let executor = Arc::new(RecordingExecutor::new().with_stack("app", "7", "CREATE_COMPLETE"));

        let report = reconciler(&storage, &executor).run_cycle().await.unwrap();

        assert_eq!(report, CycleReport { updated: 1, ..Default::default() });
        let saved = storage.get(&StackId::new("app-7")).await.unwrap();
        assert_eq!(saved.status, StackStatus::Deployed);
        assert_eq!(executor.calls(), vec![Call::List]);
    }

    #[tokio::test]
    async fn test_deployed_prunes_without_zero_traffic_switch() {
        let mut current = record("app", "3", StackStatus::Deployed);
        current.traffic_weight = 0;
        current.keep_count = 1;
        let storage = InMemoryStorage::with_records(vec![
            record("app", "1", StackStatus::mirror("UPDATE_COMPLETE")),
            record("app", "2", StackStatus::mirror("UPDATE_COMPLETE")),
            current,
        ]);
        let executor = Arc::new(
            RecordingExecutor::new()
                .with_stack("app", "1", "UPDATE_COMPLETE")
                .with_stack("app", "2", "UPDATE_COMPLETE")
                .with_stack("app", "3", "UPDATE_COMPLETE"),
        );

        let report = reconciler(&storage, &executor).run_cycle().await.unwrap();

        assert_eq!(report.updated, 3);
        assert_eq!(executor.mutations(), vec![Call::Remove("app".into(), "1".into())]);
        let saved = storage.get(&StackId::new("app-3")).await.unwrap();
        assert_eq!(saved.status, StackStatus::mirror("UPDATE_COMPLETE"));
        assert_eq!(saved.status.to_string(), "CF:UPDATE_COMPLETE");
    }

    #[tokio::test]
    async fn test_error_record_is_deleted_without_deployer() {
        let storage = InMemoryStorage::with_records(vec![record("app", "5", StackStatus::Error)]);
        let executor = Arc::new(RecordingExecutor::new().with_stack("app", "5", "CREATE_COMPLETE"));

        let report = reconciler(&storage, &executor).run_cycle().await.unwrap();

        assert_eq!(report, CycleReport { removed: 1, ..Default::default() });
        assert!(storage.list().await.unwrap().is_empty());
        assert_eq!(executor.calls(), vec![Call::List]);
    }

    #[tokio::test]
    async fn test_snapshot_failure_mutates_nothing() {
        let records = vec![
            record("app", "1", StackStatus::Deploying),
            record("app", "2", StackStatus::Error),
        ];
        let storage = InMemoryStorage::with_records(records.clone());
        let executor = Arc::new(RecordingExecutor::new().failing(Operation::List));

        let result = reconciler(&storage, &executor).run_cycle().await;

        assert!(matches!(result, Err(DaemonError::Snapshot(e)) if e.operation == Operation::List));
        assert_eq!(storage.list().await.unwrap(), records);
        assert_eq!(executor.calls(), vec![Call::List]);
    }

    #[tokio::test]
    async fn test_locked_record_is_skipped() {
        let storage = InMemoryStorage::with_records(vec![
            record("app", "8", StackStatus::Deploying),
            record("app", "9", StackStatus::Deploying),
        ]);
        let executor = Arc::new(
            RecordingExecutor::new()
                .with_stack("app", "8", "CREATE_COMPLETE")
                .with_stack("app", "9", "CREATE_COMPLETE"),
        );
        let held = StackId::new("app-9");
        assert!(storage.lock(&held, 60_000).await.unwrap());

        let report = reconciler(&storage, &executor).run_cycle().await.unwrap();

        assert_eq!(report, CycleReport { updated: 1, skipped: 1, ..Default::default() });
        assert_eq!(storage.get(&held).await.unwrap().status, StackStatus::Deploying);
        assert_eq!(
            storage.get(&StackId::new("app-8")).await.unwrap().status,
            StackStatus::Deployed
        );
        // The other holder's lock is untouched
        assert!(storage.is_locked(&held).await);
    }

    #[tokio::test]
    async fn test_reconcile_is_idempotent() {
        let storage = InMemoryStorage::with_records(vec![record("app", "1", StackStatus::New)]);
        let executor = Arc::new(RecordingExecutor::new().with_stack("app", "1", "UPDATE_IN_PROGRESS"));
        let reconciler = reconciler(&storage, &executor);

        reconciler.run_cycle().await.unwrap();
        let first = storage.get(&StackId::new("app-1")).await.unwrap();
        reconciler.run_cycle().await.unwrap();
        let second = storage.get(&StackId::new("app-1")).await.unwrap();

        assert_eq!(first.status, StackStatus::mirror("UPDATE_IN_PROGRESS"));
        assert_eq!(first, second);
    }

    #[tokio::test]
    async fn test_cycle_runs_on_spawned_task() {
        let storage = InMemoryStorage::with_records(vec![
            record("app", "1", StackStatus::Deploying),
            record("app", "2", StackStatus::Deploying),
        ]);
        let executor = Arc::new(
            RecordingExecutor::new()
                .with_stack("app", "1", "CREATE_COMPLETE")
                .with_stack("app", "2", "CREATE_COMPLETE"),
        );
        let reconciler = Arc::new(reconciler(&storage, &executor));

        let task = tokio::spawn({
            let reconciler = reconciler.clone();
            async move { reconciler.run_cycle().await }
        });
        let report = task.await.unwrap().unwrap();

        assert_eq!(report, CycleReport { updated: 2, ..Default::default() });
    }

    struct PanickingDeployer;

    #[async_trait]
    impl Deployer for PanickingDeployer {
        fn name(&self) -> &'static str {
            "panicking"
        }

        async fn handle(&self, _record: &StackRecord, _context: &ReconcileContext<'_>) -> Outcome {
            panic!("deployer bug");
        }
    }

    #[tokio::test]
    async fn test_lock_released_when_deployer_panics() {
        let storage = InMemoryStorage::with_records(vec![record("app", "1", StackStatus::Deploying)]);
        let executor = Arc::new(RecordingExecutor::new().with_stack("app", "1", "CREATE_COMPLETE"));
        let reconciler = reconciler(&storage, &executor)
            .with_deployer(DeploymentStrategy::Cutover, Arc::new(PanickingDeployer));

        let report = reconciler.run_cycle().await.unwrap();

        assert_eq!(report, CycleReport { failed: 1, ..Default::default() });
        assert!(!storage.is_locked(&StackId::new("app-1")).await);
        assert_eq!(
            storage.get(&StackId::new("app-1")).await.unwrap().status,
            StackStatus::Deploying
        );
    }

    #[tokio::test]
    async fn test_deploy_and_forget_records_skip_side_effects() {
        let mut current = record("app", "2", StackStatus::Deployed);
        current.strategy = DeploymentStrategy::DeployAndForget;
        current.keep_count = 0;
        let storage = InMemoryStorage::with_records(vec![
            record("app", "1", StackStatus::mirror("UPDATE_COMPLETE")),
            current,
        ]);
        let executor = Arc::new(
            RecordingExecutor::new()
                .with_stack("app", "1", "UPDATE_COMPLETE")
                .with_stack("app", "2", "CREATE_COMPLETE"),
        );

        reconciler(&storage, &executor).run_cycle().await.unwrap();

        assert!(executor.mutations().is_empty());
        assert_eq!(
            storage.get(&StackId::new("app-2")).await.unwrap().status,
            StackStatus::mirror("CREATE_COMPLETE")
        );
    }
}
