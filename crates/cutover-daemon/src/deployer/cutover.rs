//! Cutover strategy
//!
//! Once a stack is deployed, traffic is routed to it and versions beyond the
//! record's retention are deleted.

use super::{transition, versions_to_remove, Deployer, ReconcileContext, Transition};
use crate::executor::CommandExecutor;
use async_trait::async_trait;
use cutover_types::{Outcome, StackRecord, StackStatus};
use std::sync::Arc;
use tracing::{debug, error, info, warn};

/// Switches traffic and prunes old versions when a stack is deployed
pub struct CutoverDeployer {
    executor: Arc<dyn CommandExecutor>,
}

impl CutoverDeployer {
    pub fn new(executor: Arc<dyn CommandExecutor>) -> Self {
        Self { executor }
    }

    /// Route the record's traffic weight to it, if the stack has domains
    async fn switch_traffic(&self, record: &StackRecord) {
        let domains = match self.executor.domains(&record.stack_name).await {
            Ok(domains) => domains,
            Err(e) => {
                error!(
                    stack_id = %record.id,
                    error = %e,
                    "Failed to get domains; traffic not switched"
                );
                return;
            }
        };

        if domains.is_empty() {
            info!(stack_id = %record.id, "Stack has no domains; traffic not switched");
            return;
        }

        if record.traffic_weight == 0 {
            debug!(stack_id = %record.id, "Target traffic is 0%; traffic not switched");
            return;
        }

        info!(
            stack_id = %record.id,
            traffic = record.traffic_weight,
            "Switching traffic"
        );
        match self
            .executor
            .traffic_set(&record.stack_name, &record.stack_version, record.traffic_weight)
            .await
        {
            Ok(weights) => debug!(stack_id = %record.id, ?weights, "Traffic switched"),
            Err(e) => error!(stack_id = %record.id, error = %e, "Failed to switch traffic"),
        }
    }

    /// Delete versions beyond the record's retention; each failure is logged
    /// and the rest are still attempted
    async fn prune(&self, record: &StackRecord, siblings: &[StackRecord]) {
        let to_remove = versions_to_remove(siblings, record.keep_count);
        if to_remove.is_empty() {
            return;
        }

        info!(
            stack_name = %record.stack_name,
            keep_count = record.keep_count,
            count = to_remove.len(),
            "Removing old versions"
        );

        for old in to_remove {
            if old.id == record.id {
                warn!(stack_id = %record.id, "Current version is past retention; removing it");
            }
            match self.executor.remove(&old.stack_name, &old.stack_version).await {
                Ok(()) => info!(stack_id = %old.id, "Removed old version"),
                Err(e) => error!(stack_id = %old.id, error = %e, "Failed to remove old version"),
            }
        }
    }
}

#[async_trait]
impl Deployer for CutoverDeployer {
    fn name(&self) -> &'static str {
        "cutover"
    }

    async fn handle(&self, record: &StackRecord, context: &ReconcileContext<'_>) -> Outcome {
        match transition(&record.status, context.snapshot.status_of(record)) {
            Transition::Settled(outcome) => outcome,
            Transition::Deployed { infra_status } => {
                self.switch_traffic(record).await;
                self.prune(record, context.siblings).await;
                Outcome::Status(StackStatus::mirror(infra_status))
            }
        }
    }
}
