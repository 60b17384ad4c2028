//! Per-stack deployers
//!
//! A deployer computes the next status of one stack record from the
//! infrastructure snapshot, running the strategy's side effects when the
//! stack has just finished deploying. Infrastructure failures inside those
//! side effects are logged and never change the computed outcome.
//!
//! | current status     | infra absent | CREATE_IN_PROGRESS | CREATE_COMPLETE | other       |
//! |--------------------|--------------|--------------------|-----------------|-------------|
//! | `DEPLOYING`        | removed      | `DEPLOYING`        | `DEPLOYED`      | `CF:<raw>`  |
//! | `DEPLOYED`         | removed      | side effects, then `CF:<raw>` | same | same       |
//! | `ERROR`            | unchanged    | unchanged          | unchanged       | unchanged   |
//! | anything else      | removed      | `CF:<raw>`         | `CF:<raw>`      | `CF:<raw>`  |

mod cutover;
mod deploy_and_forget;
mod retention;

pub use cutover::CutoverDeployer;
pub use deploy_and_forget::DeployAndForgetDeployer;
pub use retention::versions_to_remove;

use crate::executor::CommandExecutor;
use async_trait::async_trait;
use cutover_types::{
    DeploymentStrategy, InfrastructureSnapshot, Outcome, StackRecord, StackStatus,
    CREATE_COMPLETE, CREATE_IN_PROGRESS,
};
use std::sync::Arc;

/// What a deployer sees besides the record itself
#[derive(Debug, Clone, Copy)]
pub struct ReconcileContext<'a> {
    /// Infrastructure status of every stack, read at the start of the cycle
    pub snapshot: &'a InfrastructureSnapshot,

    /// Every live record sharing the record's stack name, itself included
    pub siblings: &'a [StackRecord],
}

/// Reconciliation strategy for one stack record
#[async_trait]
pub trait Deployer: Send + Sync {
    /// Strategy name, for logging
    fn name(&self) -> &'static str;

    /// Compute the record's next outcome, running side effects as needed
    async fn handle(&self, record: &StackRecord, context: &ReconcileContext<'_>) -> Outcome;
}

/// Factory for creating deployers
pub fn create_deployer(
    strategy: DeploymentStrategy,
    executor: Arc<dyn CommandExecutor>,
) -> Arc<dyn Deployer> {
    match strategy {
        DeploymentStrategy::Cutover => Arc::new(CutoverDeployer::new(executor)),
        DeploymentStrategy::DeployAndForget => Arc::new(DeployAndForgetDeployer::new()),
    }
}

/// Result of the status-only part of the transition table
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum Transition {
    /// Final outcome, no side effects due
    Settled(Outcome),

    /// The record is `DEPLOYED` and its stack still exists; the strategy's
    /// side effects run before the status becomes a mirror of `infra_status`
    Deployed { infra_status: String },
}

/// Apply the transition table to a record and its infrastructure status
pub(crate) fn transition(status: &StackStatus, infra_status: Option<&str>) -> Transition {
    if matches!(status, StackStatus::Error) {
        return Transition::Settled(Outcome::Status(StackStatus::Error));
    }

    let Some(infra_status) = infra_status else {
        return Transition::Settled(Outcome::Removed);
    };

    if status.is_deploying() {
        let next = match infra_status {
            CREATE_IN_PROGRESS => StackStatus::Deploying,
            CREATE_COMPLETE => StackStatus::Deployed,
            other => StackStatus::mirror(other),
        };
        return Transition::Settled(Outcome::Status(next));
    }

    if status.is_deployed() {
        return Transition::Deployed {
            infra_status: infra_status.to_string(),
        };
    }

    Transition::Settled(Outcome::Status(StackStatus::mirror(infra_status)))
}
