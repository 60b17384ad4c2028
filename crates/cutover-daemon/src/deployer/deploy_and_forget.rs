//! Deploy-and-forget strategy

use super::{transition, Deployer, ReconcileContext, Transition};
use async_trait::async_trait;
use cutover_types::{Outcome, StackRecord, StackStatus};

/// Tracks the infrastructure status of a stack without touching traffic or
/// older versions once it is deployed.
#[derive(Debug, Default)]
pub struct DeployAndForgetDeployer;

impl DeployAndForgetDeployer {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl Deployer for DeployAndForgetDeployer {
    fn name(&self) -> &'static str {
        "deploy_and_forget"
    }

    async fn handle(&self, record: &StackRecord, context: &ReconcileContext<'_>) -> Outcome {
        match transition(&record.status, context.snapshot.status_of(record)) {
            Transition::Settled(outcome) => outcome,
            Transition::Deployed { infra_status } => {
                Outcome::Status(StackStatus::mirror(infra_status))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use cutover_types::{InfraStack, InfrastructureSnapshot};

    #[tokio::test]
    async fn test_deployed_only_mirrors() {
        let record = crate::testing::record("app", "2", StackStatus::Deployed);
        let snapshot = InfrastructureSnapshot::from_stacks(vec![InfraStack::new(
            "app",
            "2",
            "UPDATE_COMPLETE",
        )]);
        let siblings = vec![record.clone()];
        let context = ReconcileContext {
            snapshot: &snapshot,
            siblings: &siblings,
        };

        let outcome = DeployAndForgetDeployer::new().handle(&record, &context).await;
        assert_eq!(outcome, Outcome::Status(StackStatus::mirror("UPDATE_COMPLETE")));
    }
}
