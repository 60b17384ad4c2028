//! Deployment tool executor
//!
//! Every infrastructure change and observation goes through an external
//! deployment tool. The [`CommandExecutor`] trait is the seam between the
//! reconciler and that tool; [`DeployToolExecutor`] runs it as a subprocess.

mod process;

pub use process::DeployToolExecutor;

use crate::error::ExecutionError;
use async_trait::async_trait;
use cutover_types::{InfraStack, InfrastructureSnapshot};
use serde_json::Value;
use std::collections::BTreeMap;

/// Result type for deployment tool calls
pub type ExecutionResult<T> = Result<T, ExecutionError>;

/// Operations offered by the deployment tool
#[async_trait]
pub trait CommandExecutor: Send + Sync {
    /// Create an infrastructure stack from a template
    async fn create(
        &self,
        template: &str,
        version: &str,
        image_version: &str,
        parameters: &[String],
        disable_rollback: bool,
        tags: &BTreeMap<String, String>,
    ) -> ExecutionResult<()>;

    /// List all infrastructure stacks
    async fn list(&self) -> ExecutionResult<Vec<InfraStack>>;

    /// Delete one version of a stack
    async fn remove(&self, stack_name: &str, version: &str) -> ExecutionResult<()>;

    /// Current traffic weights of every version of a stack
    async fn traffic_get(&self, stack_name: &str) -> ExecutionResult<Vec<Value>>;

    /// Route `percentage` of the traffic to one version, returning the new weights
    async fn traffic_set(
        &self,
        stack_name: &str,
        version: &str,
        percentage: u8,
    ) -> ExecutionResult<Vec<Value>>;

    /// DNS domains of a stack
    async fn domains(&self, stack_name: &str) -> ExecutionResult<Vec<Value>>;

    /// Point the stack's launch configuration at another machine image
    async fn patch_image(&self, stack_name: &str, version: &str, image: &str)
        -> ExecutionResult<()>;

    /// Replace the running instances of a stack
    async fn respawn_instances(&self, stack_name: &str, version: &str) -> ExecutionResult<()>;

    /// Point-in-time status of every infrastructure stack
    async fn snapshot(&self) -> ExecutionResult<InfrastructureSnapshot> {
        Ok(self.list().await?.into_iter().collect())
    }
}
