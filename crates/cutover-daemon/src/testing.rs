//! Test doubles shared by the unit tests

use crate::error::{ExecutionError, FailureReason, Operation};
use crate::executor::{CommandExecutor, ExecutionResult};
use async_trait::async_trait;
use chrono::{Duration, TimeZone, Utc};
use cutover_types::{InfraStack, StackId, StackRecord, StackStatus};
use serde_json::{json, Value};
use std::collections::{BTreeMap, HashSet};
use std::sync::Mutex;
use std::time::Duration as StdDuration;

/// A record whose creation time grows with its version number, so that
/// numeric versions sort oldest first.
pub fn record(stack_name: &str, stack_version: &str, status: StackStatus) -> StackRecord {
    let offset = stack_version.parse::<i64>().unwrap_or(0);
    StackRecord {
        id: StackId::from_parts(stack_name, stack_version),
        stack_name: stack_name.to_string(),
        stack_version: stack_version.to_string(),
        creation_time: Utc.with_ymd_and_hms(2016, 3, 10, 12, 0, 0).unwrap() + Duration::minutes(offset),
        image_version: "1.0".to_string(),
        application_version: None,
        traffic_weight: 100,
        keep_count: 1,
        template_body: format!("SenzaInfo:\n  StackName: {}\n", stack_name),
        parameters: Vec::new(),
        tags: BTreeMap::new(),
        status,
        strategy: Default::default(),
        image: None,
    }
}

/// Executor call as seen by [`RecordingExecutor`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Call {
    Create {
        version: String,
        image_version: String,
        disable_rollback: bool,
        tags: BTreeMap<String, String>,
    },
    List,
    Remove(String, String),
    TrafficGet(String),
    TrafficSet(String, String, u8),
    Domains(String),
    Patch(String, String, String),
    Respawn(String, String),
}

/// Executor that records every call and answers from canned state
#[derive(Debug)]
pub struct RecordingExecutor {
    calls: Mutex<Vec<Call>>,
    stacks: Vec<InfraStack>,
    domains: Vec<Value>,
    failing: HashSet<Operation>,
    create_delay: Option<StdDuration>,
}

impl Default for RecordingExecutor {
    fn default() -> Self {
        Self {
            calls: Mutex::new(Vec::new()),
            stacks: Vec::new(),
            domains: vec![json!({"domain": "app.example.org"})],
            failing: HashSet::new(),
            create_delay: None,
        }
    }
}

impl RecordingExecutor {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_stack(mut self, stack_name: &str, version: &str, status: &str) -> Self {
        self.stacks.push(InfraStack::new(stack_name, version, status));
        self
    }

    pub fn without_domains(mut self) -> Self {
        self.domains.clear();
        self
    }

    pub fn failing(mut self, operation: Operation) -> Self {
        self.failing.insert(operation);
        self
    }

    /// Make `create` take `delay` before it answers
    pub fn slow_create(mut self, delay: StdDuration) -> Self {
        self.create_delay = Some(delay);
        self
    }

    pub fn calls(&self) -> Vec<Call> {
        self.calls.lock().unwrap().clone()
    }

    /// Calls that change infrastructure
    pub fn mutations(&self) -> Vec<Call> {
        self.calls()
            .into_iter()
            .filter(|call| {
                !matches!(call, Call::List | Call::Domains(_) | Call::TrafficGet(_))
            })
            .collect()
    }

    fn record_call(&self, operation: Operation, call: Call) -> ExecutionResult<()> {
        self.calls.lock().unwrap().push(call);
        if self.failing.contains(&operation) {
            return Err(ExecutionError::new(
                operation,
                FailureReason::ExitCode(1),
                format!("{} failed", operation),
            ));
        }
        Ok(())
    }
}

#[async_trait]
impl CommandExecutor for RecordingExecutor {
    async fn create(
        &self,
        _template: &str,
        version: &str,
        image_version: &str,
        _parameters: &[String],
        disable_rollback: bool,
        tags: &BTreeMap<String, String>,
    ) -> ExecutionResult<()> {
        if let Some(delay) = self.create_delay {
            tokio::time::sleep(delay).await;
        }
        self.record_call(
            Operation::Create,
            Call::Create {
                version: version.to_string(),
                image_version: image_version.to_string(),
                disable_rollback,
                tags: tags.clone(),
            },
        )
    }

    async fn list(&self) -> ExecutionResult<Vec<InfraStack>> {
        self.record_call(Operation::List, Call::List)?;
        Ok(self.stacks.clone())
    }

    async fn remove(&self, stack_name: &str, version: &str) -> ExecutionResult<()> {
        self.record_call(
            Operation::Delete,
            Call::Remove(stack_name.to_string(), version.to_string()),
        )
    }

    async fn traffic_get(&self, stack_name: &str) -> ExecutionResult<Vec<Value>> {
        self.record_call(Operation::TrafficGet, Call::TrafficGet(stack_name.to_string()))?;
        Ok(Vec::new())
    }

    async fn traffic_set(
        &self,
        stack_name: &str,
        version: &str,
        percentage: u8,
    ) -> ExecutionResult<Vec<Value>> {
        self.record_call(
            Operation::TrafficSet,
            Call::TrafficSet(stack_name.to_string(), version.to_string(), percentage),
        )?;
        Ok(vec![json!({"version": version, "weight": percentage})])
    }

    async fn domains(&self, stack_name: &str) -> ExecutionResult<Vec<Value>> {
        self.record_call(Operation::Domains, Call::Domains(stack_name.to_string()))?;
        Ok(self.domains.clone())
    }

    async fn patch_image(
        &self,
        stack_name: &str,
        version: &str,
        image: &str,
    ) -> ExecutionResult<()> {
        self.record_call(
            Operation::Patch,
            Call::Patch(stack_name.to_string(), version.to_string(), image.to_string()),
        )
    }

    async fn respawn_instances(&self, stack_name: &str, version: &str) -> ExecutionResult<()> {
        self.record_call(
            Operation::Respawn,
            Call::Respawn(stack_name.to_string(), version.to_string()),
        )
    }
}
