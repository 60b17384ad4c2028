//! Infrastructure snapshots
//!
//! A snapshot is re-read from the deployment tool on every reconciliation
//! cycle and never persisted. A stack missing from the snapshot no longer
//! exists.

use crate::{StackKey, StackRecord};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// One infrastructure stack as reported by the deployment tool
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InfraStack {
    pub stack_name: String,
    pub version: String,
    pub status: String,
}

impl InfraStack {
    pub fn new(
        stack_name: impl Into<String>,
        version: impl Into<String>,
        status: impl Into<String>,
    ) -> Self {
        Self {
            stack_name: stack_name.into(),
            version: version.into(),
            status: status.into(),
        }
    }

    pub fn key(&self) -> StackKey {
        StackKey::new(&self.stack_name, &self.version)
    }
}

/// Point-in-time infrastructure status of every stack
#[derive(Debug, Clone, Default)]
pub struct InfrastructureSnapshot {
    stacks: HashMap<StackKey, String>,
}

impl InfrastructureSnapshot {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a snapshot from the tool's stack listing. Later entries win on
    /// duplicate keys.
    pub fn from_stacks(stacks: impl IntoIterator<Item = InfraStack>) -> Self {
        Self {
            stacks: stacks
                .into_iter()
                .map(|stack| (stack.key(), stack.status))
                .collect(),
        }
    }

    pub fn insert(&mut self, stack: InfraStack) {
        self.stacks.insert(stack.key(), stack.status);
    }

    pub fn status(&self, key: &StackKey) -> Option<&str> {
        self.stacks.get(key).map(String::as_str)
    }

    /// Infrastructure status of the stack backing a record.
    pub fn status_of(&self, record: &StackRecord) -> Option<&str> {
        self.status(&record.key())
    }

    pub fn len(&self) -> usize {
        self.stacks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.stacks.is_empty()
    }
}

impl FromIterator<InfraStack> for InfrastructureSnapshot {
    fn from_iter<T: IntoIterator<Item = InfraStack>>(iter: T) -> Self {
        Self::from_stacks(iter)
    }
}
