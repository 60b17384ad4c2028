//! Identifiers for stacks
//!
//! A stack is addressed two ways: by its record id (`{name}-{version}`, the
//! same name the infrastructure stack carries) and by the composite
//! `(stack_name, stack_version)` key used to look it up in a snapshot.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Unique identifier of a stack record
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct StackId(String);

impl StackId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Derive the id from a stack name and version.
    pub fn from_parts(stack_name: &str, stack_version: &str) -> Self {
        Self(format!("{}-{}", stack_name, stack_version))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for StackId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for StackId {
    fn from(value: &str) -> Self {
        Self::new(value)
    }
}

/// Composite key of a versioned stack
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct StackKey {
    pub stack_name: String,
    pub stack_version: String,
}

impl StackKey {
    pub fn new(stack_name: impl Into<String>, stack_version: impl Into<String>) -> Self {
        Self {
            stack_name: stack_name.into(),
            stack_version: stack_version.into(),
        }
    }

    pub fn id(&self) -> StackId {
        StackId::from_parts(&self.stack_name, &self.stack_version)
    }
}

impl fmt::Display for StackKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}-{}", self.stack_name, self.stack_version)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_id_from_parts() {
        let id = StackId::from_parts("app", "7");
        assert_eq!(id.as_str(), "app-7");
        assert_eq!(id.to_string(), "app-7");
    }

    #[test]
    fn test_key_matches_id() {
        let key = StackKey::new("shop-api", "1o0T20160310123000");
        assert_eq!(key.id(), StackId::from_parts("shop-api", "1o0T20160310123000"));
        assert_eq!(key.to_string(), key.id().to_string());
    }

    #[test]
    fn test_id_serializes_as_plain_string() {
        let json = serde_json::to_string(&StackId::new("app-3")).unwrap();
        assert_eq!(json, "\"app-3\"");
    }
}
