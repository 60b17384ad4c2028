//! Error types for cutover-daemon

use cutover_types::{StackId, StackValidationError};
use std::fmt;
use thiserror::Error;

/// Daemon-level errors
#[derive(Debug, Error)]
pub enum DaemonError {
    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),

    /// The infrastructure snapshot could not be read; the cycle was aborted
    #[error("Snapshot unavailable: {0}")]
    Snapshot(#[source] ExecutionError),

    /// Storage error
    #[error("Storage error: {0}")]
    Storage(#[from] StorageError),
}

/// Storage-specific errors
#[derive(Debug, Error)]
pub enum StorageError {
    /// Item not found
    #[error("Not found: {0}")]
    NotFound(StackId),

    /// Invalid data
    #[error("Invalid data: {0}")]
    InvalidData(String),

    /// Connection error
    #[error("Connection error: {0}")]
    Connection(String),

    /// Query error
    #[error("Query error: {0}")]
    Query(String),
}

/// Deployment tool operation that failed
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Operation {
    Create,
    List,
    Delete,
    TrafficGet,
    TrafficSet,
    Domains,
    Patch,
    Respawn,
}

impl Operation {
    pub fn subcommand(&self) -> &'static str {
        match self {
            Operation::Create => "create",
            Operation::List => "list",
            Operation::Delete => "delete",
            Operation::TrafficGet | Operation::TrafficSet => "traffic",
            Operation::Domains => "domains",
            Operation::Patch => "patch",
            Operation::Respawn => "respawn-instances",
        }
    }
}

impl fmt::Display for Operation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.subcommand())
    }
}

/// Why a tool invocation failed
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FailureReason {
    /// The process exited with a non-zero code
    ExitCode(i32),
    /// Symbolic reason: `JSON ERROR`, `SIGNAL`, `SPAWN`, `TIMEOUT`, `TEMPLATE`
    Symbolic(&'static str),
}

impl FailureReason {
    pub const INVALID_JSON: FailureReason = FailureReason::Symbolic("JSON ERROR");
    pub const SIGNAL: FailureReason = FailureReason::Symbolic("SIGNAL");
    pub const SPAWN: FailureReason = FailureReason::Symbolic("SPAWN");
    pub const TIMEOUT: FailureReason = FailureReason::Symbolic("TIMEOUT");
    pub const TEMPLATE: FailureReason = FailureReason::Symbolic("TEMPLATE");
}

impl fmt::Display for FailureReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FailureReason::ExitCode(code) => write!(f, "{}", code),
            FailureReason::Symbolic(reason) => f.write_str(reason),
        }
    }
}

/// The deployment tool did not run as expected
#[derive(Debug, Clone, Error, PartialEq, Eq)]
#[error("{operation} ({reason}): {output}")]
pub struct ExecutionError {
    pub operation: Operation,
    pub reason: FailureReason,
    pub output: String,
}

impl ExecutionError {
    pub fn new(operation: Operation, reason: FailureReason, output: impl AsRef<str>) -> Self {
        Self {
            operation,
            reason,
            output: output.as_ref().trim().to_string(),
        }
    }

    pub fn exit_code(&self) -> Option<i32> {
        match self.reason {
            FailureReason::ExitCode(code) => Some(code),
            FailureReason::Symbolic(_) => None,
        }
    }
}

/// Errors from direct, user-triggered stack operations
#[derive(Debug, Error)]
pub enum StackError {
    /// Stack record not found
    #[error("Stack not found: {0}")]
    NotFound(StackId),

    /// Another reconciliation pass holds the stack's lock
    #[error("Stack is being reconciled: {0}")]
    Busy(StackId),

    /// Invalid request
    #[error("Invalid request: {0}")]
    Invalid(#[from] StackValidationError),

    /// A record with this id already exists
    #[error("Stack already exists: {0}")]
    AlreadyExists(StackId),

    /// The deployment tool could not create the stack
    #[error("Stack not created: {0}")]
    CreateFailed(#[source] ExecutionError),

    /// Traffic could not be switched
    #[error("Traffic not updated: {0}")]
    TrafficNotUpdated(String),

    /// The machine image could not be replaced
    #[error("Image not updated: {0}")]
    ImageNotUpdated(#[source] ExecutionError),

    /// The infrastructure stack could not be deleted
    #[error("Stack not deleted: {0}")]
    DeleteFailed(#[source] ExecutionError),

    /// Storage error
    #[error("Storage error: {0}")]
    Storage(StorageError),
}

impl From<StorageError> for StackError {
    fn from(error: StorageError) -> Self {
        match error {
            StorageError::NotFound(id) => StackError::NotFound(id),
            other => StackError::Storage(other),
        }
    }
}

/// Result type alias for daemon operations
pub type DaemonResult<T> = Result<T, DaemonError>;

/// Result type alias for stack operations
pub type StackResult<T> = Result<T, StackError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_execution_error_display_trims_output() {
        let error = ExecutionError::new(Operation::Delete, FailureReason::ExitCode(20), "  Output   \n");
        assert_eq!(error.to_string(), "delete (20): Output");
        assert_eq!(error.exit_code(), Some(20));
    }

    #[test]
    fn test_symbolic_reason() {
        let error = ExecutionError::new(Operation::List, FailureReason::INVALID_JSON, "\"");
        assert_eq!(error.to_string(), "list (JSON ERROR): \"");
        assert_eq!(error.exit_code(), None);
    }

    #[test]
    fn test_storage_not_found_maps_to_stack_not_found() {
        let error = StackError::from(StorageError::NotFound(StackId::new("app-1")));
        assert!(matches!(error, StackError::NotFound(id) if id.as_str() == "app-1"));

        let error = StackError::from(StorageError::Query("boom".into()));
        assert!(matches!(error, StackError::Storage(_)));
    }
}
