//! Stack status values and reconciliation outcomes
//!
//! Statuses are stored as plain strings: `NEW`, `DEPLOYING`, `DEPLOYED`,
//! `ERROR`, `REMOVED`, or `CF:<raw>` when mirroring the status reported by
//! the infrastructure.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Infrastructure status of a stack that is still being created
pub const CREATE_IN_PROGRESS: &str = "CREATE_IN_PROGRESS";

/// Infrastructure status of a stack whose creation finished
pub const CREATE_COMPLETE: &str = "CREATE_COMPLETE";

const MIRROR_PREFIX: &str = "CF:";

/// Status of a stack record
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum StackStatus {
    /// Recorded, no infrastructure observed yet
    New,
    /// Infrastructure stack is being created
    Deploying,
    /// Infrastructure stack was created; cutover side effects run
    Deployed,
    /// Creation failed; nothing more can be done
    Error,
    /// Marker for a record that should be deleted; never written by the reconciler
    Removed,
    /// Mirror of an infrastructure-reported status
    Cloud(String),
    /// Any other value read back from storage
    Unknown(String),
}

impl StackStatus {
    /// Mirror a raw infrastructure status.
    pub fn mirror(raw: impl Into<String>) -> Self {
        StackStatus::Cloud(raw.into())
    }

    /// Terminal records are deleted without being reconciled.
    pub fn is_terminal(&self) -> bool {
        matches!(self, StackStatus::Error | StackStatus::Removed)
    }

    /// `DEPLOYING` and a mirrored `CREATE_IN_PROGRESS` are the same state.
    pub fn is_deploying(&self) -> bool {
        match self {
            StackStatus::Deploying => true,
            StackStatus::Cloud(raw) => raw == CREATE_IN_PROGRESS,
            _ => false,
        }
    }

    pub fn is_deployed(&self) -> bool {
        matches!(self, StackStatus::Deployed)
    }
}

impl Default for StackStatus {
    fn default() -> Self {
        StackStatus::New
    }
}

impl fmt::Display for StackStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StackStatus::New => f.write_str("NEW"),
            StackStatus::Deploying => f.write_str("DEPLOYING"),
            StackStatus::Deployed => f.write_str("DEPLOYED"),
            StackStatus::Error => f.write_str("ERROR"),
            StackStatus::Removed => f.write_str("REMOVED"),
            StackStatus::Cloud(raw) => write!(f, "{}{}", MIRROR_PREFIX, raw),
            StackStatus::Unknown(raw) => f.write_str(raw),
        }
    }
}

impl From<&str> for StackStatus {
    fn from(value: &str) -> Self {
        match value {
            "NEW" => StackStatus::New,
            "DEPLOYING" => StackStatus::Deploying,
            "DEPLOYED" => StackStatus::Deployed,
            "ERROR" => StackStatus::Error,
            "REMOVED" => StackStatus::Removed,
            other => match other.strip_prefix(MIRROR_PREFIX) {
                Some(raw) => StackStatus::Cloud(raw.to_string()),
                None => StackStatus::Unknown(other.to_string()),
            },
        }
    }
}

impl From<String> for StackStatus {
    fn from(value: String) -> Self {
        StackStatus::from(value.as_str())
    }
}

impl From<StackStatus> for String {
    fn from(status: StackStatus) -> Self {
        status.to_string()
    }
}

/// Result of reconciling one stack record
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outcome {
    /// The infrastructure stack is gone; delete the record
    Removed,
    /// Store the record with this status
    Status(StackStatus),
}

impl From<StackStatus> for Outcome {
    fn from(status: StackStatus) -> Self {
        Outcome::Status(status)
    }
}

impl fmt::Display for Outcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Outcome::Removed => f.write_str("REMOVED"),
            Outcome::Status(status) => status.fmt(f),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_wire_form() {
        for raw in ["NEW", "DEPLOYING", "DEPLOYED", "ERROR", "REMOVED", "CF:UPDATE_COMPLETE"] {
            assert_eq!(StackStatus::from(raw).to_string(), raw);
        }
        assert_eq!(
            StackStatus::from("CF:ROLLBACK_COMPLETE"),
            StackStatus::Cloud("ROLLBACK_COMPLETE".into())
        );
    }

    #[test]
    fn test_unknown_values_survive() {
        let status = StackStatus::from("CHANGING");
        assert_eq!(status, StackStatus::Unknown("CHANGING".into()));
        assert_eq!(status.to_string(), "CHANGING");
        assert!(!status.is_terminal());
    }

    #[test]
    fn test_terminal_and_deploying() {
        assert!(StackStatus::Error.is_terminal());
        assert!(StackStatus::Removed.is_terminal());
        assert!(!StackStatus::Deployed.is_terminal());

        assert!(StackStatus::Deploying.is_deploying());
        assert!(StackStatus::mirror(CREATE_IN_PROGRESS).is_deploying());
        assert!(!StackStatus::mirror(CREATE_COMPLETE).is_deploying());
    }

    #[test]
    fn test_serde_as_string() {
        let json = serde_json::to_string(&StackStatus::mirror("UPDATE_COMPLETE")).unwrap();
        assert_eq!(json, "\"CF:UPDATE_COMPLETE\"");
        let back: StackStatus = serde_json::from_str("\"DEPLOYED\"").unwrap();
        assert_eq!(back, StackStatus::Deployed);
    }

    #[test]
    fn test_outcome() {
        let outcome = Outcome::from(StackStatus::Deployed);
        assert_eq!(outcome, Outcome::Status(StackStatus::Deployed));
        assert_eq!(outcome.to_string(), "DEPLOYED");
    }
}
