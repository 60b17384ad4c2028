//! Cutover Types - Core types for stack reconciliation
//!
//! Cutover keeps a record of desired application deployments ("stacks") and
//! reconciles it against the real status of cloud infrastructure stacks,
//! switching traffic to new versions and retiring superseded ones.
//!
//! ## Key Concepts
//!
//! - **StackRecord**: Desired state of one versioned deployment
//! - **StackStatus**: Closed set of reconciliation states plus mirrored infra statuses
//! - **Outcome**: Result of one reconciliation step (`Removed` or a new status)
//! - **InfrastructureSnapshot**: Point-in-time view of real infrastructure stacks
//! - **DeploymentStrategy**: Identifier selecting how a stack is reconciled

#![deny(unsafe_code)]
#![cfg_attr(feature = "strict-docs", warn(missing_docs))]
#![cfg_attr(not(feature = "strict-docs"), allow(missing_docs))]

pub mod ids;
pub mod snapshot;
pub mod stack;
pub mod status;

// Re-export main types
pub use ids::{StackId, StackKey};
pub use snapshot::{InfraStack, InfrastructureSnapshot};
pub use stack::{
    generate_version, stack_name_from_template, DeploymentStrategy, NewStack, StackRecord,
    StackValidationError, UnknownStrategy, KEEP_STACKS_TAG, MAX_TRAFFIC_WEIGHT, TARGET_TRAFFIC_TAG,
};
pub use status::{Outcome, StackStatus, CREATE_COMPLETE, CREATE_IN_PROGRESS};
