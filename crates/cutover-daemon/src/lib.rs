//! Cutover Daemon library
//!
//! This module provides the core components for the cutover daemon:
//! - Deployment tool executor
//! - Storage backends with per-stack locks
//! - Deployers (per-stack state machine and strategies)
//! - Scheduler and reconciliation
//! - Direct stack operations
//! - Server lifecycle management

pub mod config;
pub mod deployer;
pub mod error;
pub mod executor;
pub mod scheduler;
pub mod server;
pub mod service;
pub mod storage;

#[cfg(test)]
mod testing;

pub use config::DaemonConfig;
pub use error::{DaemonError, ExecutionError, StackError, StorageError};
pub use executor::{CommandExecutor, DeployToolExecutor};
pub use scheduler::{CycleReport, Reconciler, Scheduler};
pub use server::Server;
pub use service::StackService;
pub use storage::{InMemoryStorage, PostgresStorage, StackStorage};
