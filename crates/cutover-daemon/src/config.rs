//! Configuration for cutover-daemon

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Main daemon configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DaemonConfig {
    /// Deployment tool configuration
    #[serde(default)]
    pub executor: ExecutorConfig,

    /// Storage configuration
    #[serde(default)]
    pub storage: StorageConfig,

    /// Scheduler configuration
    #[serde(default)]
    pub scheduler: SchedulerConfig,

    /// Logging configuration
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Deployment tool configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExecutorConfig {
    /// Program invoked for every operation
    #[serde(default = "default_program")]
    pub program: String,

    /// Cloud region passed to every invocation
    #[serde(default = "default_region")]
    pub region: String,

    /// Kill a command that runs longer than this; unset waits forever
    #[serde(default)]
    pub command_timeout_secs: Option<u64>,

    /// Directory for the template files handed to `create`; the system
    /// temporary directory when unset
    #[serde(default)]
    pub template_dir: Option<PathBuf>,
}

impl Default for ExecutorConfig {
    fn default() -> Self {
        Self {
            program: default_program(),
            region: default_region(),
            command_timeout_secs: None,
            template_dir: None,
        }
    }
}

/// Storage configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum StorageConfig {
    /// In-memory storage (for development/testing)
    Memory,

    /// PostgreSQL storage
    Postgres {
        /// Connection URL
        url: String,

        /// Maximum connections in pool
        #[serde(default = "default_pool_size")]
        max_connections: u32,

        /// Connection timeout in seconds
        #[serde(default = "default_connection_timeout")]
        connect_timeout_secs: u64,
    },
}

impl Default for StorageConfig {
    fn default() -> Self {
        StorageConfig::Memory
    }
}

/// Scheduler configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SchedulerConfig {
    /// Reconciliation interval in seconds
    #[serde(default = "default_reconcile_interval")]
    pub reconcile_interval_secs: u64,

    /// Per-stack lock lifetime in milliseconds
    #[serde(default = "default_lock_ttl")]
    pub lock_ttl_ms: u64,

    /// Maximum reconciliation cycles running at once
    #[serde(default = "default_max_concurrent_cycles")]
    pub max_concurrent_cycles: usize,

    /// Maximum stacks reconciled at once within one cycle
    #[serde(default = "default_max_concurrent_records")]
    pub max_concurrent_records: usize,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            reconcile_interval_secs: default_reconcile_interval(),
            lock_ttl_ms: default_lock_ttl(),
            max_concurrent_cycles: default_max_concurrent_cycles(),
            max_concurrent_records: default_max_concurrent_records(),
        }
    }
}

/// Logging configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Log level
    #[serde(default = "default_log_level")]
    pub level: String,

    /// JSON format
    #[serde(default)]
    pub json: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            json: false,
        }
    }
}

// Default value helpers
fn default_program() -> String {
    "senza".to_string()
}

fn default_region() -> String {
    "eu-west-1".to_string()
}

fn default_pool_size() -> u32 {
    10
}

fn default_connection_timeout() -> u64 {
    5
}

fn default_reconcile_interval() -> u64 {
    15
}

fn default_lock_ttl() -> u64 {
    3_600_000
}

fn default_max_concurrent_cycles() -> usize {
    10
}

fn default_max_concurrent_records() -> usize {
    4
}

fn default_log_level() -> String {
    "info".to_string()
}

impl DaemonConfig {
    /// Load configuration from defaults, an optional file and `CUTOVER_*`
    /// environment variables, in that order of precedence.
    pub fn load(path: Option<&str>) -> Result<Self, config::ConfigError> {
        let mut builder = config::Config::builder();

        // Add default configuration
        builder = builder.add_source(config::Config::try_from(&DaemonConfig::default())?);

        // Add file configuration if provided
        if let Some(path) = path {
            builder = builder.add_source(config::File::with_name(path).required(false));
        }

        // CUTOVER_SCHEDULER__LOCK_TTL_MS=60000 sets scheduler.lock_ttl_ms
        builder = builder.add_source(
            config::Environment::with_prefix("CUTOVER")
                .prefix_separator("_")
                .separator("__")
                .try_parsing(true),
        );

        builder.build()?.try_deserialize()
    }
}
