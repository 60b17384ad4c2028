//! Server setup and lifecycle management

use crate::config::{DaemonConfig, StorageConfig};
use crate::error::{DaemonError, DaemonResult};
use crate::executor::{CommandExecutor, DeployToolExecutor};
use crate::scheduler::{CycleReport, Reconciler, Scheduler};
use crate::service::StackService;
use crate::storage::{InMemoryStorage, PostgresStorage, StackStorage};
use std::sync::Arc;

/// Cutover daemon server
pub struct Server {
    config: DaemonConfig,
    reconciler: Arc<Reconciler>,
    service: StackService,
}

impl Server {
    /// Create a new server with the given configuration, connecting to the
    /// configured storage backend
    pub async fn new(config: DaemonConfig) -> DaemonResult<Self> {
        let storage: Arc<dyn StackStorage> = match &config.storage {
            StorageConfig::Memory => {
                tracing::info!("Using in-memory storage");
                Arc::new(InMemoryStorage::new())
            }
            StorageConfig::Postgres {
                url,
                max_connections,
                connect_timeout_secs,
            } => {
                tracing::info!("Using PostgreSQL storage");
                Arc::new(PostgresStorage::new(url, *max_connections, *connect_timeout_secs).await?)
            }
        };

        let executor: Arc<dyn CommandExecutor> = Arc::new(DeployToolExecutor::new(&config.executor));

        Ok(Self::with_parts(config, storage, executor))
    }

    /// Assemble a server from an existing storage and executor
    pub fn with_parts(
        config: DaemonConfig,
        storage: Arc<dyn StackStorage>,
        executor: Arc<dyn CommandExecutor>,
    ) -> Self {
        let reconciler = Arc::new(Reconciler::new(
            &config.scheduler,
            storage.clone(),
            executor.clone(),
        ));
        let service = StackService::new(&config.scheduler, storage, executor);

        Self {
            config,
            reconciler,
            service,
        }
    }

    /// Fail unless records outlive this process.
    ///
    /// One-shot commands run in their own process, so with in-memory
    /// storage whatever they record is gone before a reconciler sees it.
    pub fn require_persistent_storage(&self) -> DaemonResult<()> {
        match self.config.storage {
            StorageConfig::Memory => Err(DaemonError::Config(
                "one-shot commands need persistent storage; configure storage.type = \"postgres\""
                    .to_string(),
            )),
            StorageConfig::Postgres { .. } => Ok(()),
        }
    }

    /// Direct stack operations
    pub fn service(&self) -> &StackService {
        &self.service
    }

    /// Run exactly one reconciliation cycle
    pub async fn reconcile_once(&self) -> DaemonResult<CycleReport> {
        self.reconciler.run_cycle().await
    }

    /// Run the scheduler until SIGINT or SIGTERM
    pub async fn run(self) -> DaemonResult<()> {
        let (scheduler, reconcile_rx) = Scheduler::new(&self.config.scheduler, self.reconciler.clone());

        tracing::info!(
            region = %self.config.executor.region,
            program = %self.config.executor.program,
            "Cutover daemon started"
        );

        let scheduler_task = tokio::spawn(scheduler.clone().start(reconcile_rx));

        shutdown_signal().await;

        tracing::info!("Cutover daemon shutting down");

        // Stop scheduler
        scheduler.stop();
        if let Err(e) = scheduler_task.await {
            tracing::error!(error = %e, "Scheduler task failed");
        }

        Ok(())
    }
}

/// Graceful shutdown signal handler
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!(error = %e, "Failed to install Ctrl+C handler");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                tracing::error!(error = %e, "Failed to install signal handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            tracing::info!("Received Ctrl+C, initiating graceful shutdown");
        }
        _ = terminate => {
            tracing::info!("Received terminate signal, initiating graceful shutdown");
        }
    }
}
