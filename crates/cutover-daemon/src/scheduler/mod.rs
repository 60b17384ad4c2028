//! Periodic reconciliation scheduler

mod reconciler;

pub use reconciler::{CycleReport, Reconciler};

use crate::config::SchedulerConfig;
use std::sync::Arc;
use tokio::sync::{mpsc, watch, Semaphore};
use tokio::task::JoinHandle;
use tokio::time::{interval, Duration, MissedTickBehavior};

/// Scheduler state
pub struct Scheduler {
    reconciler: Arc<Reconciler>,
    reconcile_interval: Duration,
    cycles: Arc<Semaphore>,
    reconcile_tx: mpsc::Sender<()>,
    shutdown_tx: watch::Sender<bool>,
}

impl Scheduler {
    /// Create a new scheduler
    pub fn new(
        config: &SchedulerConfig,
        reconciler: Arc<Reconciler>,
    ) -> (Arc<Self>, mpsc::Receiver<()>) {
        let (reconcile_tx, reconcile_rx) = mpsc::channel(10);
        let (shutdown_tx, _) = watch::channel(false);

        let scheduler = Arc::new(Self {
            reconciler,
            reconcile_interval: Duration::from_secs(config.reconcile_interval_secs.max(1)),
            cycles: Arc::new(Semaphore::new(config.max_concurrent_cycles.max(1))),
            reconcile_tx,
            shutdown_tx,
        });

        (scheduler, reconcile_rx)
    }

    /// Trigger an immediate reconciliation
    pub async fn trigger_reconcile(&self) {
        let _ = self.reconcile_tx.send(()).await;
    }

    /// Run until [`Scheduler::stop`] is called, starting a cycle on every
    /// tick and on every trigger
    pub async fn start(self: Arc<Self>, mut reconcile_rx: mpsc::Receiver<()>) {
        let mut shutdown_rx = self.shutdown_tx.subscribe();
        let mut ticker = interval(self.reconcile_interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        tracing::info!(
            interval_secs = self.reconcile_interval.as_secs(),
            "Scheduler started"
        );

        loop {
            if *shutdown_rx.borrow() {
                break;
            }

            tokio::select! {
                _ = ticker.tick() => {
                    self.spawn_cycle("interval");
                }
                Some(_) = reconcile_rx.recv() => {
                    self.spawn_cycle("trigger");
                }
                _ = shutdown_rx.changed() => {}
            }
        }

        tracing::info!("Scheduler stopped");
    }

    /// Stop the scheduler; cycles already running finish on their own
    pub fn stop(&self) {
        self.shutdown_tx.send_replace(true);
    }

    /// Start one cycle in the background unless the concurrency limit is
    /// reached, in which case the request is dropped
    fn spawn_cycle(&self, source: &'static str) -> Option<JoinHandle<()>> {
        let permit = match self.cycles.clone().try_acquire_owned() {
            Ok(permit) => permit,
            Err(_) => {
                tracing::warn!(source, "Too many reconciliation cycles running; skipping");
                return None;
            }
        };

        let reconciler = self.reconciler.clone();
        Some(tokio::spawn(async move {
            if let Err(e) = reconciler.run_cycle().await {
                tracing::error!(source, error = %e, "Reconciliation failed");
            }
            drop(permit);
        }))
    }
}
