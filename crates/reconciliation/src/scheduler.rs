//! Periodic driver for [`ReconciliationJob`].

use std::sync::Arc;
use std::time::Duration;

use saga::ExecutionContext;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;

use crate::job::ReconciliationJob;

/// Shortest accepted interval. Shorter ones, zero included, are raised to it.
pub const MIN_INTERVAL: Duration = Duration::from_secs(1);

/// Runs a sweep every `interval` until its shutdown context is done.
///
/// The first sweep starts immediately. A sweep that overruns the interval
/// delays the next one rather than stacking ticks.
#[derive(Debug, Clone)]
pub struct ReconciliationScheduler {
    job: Arc<ReconciliationJob>,
    interval: Duration,
}

impl ReconciliationScheduler {
    pub fn new(job: Arc<ReconciliationJob>) -> Self {
        let interval = job.config().interval.max(MIN_INTERVAL);
        Self { job, interval }
    }

    pub fn with_interval(mut self, interval: Duration) -> Self {
        self.interval = interval.max(MIN_INTERVAL);
        self
    }

    pub fn interval(&self) -> Duration {
        self.interval
    }

    pub async fn run(self, shutdown: ExecutionContext) {
        tracing::info!(interval_secs = self.interval.as_secs_f64(), "Reconciliation scheduler started");

        let mut ticker = tokio::time::interval(self.interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                _ = shutdown.done() => break,
                _ = ticker.tick() => {
                    if let Err(e) = self.job.sweep().await {
                        tracing::error!(error = %e, "Reconciliation sweep aborted");
                        metrics::counter!("reconciliation_sweep_failures").increment(1);
                    }
                }
            }
        }

        tracing::info!("Reconciliation scheduler stopped");
    }

    /// Spawns [`run`](Self::run) on the current runtime.
    pub fn spawn(self, shutdown: ExecutionContext) -> JoinHandle<()> {
        tokio::spawn(self.run(shutdown))
    }
}
