//! Bounded pool for fire-and-forget side effects.
//!
//! Notifications and audit messages go through here so they never block
//! or fail a saga's critical path.

use std::future::Future;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tokio::sync::Semaphore;

/// Pool configuration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PoolConfig {
    pub max_concurrent: usize,
}

impl Default for PoolConfig {
    fn default() -> Self {
        Self { max_concurrent: 32 }
    }
}

/// Process-wide worker pool, shared by all sagas via cheap clones.
#[derive(Debug, Clone)]
pub struct WorkerPool {
    permits: Arc<Semaphore>,
    max_concurrent: usize,
}

impl WorkerPool {
    pub fn new(config: PoolConfig) -> Self {
        let max_concurrent = config.max_concurrent.max(1);
        Self {
            permits: Arc::new(Semaphore::new(max_concurrent)),
            max_concurrent,
        }
    }

    /// Spawns `job` if a slot is free. Never waits.
    ///
    /// Returns false when the pool is saturated; the job is dropped.
    pub fn submit<F>(&self, job_name: &'static str, job: F) -> bool
    where
        F: Future<Output = ()> + Send + 'static,
    {
        match Arc::clone(&self.permits).try_acquire_owned() {
            Ok(permit) => {
                metrics::counter!("worker_pool_jobs_submitted", "job" => job_name).increment(1);
                tokio::spawn(async move {
                    job.await;
                    drop(permit);
                });
                true
            }
            Err(_) => {
                tracing::warn!(job = job_name, "worker pool saturated, dropping job");
                metrics::counter!("worker_pool_jobs_rejected", "job" => job_name).increment(1);
                false
            }
        }
    }

    /// Waits until every submitted job finished.
    pub async fn wait_idle(&self) {
        let all = u32::try_from(self.max_concurrent).unwrap_or(u32::MAX);
        if let Ok(permits) = self.permits.acquire_many(all).await {
            drop(permits);
        }
    }

    pub fn available_permits(&self) -> usize {
        self.permits.available_permits()
    }

    pub fn max_concurrent(&self) -> usize {
        self.max_concurrent
    }
}

impl Default for WorkerPool {
    fn default() -> Self {
        Self::new(PoolConfig::default())
    }
}
