//! Execution log sinks.
//!
//! The coordinator records every attempted step once per play. Sinks are
//! write-only and best-effort: a sink never fails the saga.

use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::RwLock;

use crate::outcome::{CompensationStatus, ForwardStatus, StepOutcome};

/// Append-only audit sink for saga executions.
#[async_trait]
pub trait ExecutionLog: Send + Sync {
    async fn record(&self, saga_name: &str, outcomes: &[StepOutcome]);
}

/// One recorded execution.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExecutionRecord {
    pub saga_name: String,
    pub outcomes: Vec<StepOutcome>,
    pub recorded_at: DateTime<Utc>,
}

/// Writes each step outcome as a structured tracing event.
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingExecutionLog;

#[async_trait]
impl ExecutionLog for TracingExecutionLog {
    async fn record(&self, saga_name: &str, outcomes: &[StepOutcome]) {
        for outcome in outcomes {
            let duration_ms = outcome.duration.as_millis() as u64;
            let compensation = match &outcome.compensation {
                None => "none",
                Some(CompensationStatus::NotRequired) => "not_required",
                Some(CompensationStatus::Compensated) => "compensated",
                Some(CompensationStatus::Failed { .. }) => "failed",
            };
            match &outcome.forward {
                ForwardStatus::Succeeded => tracing::info!(
                    saga = saga_name,
                    step = %outcome.step,
                    duration_ms,
                    compensation,
                    "saga step succeeded"
                ),
                ForwardStatus::Failed { error } => tracing::warn!(
                    saga = saga_name,
                    step = %outcome.step,
                    duration_ms,
                    compensation,
                    error = %error,
                    "saga step failed"
                ),
            }
            if let Some(CompensationStatus::Failed { error }) = &outcome.compensation {
                tracing::error!(
                    saga = saga_name,
                    step = %outcome.step,
                    error = %error,
                    "compensation failed"
                );
            }
        }
    }
}

/// Keeps records in memory. Used by tests and the worker's debug surface.
#[derive(Debug, Clone, Default)]
pub struct InMemoryExecutionLog {
    records: Arc<RwLock<Vec<ExecutionRecord>>>,
}

impl InMemoryExecutionLog {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn records(&self) -> Vec<ExecutionRecord> {
        self.records.read().await.clone()
    }

    pub async fn len(&self) -> usize {
        self.records.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.records.read().await.is_empty()
    }

    /// Returns the latest record for `saga_name`.
    pub async fn last_for(&self, saga_name: &str) -> Option<ExecutionRecord> {
        self.records
            .read()
            .await
            .iter()
            .rev()
            .find(|r| r.saga_name == saga_name)
            .cloned()
    }
}

#[async_trait]
impl ExecutionLog for InMemoryExecutionLog {
    async fn record(&self, saga_name: &str, outcomes: &[StepOutcome]) {
        self.records.write().await.push(ExecutionRecord {
            saga_name: saga_name.to_string(),
            outcomes: outcomes.to_vec(),
            recorded_at: Utc::now(),
        });
    }
}

/// Forwards every record to several sinks in order.
#[derive(Clone, Default)]
pub struct FanoutExecutionLog {
    sinks: Vec<Arc<dyn ExecutionLog>>,
}

impl FanoutExecutionLog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_sink(mut self, sink: Arc<dyn ExecutionLog>) -> Self {
        self.sinks.push(sink);
        self
    }
}

#[async_trait]
impl ExecutionLog for FanoutExecutionLog {
    async fn record(&self, saga_name: &str, outcomes: &[StepOutcome]) {
        for sink in &self.sinks {
            sink.record(saga_name, outcomes).await;
        }
    }
}
