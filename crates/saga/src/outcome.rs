//! Per-step outcomes and the result of one saga execution.

use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::ExecutionError;
use crate::state::SagaState;
use crate::step::StepOptions;

/// Result of a step's forward action.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum ForwardStatus {
    Succeeded,
    Failed { error: String },
}

/// Result of a step's compensate action.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum CompensationStatus {
    /// The step has no compensate action.
    NotRequired,
    Compensated,
    Failed { error: String },
}

/// Audit record of one attempted step.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StepOutcome {
    pub step: String,
    pub forward: ForwardStatus,
    /// `None` unless the saga unwound.
    pub compensation: Option<CompensationStatus>,
    pub started_at: DateTime<Utc>,
    pub duration: Duration,
    pub options: StepOptions,
}

impl StepOutcome {
    pub fn succeeded(&self) -> bool {
        self.forward == ForwardStatus::Succeeded
    }

    pub fn compensated(&self) -> bool {
        self.compensation == Some(CompensationStatus::Compensated)
    }

    pub fn compensation_failed(&self) -> bool {
        matches!(self.compensation, Some(CompensationStatus::Failed { .. }))
    }
}

/// Everything one [`Coordinator::play`](crate::Coordinator::play) produced.
#[derive(Debug)]
pub struct ExecutionResult<E>
where
    E: std::error::Error + 'static,
{
    pub saga_name: String,
    pub state: SagaState,
    /// Steps in the order they were attempted. Steps that never ran are absent.
    pub steps: Vec<StepOutcome>,
    pub error: Option<ExecutionError<E>>,
}

impl<E> ExecutionResult<E>
where
    E: std::error::Error + 'static,
{
    pub fn is_success(&self) -> bool {
        self.error.is_none()
    }

    pub fn error(&self) -> Option<&ExecutionError<E>> {
        self.error.as_ref()
    }

    pub fn into_error(self) -> Option<ExecutionError<E>> {
        self.error
    }

    pub fn steps(&self) -> &[StepOutcome] {
        &self.steps
    }

    /// Names of the steps whose compensation ran successfully, in execution order.
    pub fn compensated_steps(&self) -> Vec<&str> {
        self.steps
            .iter()
            .filter(|s| s.compensated())
            .map(|s| s.step.as_str())
            .collect()
    }

    /// Converts into a plain `Result`, keeping the terminal error.
    pub fn into_result(self) -> Result<(), ExecutionError<E>> {
        match self.error {
            Some(err) => Err(err),
            None => Ok(()),
        }
    }
}
