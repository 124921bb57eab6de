//! Saga state machine.

use serde::{Deserialize, Serialize};

/// The state of a saga execution.
///
/// State transitions:
/// ```text
/// NotStarted ──► Running ──┬──► Completed
///                          └──► Compensating ──┬──► Compensated
///                                              └──► PartiallyCompensated
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum SagaState {
    /// Saga has not started yet.
    #[default]
    NotStarted,

    /// Forward actions are being executed.
    Running,

    /// A step failed or the operation was cancelled; rollback is in progress.
    Compensating,

    /// All steps completed successfully (terminal state).
    Completed,

    /// Every attempted step was unwound (terminal state).
    Compensated,

    /// At least one compensation failed; manual follow-up may be needed (terminal state).
    PartiallyCompensated,
}

impl SagaState {
    /// Returns true if the saga can begin compensation.
    pub fn can_compensate(&self) -> bool {
        matches!(self, SagaState::Running)
    }

    /// Returns true if this is a terminal state.
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            SagaState::Completed | SagaState::Compensated | SagaState::PartiallyCompensated
        )
    }

    /// Returns the state name as a string.
    pub fn as_str(&self) -> &'static str {
        match self {
            SagaState::NotStarted => "not_started",
            SagaState::Running => "running",
            SagaState::Compensating => "compensating",
            SagaState::Completed => "completed",
            SagaState::Compensated => "compensated",
            SagaState::PartiallyCompensated => "partially_compensated",
        }
    }
}

impl std::fmt::Display for SagaState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}
