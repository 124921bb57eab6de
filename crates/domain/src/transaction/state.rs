//! Ledger record state and status.

use serde::{Deserialize, Serialize};

/// Whether the ledger record can still be withdrawn.
///
/// ```text
/// Initial ──► Resolved
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TransactionState {
    /// Intent recorded, nothing committed. The only cancellable state.
    #[default]
    Initial,

    /// Committed by the ledger (held pending, finished or failed).
    Resolved,
}

impl TransactionState {
    pub fn as_str(&self) -> &'static str {
        match self {
            TransactionState::Initial => "INITIAL",
            TransactionState::Resolved => "RESOLVED",
        }
    }
}

impl std::fmt::Display for TransactionState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Money-movement status of a ledger record.
///
/// ```text
/// Processing ──┬──► Finish
///              ├──► Failed
///              └──► Pending ──┬──► Finish
///                             └──► Failed
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TransactionStatus {
    #[default]
    Processing,
    /// Funds held while the external outcome is unknown.
    Pending,
    Finish,
    Failed,
}

impl TransactionStatus {
    /// Returns true if the ledger record may move from `self` to `next`.
    pub fn can_transition_to(&self, next: TransactionStatus) -> bool {
        use TransactionStatus::*;
        matches!(
            (self, next),
            (Processing, Pending | Finish | Failed) | (Pending, Finish | Failed)
        )
    }

    /// Returns true if money movement is settled one way or the other.
    pub fn is_final(&self) -> bool {
        matches!(self, TransactionStatus::Finish | TransactionStatus::Failed)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            TransactionStatus::Processing => "PROCESSING",
            TransactionStatus::Pending => "PENDING",
            TransactionStatus::Finish => "FINISH",
            TransactionStatus::Failed => "FAILED",
        }
    }
}

impl std::fmt::Display for TransactionStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}
