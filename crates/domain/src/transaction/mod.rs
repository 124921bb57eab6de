//! Ledger transaction record and its state gating.

mod model;
mod state;

pub use model::Transaction;
pub use state::{TransactionState, TransactionStatus};

use thiserror::Error;

/// Errors that can occur when mutating a ledger record.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TransactionError {
    /// Cancellation is only possible while the record is still initial.
    #[error("Transaction cannot be cancelled in {0} state")]
    NotCancellable(TransactionState),

    /// The requested status change is not allowed.
    #[error("Invalid transaction transition: cannot move from {from} to {to}")]
    InvalidTransition {
        from: TransactionStatus,
        to: TransactionStatus,
    },
}
