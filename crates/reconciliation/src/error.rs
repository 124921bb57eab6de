//! Reconciliation error types.

use saga::ServiceError;
use thiserror::Error;

/// Errors that abort a whole sweep.
///
/// Per-order failures never abort a sweep; they are counted in the
/// [`SweepReport`](crate::SweepReport) and retried on the next run.
#[derive(Debug, Error)]
pub enum ReconciliationError {
    /// The candidate orders could not be listed.
    #[error("Order store error: {0}")]
    Store(#[from] ServiceError),
}

/// Result type for reconciliation operations.
pub type Result<T> = std::result::Result<T, ReconciliationError>;
