//! Saga error types.

use common::OrderId;
use domain::{OrderError, TransactionError};
use thiserror::Error;

/// Errors raised while building a saga, before any side effect happens.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SagaError {
    /// A step was added without a name.
    #[error("Saga '{saga}': step name must not be empty")]
    EmptyStepName { saga: String },

    /// A step was added without a forward action.
    #[error("Saga '{saga}': step '{step}' has no forward action")]
    MissingForward { saga: String, step: String },

    /// Two steps share a name, which would make the execution log ambiguous.
    #[error("Saga '{saga}': step '{step}' was added twice")]
    DuplicateStep { saga: String, step: String },
}

/// The single terminal error of one [`Coordinator::play`](crate::Coordinator::play).
///
/// `Step` displays as the underlying domain error so callers can surface
/// it to users unchanged.
#[derive(Debug, Error)]
pub enum ExecutionError<E>
where
    E: std::error::Error + 'static,
{
    /// The forward action of `step` failed.
    #[error("{source}")]
    Step { step: String, source: E },

    /// The operation context ended before `step` could start.
    #[error("Operation cancelled before step '{step}'")]
    Cancelled { step: String },
}

impl<E> ExecutionError<E>
where
    E: std::error::Error + 'static,
{
    /// Returns the name of the step at which execution stopped.
    pub fn step(&self) -> &str {
        match self {
            ExecutionError::Step { step, .. } | ExecutionError::Cancelled { step } => step,
        }
    }

    /// Returns the domain error, if the saga stopped on a failed step.
    pub fn domain_error(&self) -> Option<&E> {
        match self {
            ExecutionError::Step { source, .. } => Some(source),
            ExecutionError::Cancelled { .. } => None,
        }
    }
}

/// Errors returned by external collaborators.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ServiceError {
    /// The requested record does not exist.
    #[error("{entity} not found: {id}")]
    NotFound { entity: &'static str, id: String },

    /// The collaborator explicitly refused the operation.
    #[error("{0}")]
    Rejected(String),

    /// A conditional write did not match the stored record.
    #[error("Conflict: {0}")]
    Conflict(String),

    /// The order passed its expiry deadline.
    #[error("Order {0} has expired")]
    Expired(OrderId),

    /// The collaborator could not be reached or did not answer.
    #[error("Service unavailable: {0}")]
    Unavailable(String),
}

impl ServiceError {
    pub fn not_found(entity: &'static str, id: impl std::fmt::Display) -> Self {
        ServiceError::NotFound {
            entity,
            id: id.to_string(),
        }
    }
}

impl From<OrderError> for ServiceError {
    fn from(err: OrderError) -> Self {
        match err {
            OrderError::Expired(id) => ServiceError::Expired(id),
            other => ServiceError::Conflict(other.to_string()),
        }
    }
}

impl From<TransactionError> for ServiceError {
    fn from(err: TransactionError) -> Self {
        ServiceError::Conflict(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Debug, Error)]
    #[error("insufficient balance")]
    struct Insufficient;

    #[test]
    fn test_step_error_displays_domain_message() {
        let err: ExecutionError<Insufficient> = ExecutionError::Step {
            step: "init_ledger".to_string(),
            source: Insufficient,
        };
        assert_eq!(err.to_string(), "insufficient balance");
        assert_eq!(err.step(), "init_ledger");
        assert!(err.domain_error().is_some());
    }

    #[test]
    fn test_cancelled_error_has_no_domain_error() {
        let err: ExecutionError<Insufficient> = ExecutionError::Cancelled {
            step: "call_bank".to_string(),
        };
        assert_eq!(err.step(), "call_bank");
        assert!(err.domain_error().is_none());
    }

    #[test]
    fn test_service_error_display() {
        let err = ServiceError::not_found("Order", "abc");
        assert_eq!(err.to_string(), "Order not found: abc");
        assert_eq!(
            ServiceError::Rejected("KYC not verified".into()).to_string(),
            "KYC not verified"
        );
    }
}
