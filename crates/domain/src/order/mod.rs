//! Order model and related types.

mod model;
mod state;
mod value_objects;

pub use model::Order;
pub use state::OrderStatus;
pub use value_objects::{OrderType, ProviderCode, SourceOfFund};

use common::{OrderId, TransactionId};
use thiserror::Error;

/// Errors that can occur during order operations.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum OrderError {
    /// The requested status change is not a legal forward transition.
    #[error("Invalid status transition: cannot move order from {from} to {to}")]
    InvalidStateTransition { from: OrderStatus, to: OrderStatus },

    /// The order already points at a different ledger record.
    #[error("Order is already linked to transaction {existing}")]
    AlreadyLinked { existing: TransactionId },

    /// The order passed its expiry deadline.
    #[error("Order {0} has expired")]
    Expired(OrderId),
}
