//! Shared types for the wallet transaction core.

mod ids;
mod money;

pub use ids::{OrderId, TransactionId, UserId};
pub use money::Money;
