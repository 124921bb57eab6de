//! Order status state machine.

use serde::{Deserialize, Serialize};

/// The status of an order in its lifecycle.
///
/// State transitions:
/// ```text
/// Pending ──► Processing ──┬──► Success
///    │                     ├──► Cancelled
///    │                     ├──► Failed ◄──┐
///    │                     └──► Verifying ┴──► Success
///    └──► Failed | Cancelled
/// ```
///
/// Status only ever moves forward. `Success`, `Failed` and `Cancelled`
/// accept no further transition.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum OrderStatus {
    /// Order created, no ledger intent yet.
    #[default]
    Pending,

    /// The ledger accepted a debit/credit intent.
    Processing,

    /// Money movement completed (terminal state).
    Success,

    /// Money movement definitively did not happen (terminal state).
    Failed,

    /// Order withdrawn before completion (terminal state).
    Cancelled,

    /// An external response was indeterminate; awaiting reconciliation.
    Verifying,
}

impl OrderStatus {
    /// Returns true if the order may move from `self` to `next`.
    pub fn can_transition_to(&self, next: OrderStatus) -> bool {
        use OrderStatus::*;
        matches!(
            (self, next),
            (Pending, Processing | Failed | Cancelled)
                | (Processing, Success | Failed | Cancelled | Verifying)
                | (Verifying, Success | Failed)
        )
    }

    /// Returns true if a stored order in `self` may be overwritten with `next`.
    ///
    /// Persistence uses this as its conditional-replace filter: rewriting
    /// the same status is allowed, a terminal status is never changed, and
    /// a write may never move the order backward.
    pub fn accepts_overwrite(&self, next: OrderStatus) -> bool {
        *self == next || (!self.is_terminal() && next.rank() > self.rank())
    }

    fn rank(&self) -> u8 {
        match self {
            OrderStatus::Pending => 0,
            OrderStatus::Processing => 1,
            OrderStatus::Verifying => 2,
            OrderStatus::Success | OrderStatus::Failed | OrderStatus::Cancelled => 3,
        }
    }

    /// Returns true if this is a terminal state (no further transitions possible).
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            OrderStatus::Success | OrderStatus::Failed | OrderStatus::Cancelled
        )
    }

    /// Returns true if reconciliation may still resolve the order.
    pub fn is_unresolved(&self) -> bool {
        matches!(
            self,
            OrderStatus::Pending | OrderStatus::Processing | OrderStatus::Verifying
        )
    }

    /// Returns the status name as a string.
    pub fn as_str(&self) -> &'static str {
        match self {
            OrderStatus::Pending => "PENDING",
            OrderStatus::Processing => "PROCESSING",
            OrderStatus::Success => "SUCCESS",
            OrderStatus::Failed => "FAILED",
            OrderStatus::Cancelled => "CANCELLED",
            OrderStatus::Verifying => "VERIFYING",
        }
    }
}

impl std::fmt::Display for OrderStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}
