//! Order model.

use chrono::{DateTime, Utc};
use common::{Money, OrderId, TransactionId, UserId};
use serde::{Deserialize, Serialize};

use super::{OrderError, OrderStatus, OrderType, ProviderCode, SourceOfFund};

/// A customer-visible financial intent.
///
/// The identifier and the expiry deadline are fixed at creation. Every
/// status change goes through [`OrderStatus::can_transition_to`], so the
/// status only moves forward.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Order {
    id: OrderId,
    user_id: UserId,
    amount: Money,
    order_type: OrderType,
    sub_type: Option<String>,
    source_of_fund: SourceOfFund,
    provider: Option<ProviderCode>,
    status: OrderStatus,
    transaction_id: Option<TransactionId>,
    bank_trace_id: Option<String>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
    expired_at: DateTime<Utc>,
    fail_reason: Option<String>,
    is_expired: bool,
    is_retrieved: bool,
    /// The bank asked for an OTP and is waiting for the user's answer.
    #[serde(default)]
    awaiting_otp: bool,
}

impl Order {
    /// Creates a new `Pending` order that expires at `expired_at`.
    pub fn new(
        user_id: UserId,
        order_type: OrderType,
        amount: Money,
        expired_at: DateTime<Utc>,
    ) -> Self {
        let now = Utc::now();
        Self {
            id: OrderId::new(),
            user_id,
            amount,
            order_type,
            sub_type: None,
            source_of_fund: SourceOfFund::default(),
            provider: None,
            status: OrderStatus::Pending,
            transaction_id: None,
            bank_trace_id: None,
            created_at: now,
            updated_at: now,
            expired_at,
            fail_reason: None,
            is_expired: false,
            is_retrieved: false,
            awaiting_otp: false,
        }
    }

    /// Sets the provider that will execute the order.
    pub fn with_provider(mut self, provider: ProviderCode) -> Self {
        self.provider = Some(provider);
        self
    }

    /// Sets where the money comes from.
    pub fn with_source_of_fund(mut self, source_of_fund: SourceOfFund) -> Self {
        self.source_of_fund = source_of_fund;
        self
    }

    /// Sets the flow-specific sub type (e.g. a bill category).
    pub fn with_sub_type(mut self, sub_type: impl Into<String>) -> Self {
        self.sub_type = Some(sub_type.into());
        self
    }
}

// Query methods
impl Order {
    pub fn id(&self) -> OrderId {
        self.id
    }

    pub fn user_id(&self) -> UserId {
        self.user_id
    }

    pub fn amount(&self) -> Money {
        self.amount
    }

    pub fn order_type(&self) -> OrderType {
        self.order_type
    }

    pub fn sub_type(&self) -> Option<&str> {
        self.sub_type.as_deref()
    }

    pub fn source_of_fund(&self) -> SourceOfFund {
        self.source_of_fund
    }

    pub fn provider(&self) -> Option<&ProviderCode> {
        self.provider.as_ref()
    }

    pub fn status(&self) -> OrderStatus {
        self.status
    }

    pub fn transaction_id(&self) -> Option<TransactionId> {
        self.transaction_id
    }

    pub fn bank_trace_id(&self) -> Option<&str> {
        self.bank_trace_id.as_deref()
    }

    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    pub fn updated_at(&self) -> DateTime<Utc> {
        self.updated_at
    }

    pub fn expired_at(&self) -> DateTime<Utc> {
        self.expired_at
    }

    pub fn fail_reason(&self) -> Option<&str> {
        self.fail_reason.as_deref()
    }

    pub fn is_expired(&self) -> bool {
        self.is_expired
    }

    pub fn is_retrieved(&self) -> bool {
        self.is_retrieved
    }

    pub fn is_awaiting_otp(&self) -> bool {
        self.awaiting_otp
    }

    pub fn is_success(&self) -> bool {
        self.status == OrderStatus::Success
    }

    pub fn is_failed(&self) -> bool {
        self.status == OrderStatus::Failed
    }

    pub fn is_verifying(&self) -> bool {
        self.status == OrderStatus::Verifying
    }

    pub fn is_terminal(&self) -> bool {
        self.status.is_terminal()
    }

    /// Returns true if `now` is past the order's expiry deadline.
    pub fn is_past_deadline(&self, now: DateTime<Utc>) -> bool {
        now > self.expired_at
    }
}

// Status transitions
impl Order {
    fn transition(&mut self, next: OrderStatus) -> Result<(), OrderError> {
        if !self.status.can_transition_to(next) {
            return Err(OrderError::InvalidStateTransition {
                from: self.status,
                to: next,
            });
        }
        self.status = next;
        self.awaiting_otp = false;
        self.updated_at = Utc::now();
        Ok(())
    }

    /// Moves the order to `Processing` once the ledger accepted the intent.
    pub fn start_processing(&mut self) -> Result<(), OrderError> {
        self.transition(OrderStatus::Processing)
    }

    /// Marks the order as successfully completed.
    pub fn succeed(&mut self) -> Result<(), OrderError> {
        self.transition(OrderStatus::Success)
    }

    /// Marks the order as definitively failed.
    pub fn fail(&mut self, reason: impl Into<String>) -> Result<(), OrderError> {
        self.transition(OrderStatus::Failed)?;
        self.fail_reason = Some(reason.into());
        Ok(())
    }

    /// Cancels the order.
    pub fn cancel(&mut self, reason: impl Into<String>) -> Result<(), OrderError> {
        self.transition(OrderStatus::Cancelled)?;
        self.fail_reason = Some(reason.into());
        Ok(())
    }

    /// Parks the order until reconciliation learns the definitive outcome.
    pub fn mark_verifying(&mut self, reason: impl Into<String>) -> Result<(), OrderError> {
        self.transition(OrderStatus::Verifying)?;
        self.fail_reason = Some(reason.into());
        Ok(())
    }

    /// Fails the order unless it is already verifying or resolved.
    ///
    /// Compensations call this instead of [`Order::fail`]: a more specific
    /// resolution written by another actor is never overwritten. Returns
    /// true if the status changed.
    pub fn fail_unless_resolved(&mut self, reason: impl Into<String>) -> bool {
        if self.is_verifying() || self.is_terminal() {
            return false;
        }
        self.fail(reason).is_ok()
    }

    /// Resolves an unresolved order from reconciliation ground truth.
    ///
    /// Unlike the regular transitions this accepts `Pending` and
    /// `Processing` as well as `Verifying`, because the bank reported the
    /// definitive outcome.
    pub fn settle(&mut self, success: bool, reason: Option<String>) -> Result<(), OrderError> {
        let next = if success {
            OrderStatus::Success
        } else {
            OrderStatus::Failed
        };
        if !self.status.is_unresolved() {
            return Err(OrderError::InvalidStateTransition {
                from: self.status,
                to: next,
            });
        }
        self.status = next;
        self.awaiting_otp = false;
        self.updated_at = Utc::now();
        if !success {
            self.fail_reason = reason;
        }
        Ok(())
    }

    /// Fails an unresolved order because it outlived its deadline.
    pub fn expire(&mut self, reason: impl Into<String>) -> Result<(), OrderError> {
        self.settle(false, Some(reason.into()))?;
        self.is_expired = true;
        Ok(())
    }

    /// Records that the bank is waiting for the user's OTP. Only a
    /// `Processing` order can wait for one; leaving `Processing` clears it.
    pub fn mark_awaiting_otp(&mut self) -> Result<(), OrderError> {
        if self.status != OrderStatus::Processing {
            return Err(OrderError::InvalidStateTransition {
                from: self.status,
                to: OrderStatus::Processing,
            });
        }
        self.awaiting_otp = true;
        self.updated_at = Utc::now();
        Ok(())
    }

    /// Records that the bank was queried for this order's definitive status.
    pub fn mark_retrieved(&mut self) {
        self.is_retrieved = true;
        self.updated_at = Utc::now();
    }

    /// Links the order to its ledger record. Linking is set-once.
    pub fn link_transaction(&mut self, transaction_id: TransactionId) -> Result<(), OrderError> {
        match self.transaction_id {
            Some(existing) if existing != transaction_id => {
                Err(OrderError::AlreadyLinked { existing })
            }
            _ => {
                self.transaction_id = Some(transaction_id);
                self.updated_at = Utc::now();
                Ok(())
            }
        }
    }

    /// Records the provider-side trace identifier.
    pub fn set_bank_trace_id(&mut self, trace_id: impl Into<String>) {
        self.bank_trace_id = Some(trace_id.into());
        self.updated_at = Utc::now();
    }
}
