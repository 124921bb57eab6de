//! Ledger transaction record.

use chrono::{DateTime, Utc};
use common::{Money, OrderId, TransactionId, UserId};
use serde::{Deserialize, Serialize};

use super::{TransactionError, TransactionState, TransactionStatus};

/// The money-movement record owned by the ledger and referenced by an
/// order's `transaction_id`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Transaction {
    id: TransactionId,
    order_id: OrderId,
    state: TransactionState,
    status: TransactionStatus,
    amount: Money,
    fee: Money,
    discount: Money,
    payer_id: Option<UserId>,
    payee_id: Option<UserId>,
    bank_trace_id: Option<String>,
    fail_reason: Option<String>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl Transaction {
    /// Creates an `Initial`/`Processing` record for an order.
    pub fn new(order_id: OrderId, amount: Money) -> Self {
        let now = Utc::now();
        Self {
            id: TransactionId::new(),
            order_id,
            state: TransactionState::Initial,
            status: TransactionStatus::Processing,
            amount,
            fee: Money::zero(),
            discount: Money::zero(),
            payer_id: None,
            payee_id: None,
            bank_trace_id: None,
            fail_reason: None,
            created_at: now,
            updated_at: now,
        }
    }

    pub fn with_fee(mut self, fee: Money) -> Self {
        self.fee = fee;
        self
    }

    pub fn with_discount(mut self, discount: Money) -> Self {
        self.discount = discount;
        self
    }

    pub fn with_payer(mut self, payer_id: UserId) -> Self {
        self.payer_id = Some(payer_id);
        self
    }

    pub fn with_payee(mut self, payee_id: UserId) -> Self {
        self.payee_id = Some(payee_id);
        self
    }
}

// Query methods
impl Transaction {
    pub fn id(&self) -> TransactionId {
        self.id
    }

    pub fn order_id(&self) -> OrderId {
        self.order_id
    }

    pub fn state(&self) -> TransactionState {
        self.state
    }

    pub fn status(&self) -> TransactionStatus {
        self.status
    }

    pub fn amount(&self) -> Money {
        self.amount
    }

    pub fn fee(&self) -> Money {
        self.fee
    }

    pub fn discount(&self) -> Money {
        self.discount
    }

    /// Amount actually moved: amount plus fee, minus discount, never negative.
    pub fn net_amount(&self) -> Money {
        (self.amount + self.fee).saturating_sub_floor(self.discount)
    }

    pub fn payer_id(&self) -> Option<UserId> {
        self.payer_id
    }

    pub fn payee_id(&self) -> Option<UserId> {
        self.payee_id
    }

    pub fn bank_trace_id(&self) -> Option<&str> {
        self.bank_trace_id.as_deref()
    }

    pub fn fail_reason(&self) -> Option<&str> {
        self.fail_reason.as_deref()
    }

    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    pub fn updated_at(&self) -> DateTime<Utc> {
        self.updated_at
    }

    /// Returns true while the record may still be cancelled.
    pub fn is_cancellable(&self) -> bool {
        self.state == TransactionState::Initial
    }
}

// Ledger-side transitions
impl Transaction {
    fn move_to(&mut self, next: TransactionStatus) -> Result<(), TransactionError> {
        if !self.status.can_transition_to(next) {
            return Err(TransactionError::InvalidTransition {
                from: self.status,
                to: next,
            });
        }
        self.status = next;
        self.state = TransactionState::Resolved;
        self.updated_at = Utc::now();
        Ok(())
    }

    /// Settles the record as finished.
    pub fn confirm(&mut self) -> Result<(), TransactionError> {
        self.move_to(TransactionStatus::Finish)
    }

    /// Withdraws an `Initial` record.
    pub fn cancel(&mut self, reason: impl Into<String>) -> Result<(), TransactionError> {
        if !self.is_cancellable() {
            return Err(TransactionError::NotCancellable(self.state));
        }
        self.move_to(TransactionStatus::Failed)?;
        self.fail_reason = Some(reason.into());
        Ok(())
    }

    /// Holds the funds while the external outcome is unknown.
    ///
    /// The record leaves `Initial`, so it can no longer be cancelled;
    /// only [`Transaction::confirm`] or [`Transaction::fail`] settle it.
    pub fn set_pending(&mut self) -> Result<(), TransactionError> {
        self.move_to(TransactionStatus::Pending)
    }

    /// Settles a held record as failed, releasing the hold.
    pub fn fail(&mut self, reason: impl Into<String>) -> Result<(), TransactionError> {
        self.move_to(TransactionStatus::Failed)?;
        self.fail_reason = Some(reason.into());
        Ok(())
    }

    pub fn set_bank_trace_id(&mut self, trace_id: impl Into<String>) {
        self.bank_trace_id = Some(trace_id.into());
        self.updated_at = Utc::now();
    }
}
