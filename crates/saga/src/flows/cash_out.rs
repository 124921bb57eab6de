//! Cash-out and inter-bank transfer: wallet to a bank account.

use domain::OrderType;

use super::{FlowDeps, FlowKind, FlowOutcome, PaymentRequest, run_payment};
use crate::context::ExecutionContext;
use crate::error::SagaError;
use crate::services::BankOperation;

const CASH_OUT: FlowKind = FlowKind {
    name: "cash_out",
    order_type: OrderType::CashOut,
    operation: BankOperation::CashOut,
    otp_allowed: false,
};

const INTER_BANK_TRANSFER: FlowKind = FlowKind {
    name: "inter_bank_transfer",
    order_type: OrderType::InterBankTransfer,
    operation: BankOperation::Transfer,
    otp_allowed: false,
};

/// Debits the wallet first, then asks the bank to pay out.
///
/// A bank timeout holds the debit (ledger `Pending`, order `Verifying`)
/// instead of refunding it, since the payout may still land.
#[derive(Clone)]
pub struct CashOutFlow {
    deps: FlowDeps,
}

impl CashOutFlow {
    pub fn new(deps: FlowDeps) -> Self {
        Self { deps }
    }

    #[tracing::instrument(skip(self, request, operation), fields(user_id = %request.user_id, amount = %request.amount))]
    pub async fn start(
        &self,
        request: PaymentRequest,
        operation: ExecutionContext,
    ) -> Result<FlowOutcome, SagaError> {
        run_payment(&self.deps, CASH_OUT, request, operation).await
    }

    /// Pays out to an account at another bank.
    #[tracing::instrument(skip(self, request, operation), fields(user_id = %request.user_id, amount = %request.amount))]
    pub async fn transfer(
        &self,
        request: PaymentRequest,
        operation: ExecutionContext,
    ) -> Result<FlowOutcome, SagaError> {
        run_payment(&self.deps, INTER_BANK_TRANSFER, request, operation).await
    }
}
