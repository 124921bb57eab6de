//! Refund: money returned by a bank or merchant into the wallet.

use domain::OrderType;

use super::{FlowDeps, FlowKind, FlowOutcome, PaymentRequest, run_payment};
use crate::context::ExecutionContext;
use crate::error::SagaError;
use crate::services::BankOperation;

const REFUND: FlowKind = FlowKind {
    name: "refund",
    order_type: OrderType::Refund,
    operation: BankOperation::Refund,
    otp_allowed: false,
};

/// Credits the wallet once the bank confirms the refund.
///
/// The ledger record credits the user, like cash-in, but the bank never
/// asks for an OTP on a refund.
#[derive(Clone)]
pub struct RefundFlow {
    deps: FlowDeps,
}

impl RefundFlow {
    pub fn new(deps: FlowDeps) -> Self {
        Self { deps }
    }

    #[tracing::instrument(skip(self, request, operation), fields(user_id = %request.user_id, amount = %request.amount))]
    pub async fn start(
        &self,
        request: PaymentRequest,
        operation: ExecutionContext,
    ) -> Result<FlowOutcome, SagaError> {
        run_payment(&self.deps, REFUND, request, operation).await
    }
}
