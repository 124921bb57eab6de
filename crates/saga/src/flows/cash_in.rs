//! Cash-in: linked bank account to wallet.

use std::sync::Arc;

use common::OrderId;
use domain::OrderType;
use tokio::sync::Mutex;

use super::{
    FlowDeps, FlowError, FlowKind, FlowOutcome, FlowState, PaymentRequest, STEP_CONFIRM_LEDGER,
    STEP_LOAD_ORDER, STEP_SUCCESS_ORDER, STEP_VERIFY_OTP, SharedState, bind, play, run_payment,
    steps,
};
use crate::context::ExecutionContext;
use crate::error::SagaError;
use crate::saga::Saga;
use crate::services::BankOperation;
use crate::step::Step;

const CASH_IN: FlowKind = FlowKind {
    name: "cash_in",
    order_type: OrderType::CashIn,
    operation: BankOperation::CashIn,
    otp_allowed: true,
};

const CASH_IN_VERIFY_OTP: FlowKind = FlowKind {
    name: "cash_in_verify_otp",
    ..CASH_IN
};

/// Pulls money from the user's linked bank into the wallet.
///
/// When the bank asks for an OTP the saga completes with
/// [`NextAction::EnterOtp`](super::NextAction::EnterOtp), the order stays
/// `Processing` marked as awaiting an OTP with its ledger record `Initial`,
/// and the caller continues with [`CashInFlow::verify_otp`]. Only cash-in
/// orders carrying that mark are accepted there.
#[derive(Clone)]
pub struct CashInFlow {
    deps: FlowDeps,
}

impl CashInFlow {
    pub fn new(deps: FlowDeps) -> Self {
        Self { deps }
    }

    #[tracing::instrument(skip(self, request, operation), fields(user_id = %request.user_id, amount = %request.amount))]
    pub async fn start(
        &self,
        request: PaymentRequest,
        operation: ExecutionContext,
    ) -> Result<FlowOutcome, SagaError> {
        run_payment(&self.deps, CASH_IN, request, operation).await
    }

    /// Submits the user's OTP for an order awaiting one.
    ///
    /// A wrong OTP leaves the order and ledger record untouched so the
    /// user can retry; exhausting the attempts rolls both back.
    #[tracing::instrument(skip(self, otp, operation))]
    pub async fn verify_otp(
        &self,
        order_id: OrderId,
        otp: impl Into<String>,
        operation: ExecutionContext,
    ) -> Result<FlowOutcome, SagaError> {
        let otp = otp.into();
        let state: SharedState = Arc::new(Mutex::new(FlowState::resuming(
            CASH_IN_VERIFY_OTP,
            order_id,
        )));
        let deps = &self.deps;

        let mut saga: Saga<FlowError> = Saga::new(CASH_IN_VERIFY_OTP.name);
        saga.add_step(Step::new(STEP_LOAD_ORDER).forward(bind(deps, &state, steps::load_order)))?;
        saga.add_step(
            Step::new(STEP_VERIFY_OTP)
                .forward(bind(deps, &state, move |deps, state, ctx| {
                    steps::verify_otp(deps, state, ctx, otp.clone())
                }))
                .compensate(bind(deps, &state, steps::abort_otp)),
        )?;
        saga.add_step(
            Step::new(STEP_CONFIRM_LEDGER).forward(bind(deps, &state, steps::confirm_ledger)),
        )?;
        saga.add_step(
            Step::new(STEP_SUCCESS_ORDER).forward(bind(deps, &state, steps::success_order)),
        )?;

        Ok(play(deps, &state, saga, operation).await)
    }
}
