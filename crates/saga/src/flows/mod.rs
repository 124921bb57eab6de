//! Orchestration flows built on the saga engine.
//!
//! A flow is a configuration of the engine: an ordered list of steps over
//! the collaborators in [`FlowDeps`]. Step state is shared through a
//! per-request [`FlowState`] that only the flow's own steps touch.

mod cash_in;
mod cash_out;
mod refund;
mod steps;

pub use cash_in::CashInFlow;
pub use cash_out::CashOutFlow;
pub use refund::RefundFlow;

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, TimeDelta, Utc};
use common::{Money, OrderId, TransactionId, UserId};
use domain::{
    ClassifierRegistry, Order, OrderError, OrderType, Outcome, ProviderCode, SourceOfFund,
    StatusCode, TransactionError,
};
use futures_util::future::BoxFuture;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tokio::sync::Mutex;

use crate::context::ExecutionContext;
use crate::coordinator::Coordinator;
use crate::error::{ExecutionError, SagaError, ServiceError};
use crate::log::ExecutionLog;
use crate::outcome::ExecutionResult;
use crate::pool::WorkerPool;
use crate::saga::Saga;
use crate::services::{
    BankGateway, BankOperation, Discount, LedgerService, Notifier, OrderStore, PromotionService,
};
use crate::step::Step;

/// Step name: create the order in `Pending`.
pub const STEP_INIT_ORDER: &str = "init_order";

/// Step name: move the order to `Processing` (deadline-guarded).
pub const STEP_PROCESS_ORDER: &str = "process_order";

/// Step name: apply the user's voucher.
pub const STEP_APPLY_VOUCHER: &str = "apply_voucher";

/// Step name: register the debit/credit intent with the ledger.
pub const STEP_INIT_LEDGER: &str = "init_ledger";

/// Step name: call the bank gateway and classify its answer.
pub const STEP_CALL_BANK: &str = "call_bank";

/// Step name: load an order awaiting OTP.
pub const STEP_LOAD_ORDER: &str = "load_order";

/// Step name: submit the user's OTP to the bank.
pub const STEP_VERIFY_OTP: &str = "verify_otp";

/// Step name: settle the ledger record as finished.
pub const STEP_CONFIRM_LEDGER: &str = "confirm_ledger";

/// Step name: mark the order successful and notify the user.
pub const STEP_SUCCESS_ORDER: &str = "success_order";

/// Settings shared by all flows.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct FlowConfig {
    /// How long a new order may stay unresolved before reconciliation expires it.
    pub order_ttl: Duration,
    /// Budget of the compensation context.
    pub compensation_timeout: Duration,
}

impl Default for FlowConfig {
    fn default() -> Self {
        Self {
            order_ttl: Duration::from_secs(900),
            compensation_timeout: Duration::from_secs(30),
        }
    }
}

impl FlowConfig {
    /// Expiry deadline for an order created at `now`.
    pub fn deadline_from(&self, now: DateTime<Utc>) -> DateTime<Utc> {
        TimeDelta::from_std(self.order_ttl)
            .ok()
            .and_then(|ttl| now.checked_add_signed(ttl))
            .unwrap_or(DateTime::<Utc>::MAX_UTC)
    }
}

/// Collaborators every flow runs against. Built once at process start.
#[derive(Clone)]
pub struct FlowDeps {
    pub orders: Arc<dyn OrderStore>,
    pub ledger: Arc<dyn LedgerService>,
    pub promotion: Arc<dyn PromotionService>,
    pub bank: Arc<dyn BankGateway>,
    pub notifier: Arc<dyn Notifier>,
    pub pool: WorkerPool,
    pub log: Arc<dyn ExecutionLog>,
    /// Classifies each bank answer with the order's provider classifier.
    pub classifier: ClassifierRegistry,
    pub config: FlowConfig,
}

/// Forward-step error of the bundled flows.
///
/// Every variant displays as a user-facing message.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum FlowError {
    #[error(transparent)]
    Service(#[from] ServiceError),

    #[error(transparent)]
    Order(#[from] OrderError),

    #[error(transparent)]
    Transaction(#[from] TransactionError),

    #[error("{0}")]
    InvalidRequest(String),

    /// The bank gave a definite refusal.
    #[error("{reason}")]
    BankRejected { code: StatusCode, reason: String },

    /// The bank outcome is unknown; the order is parked for reconciliation.
    #[error("Order {order_id} is being verified with the bank")]
    Pending { order_id: OrderId },

    #[error("{0}")]
    OtpRejected(String),

    #[error("{0}")]
    VoucherRejected(String),
}

impl FlowError {
    pub fn is_pending(&self) -> bool {
        matches!(self, FlowError::Pending { .. })
    }
}

/// What the caller has to do next.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NextAction {
    None,
    /// The bank asked for an OTP; call the flow's `verify_otp` with it.
    EnterOtp,
}

/// A money-moving request from the user.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PaymentRequest {
    pub user_id: UserId,
    pub amount: Money,
    pub provider: ProviderCode,
    pub voucher_code: Option<String>,
    pub source_of_fund: SourceOfFund,
    /// Destination account for transfers.
    pub destination: Option<String>,
}

impl PaymentRequest {
    pub fn new(user_id: UserId, amount: Money, provider: impl Into<ProviderCode>) -> Self {
        Self {
            user_id,
            amount,
            provider: provider.into(),
            voucher_code: None,
            source_of_fund: SourceOfFund::default(),
            destination: None,
        }
    }

    pub fn with_voucher(mut self, code: impl Into<String>) -> Self {
        self.voucher_code = Some(code.into());
        self
    }

    pub fn with_source_of_fund(mut self, source_of_fund: SourceOfFund) -> Self {
        self.source_of_fund = source_of_fund;
        self
    }

    pub fn with_destination(mut self, destination: impl Into<String>) -> Self {
        self.destination = Some(destination.into());
        self
    }
}

/// Result of running a flow.
#[derive(Debug)]
pub struct FlowOutcome {
    /// Set once the order was created.
    pub order_id: Option<OrderId>,
    pub next_action: NextAction,
    pub execution: ExecutionResult<FlowError>,
}

impl FlowOutcome {
    pub fn is_success(&self) -> bool {
        self.execution.is_success()
    }

    pub fn error(&self) -> Option<&ExecutionError<FlowError>> {
        self.execution.error()
    }

    /// True when the request ended with the order parked as verifying.
    pub fn is_pending(&self) -> bool {
        self.error()
            .and_then(ExecutionError::domain_error)
            .is_some_and(FlowError::is_pending)
    }
}

/// Static shape of a money-moving flow.
#[derive(Debug, Clone, Copy)]
pub(crate) struct FlowKind {
    pub name: &'static str,
    pub order_type: OrderType,
    pub operation: BankOperation,
    pub otp_allowed: bool,
}

impl FlowKind {
    /// True if the user receives the money (the ledger credits them).
    pub fn credits_user(&self) -> bool {
        matches!(self.order_type, OrderType::CashIn | OrderType::Refund)
    }
}

/// Per-request state the steps of one flow share.
#[derive(Debug)]
pub(crate) struct FlowState {
    pub kind: FlowKind,
    /// Absent when resuming an existing order.
    pub request: Option<PaymentRequest>,
    /// Order a resumed flow continues.
    pub resume: Option<OrderId>,
    pub order: Option<Order>,
    pub discount: Option<Discount>,
    pub outcome: Option<Outcome>,
    /// The order was parked as verifying; rollback must leave it alone.
    pub parked: bool,
    pub awaiting_otp: bool,
    /// A wrong OTP was entered; the user may try again.
    pub retry_allowed: bool,
    pub failure_reason: Option<String>,
}

impl FlowState {
    pub fn new(kind: FlowKind, request: PaymentRequest) -> Self {
        Self::blank(kind, Some(request), None)
    }

    pub fn resuming(kind: FlowKind, order_id: OrderId) -> Self {
        Self::blank(kind, None, Some(order_id))
    }

    fn blank(kind: FlowKind, request: Option<PaymentRequest>, resume: Option<OrderId>) -> Self {
        Self {
            kind,
            request,
            resume,
            order: None,
            discount: None,
            outcome: None,
            parked: false,
            awaiting_otp: false,
            retry_allowed: false,
            failure_reason: None,
        }
    }

    pub fn request(&self) -> Result<&PaymentRequest, FlowError> {
        self.request
            .as_ref()
            .ok_or_else(|| FlowError::InvalidRequest("no payment request".to_string()))
    }

    pub fn order(&self) -> Result<&Order, FlowError> {
        self.order
            .as_ref()
            .ok_or_else(|| FlowError::InvalidRequest("order was not created".to_string()))
    }

    pub fn transaction_id(&self) -> Result<TransactionId, FlowError> {
        self.order()?
            .transaction_id()
            .ok_or_else(|| FlowError::InvalidRequest("order has no ledger record".to_string()))
    }

    /// The bank reported that the money moved. From here on rollback must
    /// complete the order rather than undo it.
    pub fn bank_succeeded(&self) -> bool {
        self.outcome == Some(Outcome::Success)
    }

    /// Reason written on the order and ledger record during rollback.
    pub fn rollback_reason(&self) -> String {
        self.failure_reason
            .clone()
            .unwrap_or_else(|| "rolled back".to_string())
    }
}

pub(crate) type SharedState = Arc<Mutex<FlowState>>;

/// Builds the standard money-moving saga for `kind`.
pub(crate) fn payment_saga(
    deps: &FlowDeps,
    state: &SharedState,
    kind: FlowKind,
    with_voucher: bool,
) -> Result<Saga<FlowError>, SagaError> {
    let mut saga = Saga::new(kind.name);
    saga.add_step(Step::new(STEP_INIT_ORDER).forward(bind(deps, state, steps::init_order)))?;
    saga.add_step(
        Step::new(STEP_PROCESS_ORDER)
            .forward(bind(deps, state, steps::process_order))
            .compensate(bind(deps, state, steps::fail_order)),
    )?;
    if with_voucher {
        saga.add_step(
            Step::new(STEP_APPLY_VOUCHER)
                .forward(bind(deps, state, steps::apply_voucher))
                .compensate(bind(deps, state, steps::reverse_voucher)),
        )?;
    }
    saga.add_step(
        Step::new(STEP_INIT_LEDGER)
            .forward(bind(deps, state, steps::init_ledger))
            .compensate(bind(deps, state, steps::cancel_ledger)),
    )?;
    saga.add_step(Step::new(STEP_CALL_BANK).forward(bind(deps, state, steps::call_bank)))?;
    saga.add_step(
        Step::new(STEP_CONFIRM_LEDGER).forward(bind(deps, state, steps::confirm_ledger)),
    )?;
    saga.add_step(
        Step::new(STEP_SUCCESS_ORDER).forward(bind(deps, state, steps::success_order)),
    )?;
    Ok(saga)
}

/// Runs a money-moving flow from a fresh request.
pub(crate) async fn run_payment(
    deps: &FlowDeps,
    kind: FlowKind,
    request: PaymentRequest,
    operation: ExecutionContext,
) -> Result<FlowOutcome, SagaError> {
    let with_voucher = request.voucher_code.is_some();
    let state: SharedState = Arc::new(Mutex::new(FlowState::new(kind, request)));
    let saga = payment_saga(deps, &state, kind, with_voucher)?;
    Ok(play(deps, &state, saga, operation).await)
}

/// Plays `saga` with a compensation context on the configured budget.
pub(crate) async fn play(
    deps: &FlowDeps,
    state: &SharedState,
    saga: Saga<FlowError>,
    operation: ExecutionContext,
) -> FlowOutcome {
    let compensation = ExecutionContext::with_timeout(deps.config.compensation_timeout);
    let execution = Coordinator::new(operation, compensation, saga, deps.log.clone())
        .play()
        .await;

    let st = state.lock().await;
    let next_action = if execution.is_success() && st.awaiting_otp {
        NextAction::EnterOtp
    } else {
        NextAction::None
    };
    FlowOutcome {
        order_id: st.order.as_ref().map(Order::id).or(st.resume),
        next_action,
        execution,
    }
}

/// Binds a step function to the flow's collaborators and state.
///
/// The first forward error is kept as the rollback reason.
pub(crate) fn bind<F, Fut>(
    deps: &FlowDeps,
    state: &SharedState,
    action: F,
) -> impl Fn(ExecutionContext) -> BoxFuture<'static, Result<(), FlowError>> + Send + Sync + 'static
where
    F: Fn(FlowDeps, SharedState, ExecutionContext) -> Fut + Send + Sync + 'static,
    Fut: std::future::Future<Output = Result<(), FlowError>> + Send + 'static,
{
    let deps = deps.clone();
    let state = state.clone();
    move |ctx| {
        let state = state.clone();
        let action = action(deps.clone(), state.clone(), ctx);
        Box::pin(async move {
            let result = action.await;
            if let Err(err) = &result {
                state
                    .lock()
                    .await
                    .failure_reason
                    .get_or_insert_with(|| err.to_string());
            }
            result
        })
    }
}
