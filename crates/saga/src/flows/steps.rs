//! Step functions shared by the bundled flows.
//!
//! Compensations re-read the stored order and ledger record before
//! writing, and go through the monotonic guards, so running one twice or
//! racing reconciliation never clobbers a more specific resolution.

use chrono::Utc;
use domain::{Order, Outcome, OutcomeKind, Transaction, TransactionStatus};

use super::{FlowDeps, FlowError, FlowState, SharedState};
use crate::context::ExecutionContext;
use crate::error::ServiceError;
use crate::services::{BankOperation, BankRequest, Notification, NotificationKind, ProviderResponse};

pub(crate) async fn init_order(
    deps: FlowDeps,
    state: SharedState,
    _ctx: ExecutionContext,
) -> Result<(), FlowError> {
    let mut st = state.lock().await;
    let request = st.request()?;
    if !request.amount.is_positive() {
        return Err(FlowError::InvalidRequest(
            "amount must be positive".to_string(),
        ));
    }
    if st.kind.operation == BankOperation::Transfer && request.destination.is_none() {
        return Err(FlowError::InvalidRequest(
            "transfer requires a destination account".to_string(),
        ));
    }

    let order = Order::new(
        request.user_id,
        st.kind.order_type,
        request.amount,
        deps.config.deadline_from(Utc::now()),
    )
    .with_provider(request.provider.clone())
    .with_source_of_fund(request.source_of_fund);

    let order = deps.orders.create(order).await?;
    tracing::info!(order_id = %order.id(), order_type = %order.order_type(), "order created");
    st.order = Some(order);
    Ok(())
}

pub(crate) async fn process_order(
    deps: FlowDeps,
    state: SharedState,
    _ctx: ExecutionContext,
) -> Result<(), FlowError> {
    let mut st = state.lock().await;
    let mut order = st.order()?.clone();
    order.start_processing()?;
    st.order = Some(deps.orders.processing_by_id(order).await?);
    Ok(())
}

/// Compensation of [`process_order`]: fails the order unless something
/// more specific already resolved it.
pub(crate) async fn fail_order(
    deps: FlowDeps,
    state: SharedState,
    _ctx: ExecutionContext,
) -> Result<(), FlowError> {
    let mut st = state.lock().await;
    if st.parked || st.retry_allowed {
        return Ok(());
    }
    if st.bank_succeeded() {
        return complete_after_bank_success(&deps, &mut st).await;
    }
    let Some(id) = st.order.as_ref().map(Order::id) else {
        return Ok(());
    };
    let Some(mut current) = deps.orders.find_by_id(id).await? else {
        return Ok(());
    };

    if !current.fail_unless_resolved(st.rollback_reason()) {
        tracing::debug!(order_id = %id, status = %current.status(), "order already resolved, leaving it");
        return Ok(());
    }
    match deps.orders.replace_by_id(current).await {
        Ok(order) => {
            notify(&deps, &order, NotificationKind::OrderFailed, st.rollback_reason());
            st.order = Some(order);
            Ok(())
        }
        Err(ServiceError::Conflict(reason)) => {
            tracing::info!(order_id = %id, %reason, "order resolved concurrently");
            Ok(())
        }
        Err(e) => Err(e.into()),
    }
}

pub(crate) async fn apply_voucher(
    deps: FlowDeps,
    state: SharedState,
    _ctx: ExecutionContext,
) -> Result<(), FlowError> {
    let mut st = state.lock().await;
    let Some(code) = st.request.as_ref().and_then(|r| r.voucher_code.clone()) else {
        return Ok(());
    };
    let order = st.order()?;
    let trace_id = order.id().to_string();
    let discount = deps
        .promotion
        .use_voucher(&code, order.user_id(), &trace_id, order.amount())
        .await
        .map_err(|e| match e {
            ServiceError::Rejected(reason) => FlowError::VoucherRejected(reason),
            other => FlowError::Service(other),
        })?;
    st.discount = Some(discount);
    Ok(())
}

/// Compensation of [`apply_voucher`]. Reverses by trace id, so a usage the
/// promotion service recorded before an error is released as well.
pub(crate) async fn reverse_voucher(
    deps: FlowDeps,
    state: SharedState,
    _ctx: ExecutionContext,
) -> Result<(), FlowError> {
    let st = state.lock().await;
    let has_voucher = st.request.as_ref().is_some_and(|r| r.voucher_code.is_some());
    if st.parked || st.bank_succeeded() || !has_voucher {
        return Ok(());
    }
    let Some(order) = st.order.as_ref() else {
        return Ok(());
    };
    deps.promotion
        .reverse_voucher(&order.id().to_string())
        .await?;
    Ok(())
}

pub(crate) async fn init_ledger(
    deps: FlowDeps,
    state: SharedState,
    _ctx: ExecutionContext,
) -> Result<(), FlowError> {
    let mut st = state.lock().await;
    let order = st.order()?.clone();

    let mut txn = Transaction::new(order.id(), order.amount());
    if let Some(discount) = &st.discount {
        txn = txn.with_discount(discount.amount);
    }
    txn = if st.kind.credits_user() {
        txn.with_payee(order.user_id())
    } else {
        txn.with_payer(order.user_id())
    };

    let txn = deps.ledger.init(txn).await?;
    let mut order = order;
    order.link_transaction(txn.id())?;
    st.order = Some(deps.orders.replace_by_id(order).await?);
    tracing::info!(transaction_id = %txn.id(), "ledger intent registered");
    Ok(())
}

/// Compensation of [`init_ledger`]: cancels the record while it is still
/// `Initial`. A resolved record is left for reconciliation, and so is any
/// record whose bank call already succeeded.
pub(crate) async fn cancel_ledger(
    deps: FlowDeps,
    state: SharedState,
    _ctx: ExecutionContext,
) -> Result<(), FlowError> {
    let st = state.lock().await;
    if st.parked || st.retry_allowed || st.bank_succeeded() {
        return Ok(());
    }
    let Some(txn_id) = st.order.as_ref().and_then(Order::transaction_id) else {
        return Ok(());
    };
    cancel_if_initial(&deps, &st, txn_id).await
}

async fn cancel_if_initial(
    deps: &FlowDeps,
    st: &FlowState,
    txn_id: common::TransactionId,
) -> Result<(), FlowError> {
    let current = deps.ledger.find_by_id(txn_id).await?;
    if !current.is_cancellable() {
        tracing::debug!(transaction_id = %txn_id, status = %current.status(), "ledger record resolved, not cancelling");
        return Ok(());
    }
    deps.ledger.cancel(txn_id, &st.rollback_reason()).await?;
    tracing::info!(transaction_id = %txn_id, "ledger record cancelled");
    Ok(())
}

pub(crate) async fn call_bank(
    deps: FlowDeps,
    state: SharedState,
    _ctx: ExecutionContext,
) -> Result<(), FlowError> {
    let mut st = state.lock().await;
    let order = st.order()?.clone();
    let payment = st.request()?;
    let request = BankRequest {
        order_id: order.id(),
        user_id: order.user_id(),
        amount: order.amount(),
        provider: payment.provider.clone(),
        destination: payment.destination.clone(),
    };

    let answer = match st.kind.operation {
        BankOperation::CashIn => deps.bank.cash_in(&request).await,
        BankOperation::CashOut => deps.bank.cash_out(&request).await,
        BankOperation::Transfer => deps.bank.transfer(&request).await,
        BankOperation::Refund => deps.bank.refund(&request).await,
        other @ (BankOperation::VerifyOtp | BankOperation::RetrieveStatus) => {
            return Err(FlowError::InvalidRequest(format!(
                "{other:?} does not move money"
            )));
        }
    };

    let response = match answer {
        Ok(response) => response,
        Err(e @ ServiceError::Rejected(_)) => return Err(e.into()),
        Err(e) => {
            // The request may have reached the bank; the money is unknown.
            tracing::warn!(order_id = %order.id(), error = %e, "bank call did not complete");
            return park(&deps, &mut st, format!("bank call did not complete: {e}")).await;
        }
    };
    if let Some(trace_id) = &response.trace_id {
        let mut order = order.clone();
        order.set_bank_trace_id(trace_id.clone());
        st.order = Some(deps.orders.replace_by_id(order).await?);
    }
    handle_bank_answer(&deps, &mut st, response).await
}

/// Routes a bank answer by its classified outcome.
pub(crate) async fn handle_bank_answer(
    deps: &FlowDeps,
    st: &mut FlowState,
    response: ProviderResponse,
) -> Result<(), FlowError> {
    let outcome = deps
        .classifier
        .classify(st.order()?.provider(), &response.code);
    st.outcome = Some(outcome);
    tracing::info!(code = %response.code, %outcome, "bank answered");

    match outcome.kind() {
        OutcomeKind::Success => Ok(()),
        OutcomeKind::NeedsAuth if outcome == Outcome::NeedsOtp && st.kind.otp_allowed => {
            let mut order = st.order()?.clone();
            order.mark_awaiting_otp()?;
            st.order = Some(deps.orders.replace_by_id(order).await?);
            st.awaiting_otp = true;
            Ok(())
        }
        OutcomeKind::Pending => park(deps, st, response.reason()).await,
        OutcomeKind::Failure | OutcomeKind::NeedsAuth => Err(FlowError::BankRejected {
            reason: response.reason(),
            code: response.code,
        }),
    }
}

/// Parks the order as verifying and returns `Pending`.
///
/// The ledger record is put on hold rather than cancelled, and rollback
/// skips the order. Reconciliation resolves both later.
pub(crate) async fn park(
    deps: &FlowDeps,
    st: &mut FlowState,
    reason: String,
) -> Result<(), FlowError> {
    st.parked = true;
    let order_id = st.order()?.id();

    if let Ok(txn_id) = st.transaction_id() {
        if let Err(e) = deps.ledger.set_pending(txn_id).await {
            tracing::error!(%order_id, error = %e, "could not hold ledger record, leaving it for reconciliation");
        }
    }

    let mut order = match deps.orders.find_by_id(order_id).await? {
        Some(order) => order,
        None => return Err(ServiceError::not_found("Order", order_id).into()),
    };
    if !order.is_verifying() && !order.is_terminal() {
        order.mark_verifying(reason.clone())?;
        let order = deps.orders.replace_by_id(order).await?;
        notify(deps, &order, NotificationKind::OrderVerifying, reason);
        st.order = Some(order);
    }

    tracing::warn!(%order_id, "order parked as verifying");
    Err(FlowError::Pending { order_id })
}

pub(crate) async fn confirm_ledger(
    deps: FlowDeps,
    state: SharedState,
    _ctx: ExecutionContext,
) -> Result<(), FlowError> {
    let mut st = state.lock().await;
    if st.awaiting_otp {
        return Ok(());
    }
    let txn_id = st.transaction_id()?;
    if let Err(e) = deps.ledger.confirm(txn_id).await {
        // The bank already moved the money; never roll back from here.
        tracing::error!(%txn_id, error = %e, "ledger confirmation failed after bank success");
        return park(&deps, &mut st, format!("ledger confirmation failed: {e}")).await;
    }
    Ok(())
}

pub(crate) async fn success_order(
    deps: FlowDeps,
    state: SharedState,
    _ctx: ExecutionContext,
) -> Result<(), FlowError> {
    let mut st = state.lock().await;
    let order = st.order()?.clone();
    if st.awaiting_otp {
        notify(
            &deps,
            &order,
            NotificationKind::OtpRequired,
            "enter the OTP sent by your bank".to_string(),
        );
        return Ok(());
    }

    let mut order = order;
    order.succeed()?;
    let order = deps.orders.replace_by_id(order).await?;
    notify(&deps, &order, NotificationKind::OrderSucceeded, "order completed".to_string());
    tracing::info!(order_id = %order.id(), "order succeeded");
    st.order = Some(order);
    Ok(())
}

pub(crate) async fn load_order(
    deps: FlowDeps,
    state: SharedState,
    _ctx: ExecutionContext,
) -> Result<(), FlowError> {
    let mut st = state.lock().await;
    let order_id = st
        .resume
        .ok_or_else(|| FlowError::InvalidRequest("no order to resume".to_string()))?;
    let order = deps
        .orders
        .find_by_id(order_id)
        .await?
        .ok_or_else(|| ServiceError::not_found("Order", order_id))?;

    if order.is_past_deadline(Utc::now()) {
        return Err(ServiceError::Expired(order_id).into());
    }
    if order.order_type() != st.kind.order_type
        || !order.is_awaiting_otp()
        || order.transaction_id().is_none()
    {
        return Err(FlowError::OtpRejected(format!(
            "order {order_id} is not awaiting an OTP"
        )));
    }
    st.order = Some(order);
    Ok(())
}

pub(crate) async fn verify_otp(
    deps: FlowDeps,
    state: SharedState,
    _ctx: ExecutionContext,
    otp: String,
) -> Result<(), FlowError> {
    let mut st = state.lock().await;
    let order_id = st.order()?.id();
    let provider = st.order()?.provider().cloned();

    let response = match deps.bank.verify_otp(order_id, &otp).await {
        Ok(response) => response,
        Err(e) => {
            tracing::warn!(%order_id, error = %e, "OTP verification did not complete");
            return park(&deps, &mut st, format!("OTP verification did not complete: {e}")).await;
        }
    };

    let outcome = deps.classifier.classify(provider.as_ref(), &response.code);
    st.outcome = Some(outcome);
    tracing::info!(%order_id, code = %response.code, %outcome, "OTP verification answered");
    match outcome {
        Outcome::Success => Ok(()),
        Outcome::WrongOtp | Outcome::NeedsOtp => {
            st.retry_allowed = true;
            Err(FlowError::OtpRejected("wrong OTP, please try again".to_string()))
        }
        Outcome::MaxOtpAttemptsExceeded => Err(FlowError::OtpRejected(
            "too many wrong OTP attempts".to_string(),
        )),
        Outcome::NotEligibleForBypass => Err(FlowError::OtpRejected(
            "OTP is required for this transaction".to_string(),
        )),
        Outcome::Verifying => park(&deps, &mut st, response.reason()).await,
        Outcome::Failure => Err(FlowError::BankRejected {
            reason: response.reason(),
            code: response.code,
        }),
    }
}

/// Compensation of [`verify_otp`]: a terminal OTP failure releases the
/// ledger record and fails the order. A retryable one leaves both, and an
/// accepted OTP finishes the bookkeeping instead.
pub(crate) async fn abort_otp(
    deps: FlowDeps,
    state: SharedState,
    ctx: ExecutionContext,
) -> Result<(), FlowError> {
    {
        let mut st = state.lock().await;
        if st.parked || st.retry_allowed {
            return Ok(());
        }
        if st.bank_succeeded() {
            return complete_after_bank_success(&deps, &mut st).await;
        }
        if let Some(txn_id) = st.order.as_ref().and_then(Order::transaction_id) {
            cancel_if_initial(&deps, &st, txn_id).await?;
        }
    }
    fail_order(deps, state, ctx).await
}

/// Finishes the bookkeeping of a bank call that already moved the money
/// when rollback reaches it: confirms the ledger record and settles the
/// order to success. If the ledger refuses, the order is parked instead.
async fn complete_after_bank_success(
    deps: &FlowDeps,
    st: &mut FlowState,
) -> Result<(), FlowError> {
    let order_id = st.order()?.id();
    let txn_id = st.transaction_id()?;

    let txn = deps.ledger.find_by_id(txn_id).await?;
    if txn.status() != TransactionStatus::Finish {
        if let Err(e) = deps.ledger.confirm(txn_id).await {
            tracing::error!(%txn_id, error = %e, "ledger confirmation failed after bank success");
            return match park(deps, st, format!("ledger confirmation failed: {e}")).await {
                Err(FlowError::Pending { .. }) => Ok(()),
                other => other,
            };
        }
    }

    let Some(mut current) = deps.orders.find_by_id(order_id).await? else {
        return Err(ServiceError::not_found("Order", order_id).into());
    };
    if current.is_terminal() {
        return Ok(());
    }
    current.settle(true, None)?;
    match deps.orders.replace_by_id(current).await {
        Ok(order) => {
            tracing::warn!(%order_id, "bank succeeded before rollback, order completed");
            notify(deps, &order, NotificationKind::OrderSucceeded, "order completed".to_string());
            st.order = Some(order);
            Ok(())
        }
        Err(ServiceError::Conflict(reason)) => {
            tracing::info!(%order_id, %reason, "order resolved concurrently");
            Ok(())
        }
        Err(e) => Err(e.into()),
    }
}

/// Hands a notification to the worker pool. Never blocks the flow.
fn notify(deps: &FlowDeps, order: &Order, kind: NotificationKind, message: String) {
    let notifier = deps.notifier.clone();
    let notification = Notification {
        user_id: order.user_id(),
        order_id: order.id(),
        kind,
        message,
    };
    deps.pool.submit("notify", async move {
        if let Err(e) = notifier.notify(notification).await {
            tracing::warn!(error = %e, "notification delivery failed");
        }
    });
}
