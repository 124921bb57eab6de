//! Integration tests for the bundled flows running on the saga engine.

use std::sync::Arc;

use async_trait::async_trait;
use chrono::{Duration, Utc};
use common::{Money, OrderId, UserId};
use domain::{
    ClassifierRegistry, Order, OrderStatus, OrderType, Outcome, ProviderCode, StatusClassifier,
    Transaction, TransactionState, TransactionStatus,
};
use saga::flows::{STEP_CALL_BANK, STEP_INIT_LEDGER, STEP_PROCESS_ORDER};
use saga::{
    BankGateway, BankOperation, BankRequest, CancelHandle, CashInFlow, CashOutFlow,
    ExecutionContext, ExecutionError, FlowConfig, FlowDeps, FlowError, InMemoryBankGateway,
    InMemoryExecutionLog, InMemoryLedgerService, InMemoryNotifier, InMemoryOrderStore,
    InMemoryPromotionService, LedgerService, NextAction, NotificationKind, PaymentRequest,
    PoolConfig, ProviderResponse, RefundFlow, SagaState, ServiceError, WorkerPool,
};

struct TestHarness {
    orders: InMemoryOrderStore,
    ledger: InMemoryLedgerService,
    promotion: InMemoryPromotionService,
    bank: InMemoryBankGateway,
    notifier: InMemoryNotifier,
    log: InMemoryExecutionLog,
    pool: WorkerPool,
    deps: FlowDeps,
}

impl TestHarness {
    fn new() -> Self {
        let orders = InMemoryOrderStore::new();
        let ledger = InMemoryLedgerService::new();
        let promotion = InMemoryPromotionService::new();
        let bank = InMemoryBankGateway::new();
        let notifier = InMemoryNotifier::new();
        let log = InMemoryExecutionLog::new();
        let pool = WorkerPool::new(PoolConfig { max_concurrent: 64 });

        let deps = FlowDeps {
            orders: Arc::new(orders.clone()),
            ledger: Arc::new(ledger.clone()),
            promotion: Arc::new(promotion.clone()),
            bank: Arc::new(bank.clone()),
            notifier: Arc::new(notifier.clone()),
            pool: pool.clone(),
            log: Arc::new(log.clone()),
            classifier: ClassifierRegistry::default(),
            config: FlowConfig::default(),
        };

        Self {
            orders,
            ledger,
            promotion,
            bank,
            notifier,
            log,
            pool,
            deps,
        }
    }

    fn cash_in(&self) -> CashInFlow {
        CashInFlow::new(self.deps.clone())
    }

    fn cash_out(&self) -> CashOutFlow {
        CashOutFlow::new(self.deps.clone())
    }

    /// Flow collaborators whose bank cancels `handle` while answering.
    fn deps_cancelling_in_bank(&self, handle: CancelHandle) -> FlowDeps {
        FlowDeps {
            bank: Arc::new(CancellingBank {
                inner: self.bank.clone(),
                handle,
            }),
            ..self.deps.clone()
        }
    }

    /// A processing order with an `Initial` ledger record, as a flow
    /// leaves it while the bank call is in flight.
    async fn in_flight_order(&self, order_type: OrderType) -> Order {
        let mut order = Order::new(
            UserId::new(),
            order_type,
            Money::from_minor(200_000),
            Utc::now() + Duration::minutes(15),
        )
        .with_provider(ProviderCode::new("BIDV"));
        let txn = Transaction::new(order.id(), order.amount()).with_payer(order.user_id());
        order.link_transaction(txn.id()).unwrap();
        order.start_processing().unwrap();
        self.ledger.insert(txn).await;
        self.orders.insert(order.clone()).await;
        order
    }

    async fn order(&self, id: OrderId) -> Order {
        self.orders.get(id).await.expect("order should exist")
    }

    async fn txn(&self, order: &Order) -> Transaction {
        let id = order.transaction_id().expect("order should be linked");
        self.ledger.find_by_id(id).await.unwrap()
    }

    async fn notifications(&self, id: OrderId) -> Vec<NotificationKind> {
        self.pool.wait_idle().await;
        self.notifier.sent_for(id).await
    }
}

/// Answers like the wrapped gateway, but the caller's context is
/// cancelled by the time the answer arrives.
struct CancellingBank {
    inner: InMemoryBankGateway,
    handle: CancelHandle,
}

#[async_trait]
impl BankGateway for CancellingBank {
    async fn cash_in(&self, request: &BankRequest) -> Result<ProviderResponse, ServiceError> {
        let answer = self.inner.cash_in(request).await;
        self.handle.cancel();
        answer
    }

    async fn cash_out(&self, request: &BankRequest) -> Result<ProviderResponse, ServiceError> {
        let answer = self.inner.cash_out(request).await;
        self.handle.cancel();
        answer
    }

    async fn transfer(&self, request: &BankRequest) -> Result<ProviderResponse, ServiceError> {
        self.inner.transfer(request).await
    }

    async fn verify_otp(
        &self,
        order_id: OrderId,
        otp: &str,
    ) -> Result<ProviderResponse, ServiceError> {
        let answer = self.inner.verify_otp(order_id, otp).await;
        self.handle.cancel();
        answer
    }

    async fn retrieve_order_status(
        &self,
        order_id: OrderId,
        trace_id: Option<&str>,
    ) -> Result<ProviderResponse, ServiceError> {
        self.inner.retrieve_order_status(order_id, trace_id).await
    }

    async fn refund(&self, request: &BankRequest) -> Result<ProviderResponse, ServiceError> {
        self.inner.refund(request).await
    }
}

fn request() -> PaymentRequest {
    PaymentRequest::new(UserId::new(), Money::from_minor(200_000), "BIDV")
}

fn op() -> ExecutionContext {
    ExecutionContext::background()
}

#[tokio::test]
async fn test_happy_path_completes() {
    let h = TestHarness::new();

    let outcome = h.cash_out().start(request(), op()).await.unwrap();

    assert!(outcome.is_success());
    assert_eq!(outcome.execution.state, SagaState::Completed);
    assert_eq!(outcome.next_action, NextAction::None);
    let order = h.order(outcome.order_id.unwrap()).await;
    assert_eq!(order.status(), OrderStatus::Success);
    assert!(order.bank_trace_id().is_some());
    let txn = h.txn(&order).await;
    assert_eq!(txn.status(), TransactionStatus::Finish);
    assert!(outcome.execution.steps().iter().all(|s| s.compensation.is_none()));
    assert_eq!(
        h.notifications(order.id()).await,
        vec![NotificationKind::OrderSucceeded]
    );
}

#[tokio::test]
async fn test_definite_bank_failure_cancels_ledger_and_fails_order() {
    let h = TestHarness::new();
    h.bank
        .script_response(
            BankOperation::CashOut,
            ProviderResponse::new("451").with_message("account blocked"),
        )
        .await;

    let outcome = h.cash_out().start(request(), op()).await.unwrap();

    let err = outcome.error().unwrap();
    assert_eq!(err.to_string(), "account blocked");
    assert_eq!(err.step(), STEP_CALL_BANK);

    let order = h.order(outcome.order_id.unwrap()).await;
    assert_eq!(order.status(), OrderStatus::Failed);
    assert_eq!(order.fail_reason(), Some("account blocked"));
    let txn = h.txn(&order).await;
    assert_eq!(txn.state(), TransactionState::Resolved);
    assert_eq!(txn.status(), TransactionStatus::Failed);
    assert_eq!(h.ledger.cancel_count().await, 1);
    assert_eq!(h.ledger.confirm_count().await, 0);
    assert_eq!(
        outcome.execution.compensated_steps(),
        vec![STEP_PROCESS_ORDER, STEP_INIT_LEDGER]
    );
    assert_eq!(outcome.execution.state, SagaState::Compensated);
    assert_eq!(
        h.notifications(order.id()).await,
        vec![NotificationKind::OrderFailed]
    );
}

#[tokio::test]
async fn test_bank_timeout_parks_order_as_verifying() {
    let h = TestHarness::new();
    h.bank.script(BankOperation::CashOut, "102").await;

    let outcome = h.cash_out().start(request(), op()).await.unwrap();

    assert!(!outcome.is_success());
    assert!(outcome.is_pending());
    let order = h.order(outcome.order_id.unwrap()).await;
    assert_eq!(order.status(), OrderStatus::Verifying);
    let txn = h.txn(&order).await;
    assert_eq!(txn.status(), TransactionStatus::Pending);
    assert!(!txn.is_cancellable());
    assert_eq!(h.ledger.cancel_count().await, 0);
    assert_eq!(
        h.notifications(order.id()).await,
        vec![NotificationKind::OrderVerifying]
    );
}

#[tokio::test]
async fn test_transport_error_is_treated_as_verifying() {
    let h = TestHarness::new();
    h.bank
        .script_error(
            BankOperation::CashOut,
            ServiceError::Unavailable("read timeout".into()),
        )
        .await;

    let outcome = h.cash_out().start(request(), op()).await.unwrap();

    assert!(outcome.is_pending());
    let order = h.order(outcome.order_id.unwrap()).await;
    assert_eq!(order.status(), OrderStatus::Verifying);
    assert_eq!(h.txn(&order).await.status(), TransactionStatus::Pending);
}

#[tokio::test]
async fn test_unmapped_code_is_not_success() {
    let h = TestHarness::new();
    h.bank.script(BankOperation::CashOut, "504").await;

    let outcome = h.cash_out().start(request(), op()).await.unwrap();

    assert!(outcome.is_pending());
    let order = h.order(outcome.order_id.unwrap()).await;
    assert_eq!(order.status(), OrderStatus::Verifying);
}

#[tokio::test]
async fn test_ledger_refusal_surfaces_domain_message() {
    let h = TestHarness::new();
    h.ledger.set_reject_init(Some("insufficient balance")).await;

    let outcome = h.cash_out().start(request(), op()).await.unwrap();

    let err = outcome.error().unwrap();
    assert_eq!(err.to_string(), "insufficient balance");
    assert_eq!(h.bank.total_calls().await, 0);
    let order = h.order(outcome.order_id.unwrap()).await;
    assert_eq!(order.status(), OrderStatus::Failed);
    assert!(order.transaction_id().is_none());
}

#[tokio::test]
async fn test_voucher_reversed_on_failure_but_kept_when_parked() {
    let h = TestHarness::new();
    h.promotion
        .add_voucher("WELCOME", Money::from_minor(10_000))
        .await;

    h.bank.script(BankOperation::CashOut, "400").await;
    let failed = h
        .cash_out()
        .start(request().with_voucher("WELCOME"), op())
        .await
        .unwrap();
    assert!(!failed.is_success());
    assert_eq!(h.promotion.reversed_count().await, 1);
    assert_eq!(h.promotion.active_usages().await, 0);

    h.bank.script(BankOperation::CashOut, "102").await;
    let parked = h
        .cash_out()
        .start(request().with_voucher("WELCOME"), op())
        .await
        .unwrap();
    assert!(parked.is_pending());
    assert_eq!(h.promotion.active_usages().await, 1);

    let order = h.order(parked.order_id.unwrap()).await;
    assert_eq!(h.txn(&order).await.discount(), Money::from_minor(10_000));
}

#[tokio::test]
async fn test_invalid_voucher_rolls_back() {
    let h = TestHarness::new();

    let outcome = h
        .cash_out()
        .start(request().with_voucher("UNKNOWN"), op())
        .await
        .unwrap();

    let err = outcome.execution.into_error().unwrap();
    assert!(matches!(
        err.domain_error(),
        Some(FlowError::VoucherRejected(_))
    ));
}

#[tokio::test]
async fn test_cash_in_with_otp() {
    let h = TestHarness::new();
    h.bank.script(BankOperation::CashIn, "103").await;

    let started = h.cash_in().start(request(), op()).await.unwrap();

    assert!(started.is_success());
    assert_eq!(started.next_action, NextAction::EnterOtp);
    let order_id = started.order_id.unwrap();
    let order = h.order(order_id).await;
    assert_eq!(order.status(), OrderStatus::Processing);
    assert!(order.is_awaiting_otp());
    assert!(h.txn(&order).await.is_cancellable());

    let verified = h.cash_in().verify_otp(order_id, "123456", op()).await.unwrap();

    assert!(verified.is_success());
    assert_eq!(verified.next_action, NextAction::None);
    let order = h.order(order_id).await;
    assert_eq!(order.status(), OrderStatus::Success);
    assert_eq!(h.txn(&order).await.status(), TransactionStatus::Finish);
    assert_eq!(
        h.notifications(order_id).await,
        vec![NotificationKind::OtpRequired, NotificationKind::OrderSucceeded]
    );
}

#[tokio::test]
async fn test_wrong_otp_allows_retry() {
    let h = TestHarness::new();
    h.bank.script(BankOperation::CashIn, "103").await;
    let order_id = h
        .cash_in()
        .start(request(), op())
        .await
        .unwrap()
        .order_id
        .unwrap();

    h.bank.script(BankOperation::VerifyOtp, "407").await;
    let wrong = h.cash_in().verify_otp(order_id, "000000", op()).await.unwrap();

    assert_eq!(wrong.error().unwrap().to_string(), "wrong OTP, please try again");
    let order = h.order(order_id).await;
    assert_eq!(order.status(), OrderStatus::Processing);
    assert!(h.txn(&order).await.is_cancellable());

    let retried = h.cash_in().verify_otp(order_id, "123456", op()).await.unwrap();
    assert!(retried.is_success());
    assert_eq!(h.order(order_id).await.status(), OrderStatus::Success);
}

#[tokio::test]
async fn test_max_otp_attempts_rolls_back() {
    let h = TestHarness::new();
    h.bank.script(BankOperation::CashIn, "103").await;
    let order_id = h
        .cash_in()
        .start(request(), op())
        .await
        .unwrap()
        .order_id
        .unwrap();

    h.bank.script(BankOperation::VerifyOtp, "406").await;
    let outcome = h.cash_in().verify_otp(order_id, "000000", op()).await.unwrap();

    assert_eq!(
        outcome.error().unwrap().to_string(),
        "too many wrong OTP attempts"
    );
    let order = h.order(order_id).await;
    assert_eq!(order.status(), OrderStatus::Failed);
    assert_eq!(h.txn(&order).await.status(), TransactionStatus::Failed);
    assert_eq!(h.ledger.cancel_count().await, 1);
}

#[tokio::test]
async fn test_verify_otp_for_settled_order_is_refused() {
    let h = TestHarness::new();
    let order_id = h
        .cash_in()
        .start(request(), op())
        .await
        .unwrap()
        .order_id
        .unwrap();

    let outcome = h.cash_in().verify_otp(order_id, "123456", op()).await.unwrap();

    assert!(matches!(
        outcome.error().and_then(ExecutionError::domain_error),
        Some(FlowError::OtpRejected(_))
    ));
    assert_eq!(h.order(order_id).await.status(), OrderStatus::Success);
    assert_eq!(h.bank.calls(BankOperation::VerifyOtp).await, 0);
}

#[tokio::test]
async fn test_otp_not_allowed_for_cash_out() {
    let h = TestHarness::new();
    h.bank.script(BankOperation::CashOut, "103").await;

    let outcome = h.cash_out().start(request(), op()).await.unwrap();

    assert!(matches!(
        outcome.error().and_then(ExecutionError::domain_error),
        Some(FlowError::BankRejected { .. })
    ));
    let order = h.order(outcome.order_id.unwrap()).await;
    assert_eq!(order.status(), OrderStatus::Failed);
}

#[tokio::test]
async fn test_transfer_requires_destination() {
    let h = TestHarness::new();

    let missing = h.cash_out().transfer(request(), op()).await.unwrap();
    assert!(matches!(
        missing.error().and_then(ExecutionError::domain_error),
        Some(FlowError::InvalidRequest(_))
    ));
    assert!(missing.order_id.is_none());

    let ok = h
        .cash_out()
        .transfer(request().with_destination("0011223344"), op())
        .await
        .unwrap();
    assert!(ok.is_success());
    assert_eq!(h.bank.calls(BankOperation::Transfer).await, 1);
}

#[tokio::test]
async fn test_cancelled_request_starts_nothing() {
    let h = TestHarness::new();
    let (ctx, handle) = ExecutionContext::cancellable();
    handle.cancel();

    let outcome = h.cash_out().start(request(), ctx).await.unwrap();

    assert!(matches!(
        outcome.error(),
        Some(ExecutionError::Cancelled { .. })
    ));
    assert!(outcome.order_id.is_none());
    assert_eq!(h.orders.order_count().await, 0);
}

#[tokio::test]
async fn test_every_play_is_logged() {
    let h = TestHarness::new();
    h.cash_out().start(request(), op()).await.unwrap();
    h.bank.script(BankOperation::CashIn, "400").await;
    h.cash_in().start(request(), op()).await.unwrap();

    assert_eq!(h.log.len().await, 2);
    let record = h.log.last_for("cash_in").await.unwrap();
    assert_eq!(record.outcomes.len(), 4);
}

#[tokio::test]
async fn test_concurrent_sagas_are_independent() {
    let h = TestHarness::new();
    let flow = h.cash_out();

    let mut handles = Vec::new();
    for _ in 0..20 {
        let flow = flow.clone();
        handles.push(tokio::spawn(async move {
            flow.start(request(), ExecutionContext::background())
                .await
                .unwrap()
        }));
    }

    for handle in handles {
        let outcome = handle.await.unwrap();
        assert!(outcome.is_success());
        let order = h.order(outcome.order_id.unwrap()).await;
        assert_eq!(order.status(), OrderStatus::Success);
    }
    assert_eq!(h.ledger.confirm_count().await, 20);
}

#[tokio::test]
async fn test_cancellation_after_bank_success_completes_order() {
    let h = TestHarness::new();
    let (ctx, handle) = ExecutionContext::cancellable();
    let flow = CashOutFlow::new(h.deps_cancelling_in_bank(handle));

    let outcome = flow.start(request(), ctx).await.unwrap();

    assert!(matches!(
        outcome.error(),
        Some(ExecutionError::Cancelled { .. })
    ));
    let order = h.order(outcome.order_id.unwrap()).await;
    assert_eq!(order.status(), OrderStatus::Success);
    let txn = h.txn(&order).await;
    assert_eq!(txn.status(), TransactionStatus::Finish);
    assert_eq!(h.ledger.cancel_count().await, 0);
    assert_eq!(h.ledger.confirm_count().await, 1);
    assert_eq!(
        h.notifications(order.id()).await,
        vec![NotificationKind::OrderSucceeded]
    );
}

#[tokio::test]
async fn test_cancellation_after_bank_success_keeps_voucher() {
    let h = TestHarness::new();
    h.promotion
        .add_voucher("WELCOME", Money::from_minor(10_000))
        .await;
    let (ctx, handle) = ExecutionContext::cancellable();
    let flow = CashOutFlow::new(h.deps_cancelling_in_bank(handle));

    let outcome = flow
        .start(request().with_voucher("WELCOME"), ctx)
        .await
        .unwrap();

    assert!(!outcome.is_success());
    assert_eq!(h.promotion.reversed_count().await, 0);
    assert_eq!(h.promotion.active_usages().await, 1);
    assert!(h.order(outcome.order_id.unwrap()).await.is_success());
}

#[tokio::test]
async fn test_cancellation_after_otp_accepted_completes_order() {
    let h = TestHarness::new();
    h.bank.script(BankOperation::CashIn, "103").await;
    let order_id = h
        .cash_in()
        .start(request(), op())
        .await
        .unwrap()
        .order_id
        .unwrap();

    let (ctx, handle) = ExecutionContext::cancellable();
    let flow = CashInFlow::new(h.deps_cancelling_in_bank(handle));
    let outcome = flow.verify_otp(order_id, "123456", ctx).await.unwrap();

    assert!(matches!(
        outcome.error(),
        Some(ExecutionError::Cancelled { .. })
    ));
    let order = h.order(order_id).await;
    assert_eq!(order.status(), OrderStatus::Success);
    assert_eq!(h.txn(&order).await.status(), TransactionStatus::Finish);
    assert_eq!(h.ledger.cancel_count().await, 0);
}

#[tokio::test]
async fn test_verify_otp_refuses_other_order_types() {
    let h = TestHarness::new();
    let mut order = h.in_flight_order(OrderType::CashOut).await;
    order.mark_awaiting_otp().unwrap();
    h.orders.insert(order.clone()).await;
    h.bank.script(BankOperation::VerifyOtp, "400").await;

    let outcome = h.cash_in().verify_otp(order.id(), "123456", op()).await.unwrap();

    assert!(matches!(
        outcome.error().and_then(ExecutionError::domain_error),
        Some(FlowError::OtpRejected(_))
    ));
    assert_eq!(h.bank.calls(BankOperation::VerifyOtp).await, 0);
    let order = h.order(order.id()).await;
    assert_eq!(order.status(), OrderStatus::Processing);
    assert_eq!(order.order_type(), OrderType::CashOut);
    assert!(h.txn(&order).await.is_cancellable());
    assert_eq!(h.ledger.cancel_count().await, 0);
}

#[tokio::test]
async fn test_verify_otp_requires_a_pending_otp_request() {
    let h = TestHarness::new();
    let order = h.in_flight_order(OrderType::CashIn).await;
    h.bank.script(BankOperation::VerifyOtp, "400").await;

    let outcome = h.cash_in().verify_otp(order.id(), "123456", op()).await.unwrap();

    assert!(matches!(
        outcome.error().and_then(ExecutionError::domain_error),
        Some(FlowError::OtpRejected(_))
    ));
    assert_eq!(h.bank.calls(BankOperation::VerifyOtp).await, 0);
    assert_eq!(h.order(order.id()).await.status(), OrderStatus::Processing);
}

#[tokio::test]
async fn test_answers_are_classified_per_provider() {
    let h = TestHarness::new();
    let deps = FlowDeps {
        classifier: ClassifierRegistry::default().with_provider(
            "NAPAS",
            StatusClassifier::builder()
                .designate("411", Outcome::NeedsOtp)
                .build(),
        ),
        ..h.deps.clone()
    };
    let flow = CashInFlow::new(deps);

    h.bank.script(BankOperation::CashIn, "411").await;
    let napas = PaymentRequest::new(UserId::new(), Money::from_minor(50_000), "napas");
    let outcome = flow.start(napas, op()).await.unwrap();
    assert_eq!(outcome.next_action, NextAction::EnterOtp);

    h.bank.script(BankOperation::CashIn, "411").await;
    let outcome = flow.start(request(), op()).await.unwrap();
    assert!(matches!(
        outcome.error().and_then(ExecutionError::domain_error),
        Some(FlowError::BankRejected { .. })
    ));
}

#[tokio::test]
async fn test_refund_credits_the_wallet() {
    let h = TestHarness::new();
    let request = request();
    let user_id = request.user_id;

    let outcome = RefundFlow::new(h.deps.clone())
        .start(request, op())
        .await
        .unwrap();

    assert!(outcome.is_success());
    assert_eq!(h.bank.calls(BankOperation::Refund).await, 1);
    let order = h.order(outcome.order_id.unwrap()).await;
    assert_eq!(order.order_type(), OrderType::Refund);
    let txn = h.txn(&order).await;
    assert_eq!(txn.payee_id(), Some(user_id));
    assert_eq!(txn.status(), TransactionStatus::Finish);
}

#[tokio::test]
async fn test_gateway_refusal_rolls_back() {
    let h = TestHarness::new();
    h.bank
        .script_error(
            BankOperation::CashOut,
            ServiceError::Rejected("daily limit reached".into()),
        )
        .await;

    let outcome = h.cash_out().start(request(), op()).await.unwrap();

    assert_eq!(outcome.error().unwrap().to_string(), "daily limit reached");
    let order = h.order(outcome.order_id.unwrap()).await;
    assert_eq!(order.status(), OrderStatus::Failed);
    assert_eq!(h.txn(&order).await.status(), TransactionStatus::Failed);
    assert_eq!(h.ledger.cancel_count().await, 1);
}
