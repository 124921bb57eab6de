//! Saga engine for wallet orchestration flows.
//!
//! A [`Saga`] is an ordered list of [`Step`]s, each a forward action paired
//! with a compensation. A [`Coordinator`] plays it once:
//! 1. Forward actions run in insertion order under the operation context.
//! 2. The first failure stops the saga.
//! 3. Every attempted step, the failed one included, is compensated in
//!    reverse order under a separate compensation context.
//!
//! The crate also carries the collaborator contracts (`services`), the
//! bounded [`WorkerPool`] for fire-and-forget side effects, and the bundled
//! orchestration flows (`flows`).

pub mod context;
pub mod coordinator;
pub mod error;
pub mod flows;
pub mod log;
pub mod outcome;
pub mod pool;
pub mod saga;
pub mod services;
pub mod state;
pub mod step;

pub use context::{CancelHandle, ExecutionContext};
pub use coordinator::Coordinator;
pub use error::{ExecutionError, SagaError, ServiceError};
pub use flows::{
    CashInFlow, CashOutFlow, FlowConfig, FlowDeps, FlowError, FlowOutcome, NextAction,
    PaymentRequest, RefundFlow,
};
pub use log::{
    ExecutionLog, ExecutionRecord, FanoutExecutionLog, InMemoryExecutionLog, TracingExecutionLog,
};
pub use outcome::{CompensationStatus, ExecutionResult, ForwardStatus, StepOutcome};
pub use pool::{PoolConfig, WorkerPool};
pub use saga::Saga;
pub use services::{
    BankGateway, BankOperation, BankRequest, Classified, Discount, InMemoryBankGateway,
    InMemoryLedgerService, InMemoryNotifier, InMemoryOrderStore, InMemoryPromotionService,
    LedgerService, Notification, NotificationKind, Notifier, OrderStore, PromotionService,
    ProviderResponse,
};
pub use state::SagaState;
pub use step::{Step, StepOptions};
