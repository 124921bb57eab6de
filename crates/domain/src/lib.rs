//! Domain layer for the wallet transaction core.
//!
//! This crate provides the pure, synchronous building blocks every
//! orchestration flow depends on:
//! - Order model with its forward-only status state machine
//! - Ledger transaction record with its INITIAL/resolved gating
//! - Status classifier mapping provider codes to business outcomes

pub mod classifier;
pub mod order;
pub mod transaction;

pub use classifier::{
    ClassifierRegistry, Outcome, OutcomeKind, StatusClassifier, StatusClassifierBuilder, StatusCode,
};
pub use order::{Order, OrderError, OrderStatus, OrderType, ProviderCode, SourceOfFund};
pub use transaction::{Transaction, TransactionError, TransactionState, TransactionStatus};
