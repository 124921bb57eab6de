//! Ledger service contract and in-memory implementation.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use common::TransactionId;
use domain::Transaction;
use tokio::sync::RwLock;

use crate::error::ServiceError;

/// The ledger owns money-movement records.
///
/// `cancel` is only valid while the record is still `Initial`; once the
/// record resolved it can only be confirmed or failed.
#[async_trait]
pub trait LedgerService: Send + Sync {
    /// Registers a debit/credit intent. May refuse (e.g. insufficient balance).
    async fn init(&self, txn: Transaction) -> Result<Transaction, ServiceError>;

    async fn confirm(&self, id: TransactionId) -> Result<Transaction, ServiceError>;

    async fn cancel(&self, id: TransactionId, reason: &str) -> Result<Transaction, ServiceError>;

    /// Holds the funds while the external outcome is unknown.
    async fn set_pending(&self, id: TransactionId) -> Result<Transaction, ServiceError>;

    /// Releases a held record once the bank reported failure.
    async fn fail(&self, id: TransactionId, reason: &str) -> Result<Transaction, ServiceError>;

    async fn find_by_id(&self, id: TransactionId) -> Result<Transaction, ServiceError>;
}

#[derive(Debug, Default)]
struct InMemoryLedgerState {
    transactions: HashMap<TransactionId, Transaction>,
    reject_init: Option<String>,
    fail_on_cancel: bool,
    unavailable: bool,
    cancel_count: usize,
    confirm_count: usize,
}

impl InMemoryLedgerState {
    fn check_available(&self) -> Result<(), ServiceError> {
        if self.unavailable {
            return Err(ServiceError::Unavailable("ledger".to_string()));
        }
        Ok(())
    }

    fn get_mut(&mut self, id: TransactionId) -> Result<&mut Transaction, ServiceError> {
        self.transactions
            .get_mut(&id)
            .ok_or_else(|| ServiceError::not_found("Transaction", id))
    }
}

/// In-memory ledger for tests and local runs.
#[derive(Debug, Clone, Default)]
pub struct InMemoryLedgerService {
    state: Arc<RwLock<InMemoryLedgerState>>,
}

impl InMemoryLedgerService {
    pub fn new() -> Self {
        Self::default()
    }

    /// Makes `init` refuse with `reason`, or accept again with `None`.
    pub async fn set_reject_init(&self, reason: Option<&str>) {
        self.state.write().await.reject_init = reason.map(str::to_string);
    }

    /// Makes `cancel` fail with `Unavailable`.
    pub async fn set_fail_on_cancel(&self, fail: bool) {
        self.state.write().await.fail_on_cancel = fail;
    }

    /// Makes every call fail with `Unavailable`.
    pub async fn set_unavailable(&self, unavailable: bool) {
        self.state.write().await.unavailable = unavailable;
    }

    /// Stores a record as-is.
    pub async fn insert(&self, txn: Transaction) {
        self.state.write().await.transactions.insert(txn.id(), txn);
    }

    pub async fn get(&self, id: TransactionId) -> Option<Transaction> {
        self.state.read().await.transactions.get(&id).cloned()
    }

    pub async fn transaction_count(&self) -> usize {
        self.state.read().await.transactions.len()
    }

    /// Number of successful cancellations.
    pub async fn cancel_count(&self) -> usize {
        self.state.read().await.cancel_count
    }

    /// Number of successful confirmations.
    pub async fn confirm_count(&self) -> usize {
        self.state.read().await.confirm_count
    }
}

#[async_trait]
impl LedgerService for InMemoryLedgerService {
    async fn init(&self, txn: Transaction) -> Result<Transaction, ServiceError> {
        let mut state = self.state.write().await;
        state.check_available()?;
        if let Some(reason) = &state.reject_init {
            return Err(ServiceError::Rejected(reason.clone()));
        }
        state.transactions.insert(txn.id(), txn.clone());
        Ok(txn)
    }

    async fn confirm(&self, id: TransactionId) -> Result<Transaction, ServiceError> {
        let mut state = self.state.write().await;
        state.check_available()?;
        let txn = state.get_mut(id)?;
        txn.confirm()?;
        let txn = txn.clone();
        state.confirm_count += 1;
        Ok(txn)
    }

    async fn cancel(&self, id: TransactionId, reason: &str) -> Result<Transaction, ServiceError> {
        let mut state = self.state.write().await;
        state.check_available()?;
        if state.fail_on_cancel {
            return Err(ServiceError::Unavailable("ledger cancel".to_string()));
        }
        let txn = state.get_mut(id)?;
        txn.cancel(reason)?;
        let txn = txn.clone();
        state.cancel_count += 1;
        Ok(txn)
    }

    async fn set_pending(&self, id: TransactionId) -> Result<Transaction, ServiceError> {
        let mut state = self.state.write().await;
        state.check_available()?;
        let txn = state.get_mut(id)?;
        txn.set_pending()?;
        Ok(txn.clone())
    }

    async fn fail(&self, id: TransactionId, reason: &str) -> Result<Transaction, ServiceError> {
        let mut state = self.state.write().await;
        state.check_available()?;
        let txn = state.get_mut(id)?;
        txn.fail(reason)?;
        Ok(txn.clone())
    }

    async fn find_by_id(&self, id: TransactionId) -> Result<Transaction, ServiceError> {
        let state = self.state.read().await;
        state.check_available()?;
        state
            .transactions
            .get(&id)
            .cloned()
            .ok_or_else(|| ServiceError::not_found("Transaction", id))
    }
}
