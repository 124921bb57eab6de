//! Bank gateway contract and scripted in-memory implementation.

use std::collections::{HashMap, VecDeque};
use std::sync::Arc;

use async_trait::async_trait;
use common::{Money, OrderId, UserId};
use domain::ProviderCode;
use serde::{Deserialize, Serialize};
use tokio::sync::RwLock;

use crate::error::ServiceError;
use crate::services::provider::ProviderResponse;

/// A money-moving request sent to a bank gateway.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BankRequest {
    pub order_id: OrderId,
    pub user_id: UserId,
    pub amount: Money,
    pub provider: ProviderCode,
    /// Destination account for transfers.
    pub destination: Option<String>,
}

/// Gateway operations, used to script and inspect the in-memory gateway.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BankOperation {
    CashIn,
    CashOut,
    Transfer,
    VerifyOtp,
    RetrieveStatus,
    Refund,
}

/// Every operation answers with a classifiable status code plus the
/// provider's trace id. `Err` means the call itself did not complete
/// (transport failure), which says nothing about the money.
#[async_trait]
pub trait BankGateway: Send + Sync {
    /// Pulls money from the user's linked bank account.
    async fn cash_in(&self, request: &BankRequest) -> Result<ProviderResponse, ServiceError>;

    /// Pushes money to the user's linked bank account.
    async fn cash_out(&self, request: &BankRequest) -> Result<ProviderResponse, ServiceError>;

    /// Pushes money to an account at another bank.
    async fn transfer(&self, request: &BankRequest) -> Result<ProviderResponse, ServiceError>;

    async fn verify_otp(
        &self,
        order_id: OrderId,
        otp: &str,
    ) -> Result<ProviderResponse, ServiceError>;

    /// Asks for the definitive status of an earlier call.
    async fn retrieve_order_status(
        &self,
        order_id: OrderId,
        trace_id: Option<&str>,
    ) -> Result<ProviderResponse, ServiceError>;

    async fn refund(&self, request: &BankRequest) -> Result<ProviderResponse, ServiceError>;
}

#[derive(Debug, Default)]
struct InMemoryBankState {
    scripts: HashMap<BankOperation, VecDeque<Result<ProviderResponse, ServiceError>>>,
    calls: Vec<(BankOperation, OrderId)>,
    next_trace: u32,
}

impl InMemoryBankState {
    fn answer(
        &mut self,
        operation: BankOperation,
        order_id: OrderId,
    ) -> Result<ProviderResponse, ServiceError> {
        self.calls.push((operation, order_id));
        self.next_trace += 1;
        let trace_id = format!("BANK-{:06}", self.next_trace);
        match self.scripts.get_mut(&operation).and_then(VecDeque::pop_front) {
            Some(Ok(response)) if response.trace_id.is_none() => {
                Ok(response.with_trace_id(trace_id))
            }
            Some(scripted) => scripted,
            None => Ok(ProviderResponse::new("200").with_trace_id(trace_id)),
        }
    }
}

/// Bank gateway answering from per-operation scripts.
///
/// Unscripted calls succeed with code `200`.
#[derive(Debug, Clone, Default)]
pub struct InMemoryBankGateway {
    state: Arc<RwLock<InMemoryBankState>>,
}

impl InMemoryBankGateway {
    pub fn new() -> Self {
        Self::default()
    }

    /// Queues the status code the next `operation` call returns.
    pub async fn script(&self, operation: BankOperation, code: &str) {
        self.script_response(operation, ProviderResponse::new(code))
            .await;
    }

    pub async fn script_response(&self, operation: BankOperation, response: ProviderResponse) {
        self.state
            .write()
            .await
            .scripts
            .entry(operation)
            .or_default()
            .push_back(Ok(response));
    }

    /// Queues a transport failure for the next `operation` call.
    pub async fn script_error(&self, operation: BankOperation, error: ServiceError) {
        self.state
            .write()
            .await
            .scripts
            .entry(operation)
            .or_default()
            .push_back(Err(error));
    }

    /// Number of calls made for `operation`.
    pub async fn calls(&self, operation: BankOperation) -> usize {
        self.state
            .read()
            .await
            .calls
            .iter()
            .filter(|(op, _)| *op == operation)
            .count()
    }

    pub async fn total_calls(&self) -> usize {
        self.state.read().await.calls.len()
    }
}

#[async_trait]
impl BankGateway for InMemoryBankGateway {
    async fn cash_in(&self, request: &BankRequest) -> Result<ProviderResponse, ServiceError> {
        self.state
            .write()
            .await
            .answer(BankOperation::CashIn, request.order_id)
    }

    async fn cash_out(&self, request: &BankRequest) -> Result<ProviderResponse, ServiceError> {
        self.state
            .write()
            .await
            .answer(BankOperation::CashOut, request.order_id)
    }

    async fn transfer(&self, request: &BankRequest) -> Result<ProviderResponse, ServiceError> {
        if request.destination.is_none() {
            return Err(ServiceError::Rejected(
                "transfer requires a destination account".to_string(),
            ));
        }
        self.state
            .write()
            .await
            .answer(BankOperation::Transfer, request.order_id)
    }

    async fn verify_otp(
        &self,
        order_id: OrderId,
        _otp: &str,
    ) -> Result<ProviderResponse, ServiceError> {
        self.state
            .write()
            .await
            .answer(BankOperation::VerifyOtp, order_id)
    }

    async fn retrieve_order_status(
        &self,
        order_id: OrderId,
        _trace_id: Option<&str>,
    ) -> Result<ProviderResponse, ServiceError> {
        self.state
            .write()
            .await
            .answer(BankOperation::RetrieveStatus, order_id)
    }

    async fn refund(&self, request: &BankRequest) -> Result<ProviderResponse, ServiceError> {
        self.state
            .write()
            .await
            .answer(BankOperation::Refund, request.order_id)
    }
}
