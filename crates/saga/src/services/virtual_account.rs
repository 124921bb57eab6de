//! Virtual-account provider strategy.
//!
//! Each partner bank is one [`VaProvider`] variant behind the same
//! [`VirtualAccountGateway`] capability. The gateway is picked once from
//! configuration through [`VirtualAccountRegistry`].

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use common::UserId;
use domain::{ProviderCode, StatusClassifier};
use serde::{Deserialize, Serialize};
use tokio::sync::RwLock;

use crate::error::ServiceError;
use crate::services::provider::{Classified, ProviderResponse};

/// Partner banks issuing virtual accounts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum VaProvider {
    Bidv,
    Vpbank,
}

impl VaProvider {
    pub const ALL: [VaProvider; 2] = [VaProvider::Bidv, VaProvider::Vpbank];

    pub fn code(&self) -> ProviderCode {
        ProviderCode::new(self.as_str())
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            VaProvider::Bidv => "BIDV",
            VaProvider::Vpbank => "VPBANK",
        }
    }

    /// Account number prefix assigned by the partner bank.
    fn account_prefix(&self) -> &'static str {
        match self {
            VaProvider::Bidv => "963",
            VaProvider::Vpbank => "VP",
        }
    }
}

impl TryFrom<&ProviderCode> for VaProvider {
    type Error = ServiceError;

    fn try_from(code: &ProviderCode) -> Result<Self, Self::Error> {
        VaProvider::ALL
            .into_iter()
            .find(|p| p.as_str() == code.as_str())
            .ok_or_else(|| ServiceError::not_found("VirtualAccountProvider", code))
    }
}

impl std::fmt::Display for VaProvider {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum VaStatus {
    Active,
    Closed,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VirtualAccount {
    pub account_number: String,
    pub user_id: UserId,
    pub holder_name: String,
    pub provider: VaProvider,
    pub status: VaStatus,
}

/// Request to open a virtual account.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VaRequest {
    pub user_id: UserId,
    pub holder_name: String,
}

/// A provider answer, with the account when the provider returned one.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VaResponse {
    pub response: ProviderResponse,
    pub account: Option<VirtualAccount>,
}

/// Virtual-account lifecycle capability every partner bank implements.
#[async_trait]
pub trait VirtualAccountGateway: Send + Sync {
    fn provider(&self) -> VaProvider;

    async fn create_va(&self, request: &VaRequest) -> Result<VaResponse, ServiceError>;

    async fn update_va(
        &self,
        account_number: &str,
        holder_name: &str,
    ) -> Result<VaResponse, ServiceError>;

    async fn close_va(&self, account_number: &str) -> Result<VaResponse, ServiceError>;

    async fn reopen_va(&self, account_number: &str) -> Result<VaResponse, ServiceError>;

    async fn detail(&self, account_number: &str) -> Result<VaResponse, ServiceError>;
}

/// Lookup table from provider to gateway.
#[derive(Clone, Default)]
pub struct VirtualAccountRegistry {
    gateways: HashMap<VaProvider, Arc<dyn VirtualAccountGateway>>,
}

impl VirtualAccountRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a gateway under its own provider, replacing any previous one.
    pub fn register(mut self, gateway: Arc<dyn VirtualAccountGateway>) -> Self {
        self.gateways.insert(gateway.provider(), gateway);
        self
    }

    pub fn get(&self, provider: VaProvider) -> Result<Arc<dyn VirtualAccountGateway>, ServiceError> {
        self.gateways
            .get(&provider)
            .cloned()
            .ok_or_else(|| ServiceError::not_found("VirtualAccountGateway", provider))
    }

    /// Picks the gateway for a configured provider code.
    pub fn select(&self, code: &ProviderCode) -> Result<Arc<dyn VirtualAccountGateway>, ServiceError> {
        self.get(VaProvider::try_from(code)?)
    }

    pub fn providers(&self) -> Vec<VaProvider> {
        let mut providers: Vec<_> = self.gateways.keys().copied().collect();
        providers.sort_by_key(|p| p.as_str());
        providers
    }
}

/// Classifies every virtual-account answer before callers see it.
#[derive(Clone)]
pub struct VirtualAccountService {
    gateway: Arc<dyn VirtualAccountGateway>,
    classifier: StatusClassifier,
}

impl VirtualAccountService {
    pub fn new(gateway: Arc<dyn VirtualAccountGateway>, classifier: StatusClassifier) -> Self {
        Self {
            gateway,
            classifier,
        }
    }

    pub fn provider(&self) -> VaProvider {
        self.gateway.provider()
    }

    fn classify(&self, answer: VaResponse) -> Classified<VirtualAccount> {
        Classified::new(&self.classifier, answer.response, answer.account)
    }

    #[tracing::instrument(skip(self, request), fields(provider = %self.provider(), user_id = %request.user_id))]
    pub async fn create(
        &self,
        request: &VaRequest,
    ) -> Result<Classified<VirtualAccount>, ServiceError> {
        let classified = self.classify(self.gateway.create_va(request).await?);
        tracing::info!(outcome = %classified.outcome, "virtual account create answered");
        Ok(classified)
    }

    pub async fn update(
        &self,
        account_number: &str,
        holder_name: &str,
    ) -> Result<Classified<VirtualAccount>, ServiceError> {
        Ok(self.classify(self.gateway.update_va(account_number, holder_name).await?))
    }

    pub async fn close(&self, account_number: &str) -> Result<Classified<VirtualAccount>, ServiceError> {
        Ok(self.classify(self.gateway.close_va(account_number).await?))
    }

    pub async fn reopen(&self, account_number: &str) -> Result<Classified<VirtualAccount>, ServiceError> {
        Ok(self.classify(self.gateway.reopen_va(account_number).await?))
    }

    pub async fn detail(&self, account_number: &str) -> Result<Classified<VirtualAccount>, ServiceError> {
        Ok(self.classify(self.gateway.detail(account_number).await?))
    }
}

#[derive(Debug, Default)]
struct InMemoryVaState {
    accounts: HashMap<String, VirtualAccount>,
    next_number: u32,
    next_code: Option<String>,
}

/// In-memory partner bank.
#[derive(Debug, Clone)]
pub struct InMemoryVirtualAccountGateway {
    provider: VaProvider,
    state: Arc<RwLock<InMemoryVaState>>,
}

impl InMemoryVirtualAccountGateway {
    pub fn new(provider: VaProvider) -> Self {
        Self {
            provider,
            state: Arc::new(RwLock::new(InMemoryVaState::default())),
        }
    }

    /// Makes the next call answer `code` without touching any account.
    pub async fn script(&self, code: &str) {
        self.state.write().await.next_code = Some(code.to_string());
    }

    pub async fn account(&self, account_number: &str) -> Option<VirtualAccount> {
        self.state.read().await.accounts.get(account_number).cloned()
    }

    async fn with_account<F>(&self, account_number: &str, apply: F) -> Result<VaResponse, ServiceError>
    where
        F: FnOnce(&mut VirtualAccount) -> Result<(), ProviderResponse> + Send,
    {
        let mut state = self.state.write().await;
        if let Some(code) = state.next_code.take() {
            return Ok(VaResponse {
                response: ProviderResponse::new(code.as_str()),
                account: None,
            });
        }
        let Some(account) = state.accounts.get_mut(account_number) else {
            return Ok(VaResponse {
                response: ProviderResponse::new("404").with_message("account not found"),
                account: None,
            });
        };
        let response = match apply(account) {
            Ok(()) => ProviderResponse::new("200"),
            Err(refusal) => refusal,
        };
        Ok(VaResponse {
            response,
            account: Some(account.clone()),
        })
    }
}

#[async_trait]
impl VirtualAccountGateway for InMemoryVirtualAccountGateway {
    fn provider(&self) -> VaProvider {
        self.provider
    }

    async fn create_va(&self, request: &VaRequest) -> Result<VaResponse, ServiceError> {
        let mut state = self.state.write().await;
        if let Some(code) = state.next_code.take() {
            return Ok(VaResponse {
                response: ProviderResponse::new(code.as_str()),
                account: None,
            });
        }
        state.next_number += 1;
        let account = VirtualAccount {
            account_number: format!("{}{:07}", self.provider.account_prefix(), state.next_number),
            user_id: request.user_id,
            holder_name: request.holder_name.clone(),
            provider: self.provider,
            status: VaStatus::Active,
        };
        state
            .accounts
            .insert(account.account_number.clone(), account.clone());
        Ok(VaResponse {
            response: ProviderResponse::new("201"),
            account: Some(account),
        })
    }

    async fn update_va(
        &self,
        account_number: &str,
        holder_name: &str,
    ) -> Result<VaResponse, ServiceError> {
        let holder_name = holder_name.to_string();
        self.with_account(account_number, move |account| {
            account.holder_name = holder_name;
            Ok(())
        })
        .await
    }

    async fn close_va(&self, account_number: &str) -> Result<VaResponse, ServiceError> {
        self.with_account(account_number, |account| {
            account.status = VaStatus::Closed;
            Ok(())
        })
        .await
    }

    async fn reopen_va(&self, account_number: &str) -> Result<VaResponse, ServiceError> {
        self.with_account(account_number, |account| match account.status {
            VaStatus::Closed => {
                account.status = VaStatus::Active;
                Ok(())
            }
            VaStatus::Active => {
                Err(ProviderResponse::new("409").with_message("account is already active"))
            }
        })
        .await
    }

    async fn detail(&self, account_number: &str) -> Result<VaResponse, ServiceError> {
        self.with_account(account_number, |_| Ok(())).await
    }
}
