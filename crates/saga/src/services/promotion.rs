//! Promotion (voucher) service contract and in-memory implementation.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use common::{Money, UserId};
use serde::{Deserialize, Serialize};
use tokio::sync::RwLock;

use crate::error::ServiceError;

/// A voucher applied to an order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Discount {
    pub voucher_code: String,
    pub amount: Money,
    /// Trace id the voucher usage is keyed on; used to reverse it.
    pub trace_id: String,
}

#[async_trait]
pub trait PromotionService: Send + Sync {
    async fn use_voucher(
        &self,
        code: &str,
        user_id: UserId,
        trace_id: &str,
        amount: Money,
    ) -> Result<Discount, ServiceError>;

    /// Reverses a voucher usage. Reversing an unknown trace id succeeds.
    async fn reverse_voucher(&self, trace_id: &str) -> Result<(), ServiceError>;
}

#[derive(Debug, Default)]
struct InMemoryPromotionState {
    vouchers: HashMap<String, Money>,
    usages: HashMap<String, Discount>,
    reversed: usize,
}

/// In-memory promotion service for tests and local runs.
#[derive(Debug, Clone, Default)]
pub struct InMemoryPromotionService {
    state: Arc<RwLock<InMemoryPromotionState>>,
}

impl InMemoryPromotionService {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a voucher worth at most `value`.
    pub async fn add_voucher(&self, code: &str, value: Money) {
        self.state
            .write()
            .await
            .vouchers
            .insert(code.to_string(), value);
    }

    pub async fn active_usages(&self) -> usize {
        self.state.read().await.usages.len()
    }

    pub async fn reversed_count(&self) -> usize {
        self.state.read().await.reversed
    }
}

#[async_trait]
impl PromotionService for InMemoryPromotionService {
    async fn use_voucher(
        &self,
        code: &str,
        _user_id: UserId,
        trace_id: &str,
        amount: Money,
    ) -> Result<Discount, ServiceError> {
        let mut state = self.state.write().await;
        let value = *state
            .vouchers
            .get(code)
            .ok_or_else(|| ServiceError::Rejected(format!("voucher {code} is not valid")))?;

        let discount = Discount {
            voucher_code: code.to_string(),
            amount: value.min(amount),
            trace_id: trace_id.to_string(),
        };
        state.usages.insert(trace_id.to_string(), discount.clone());
        Ok(discount)
    }

    async fn reverse_voucher(&self, trace_id: &str) -> Result<(), ServiceError> {
        let mut state = self.state.write().await;
        if state.usages.remove(trace_id).is_some() {
            state.reversed += 1;
        }
        Ok(())
    }
}
