//! Order persistence contract and in-memory implementation.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use common::OrderId;
use domain::Order;
use tokio::sync::RwLock;

use crate::error::ServiceError;

/// Persistence for orders. Every write is a full replace keyed on the id.
///
/// Replaces are conditional: the store refuses a write that would move a
/// stored order backward or out of a terminal status. This is the only
/// mutual exclusion between a live flow and reconciliation.
#[async_trait]
pub trait OrderStore: Send + Sync {
    async fn create(&self, order: Order) -> Result<Order, ServiceError>;

    /// Replaces the stored order. Fails with `NotFound` or `Conflict`.
    async fn replace_by_id(&self, order: Order) -> Result<Order, ServiceError>;

    /// Replace used when entering `Processing`. Also fails with `Expired`
    /// if the stored order is already past its deadline.
    async fn processing_by_id(&self, order: Order) -> Result<Order, ServiceError>;

    async fn find_by_id(&self, id: OrderId) -> Result<Option<Order>, ServiceError>;

    /// Unresolved orders whose deadline is before `now`, oldest first.
    async fn find_expired(
        &self,
        now: DateTime<Utc>,
        limit: usize,
    ) -> Result<Vec<Order>, ServiceError>;
}

#[derive(Debug, Default)]
struct InMemoryOrderState {
    orders: HashMap<OrderId, Order>,
    unavailable: bool,
    writes: usize,
}

impl InMemoryOrderState {
    fn check_available(&self) -> Result<(), ServiceError> {
        if self.unavailable {
            return Err(ServiceError::Unavailable("order store".to_string()));
        }
        Ok(())
    }

    fn guarded_replace(&mut self, order: Order) -> Result<Order, ServiceError> {
        let stored = self
            .orders
            .get(&order.id())
            .ok_or_else(|| ServiceError::not_found("Order", order.id()))?;

        if !stored.status().accepts_overwrite(order.status()) {
            return Err(ServiceError::Conflict(format!(
                "order {} is {}, refusing to write {}",
                order.id(),
                stored.status(),
                order.status()
            )));
        }

        self.orders.insert(order.id(), order.clone());
        self.writes += 1;
        Ok(order)
    }
}

/// In-memory order store for tests and local runs.
#[derive(Debug, Clone, Default)]
pub struct InMemoryOrderStore {
    state: Arc<RwLock<InMemoryOrderState>>,
}

impl InMemoryOrderStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Makes every call fail with `Unavailable`.
    pub async fn set_unavailable(&self, unavailable: bool) {
        self.state.write().await.unavailable = unavailable;
    }

    /// Stores an order as-is, bypassing the write guards.
    pub async fn insert(&self, order: Order) {
        self.state.write().await.orders.insert(order.id(), order);
    }

    pub async fn get(&self, id: OrderId) -> Option<Order> {
        self.state.read().await.orders.get(&id).cloned()
    }

    pub async fn order_count(&self) -> usize {
        self.state.read().await.orders.len()
    }

    /// Number of successful replaces.
    pub async fn write_count(&self) -> usize {
        self.state.read().await.writes
    }
}

#[async_trait]
impl OrderStore for InMemoryOrderStore {
    async fn create(&self, order: Order) -> Result<Order, ServiceError> {
        let mut state = self.state.write().await;
        state.check_available()?;
        if state.orders.contains_key(&order.id()) {
            return Err(ServiceError::Conflict(format!(
                "order {} already exists",
                order.id()
            )));
        }
        state.orders.insert(order.id(), order.clone());
        Ok(order)
    }

    async fn replace_by_id(&self, order: Order) -> Result<Order, ServiceError> {
        let mut state = self.state.write().await;
        state.check_available()?;
        state.guarded_replace(order)
    }

    async fn processing_by_id(&self, order: Order) -> Result<Order, ServiceError> {
        let mut state = self.state.write().await;
        state.check_available()?;
        let expired_at = state
            .orders
            .get(&order.id())
            .map(Order::expired_at)
            .ok_or_else(|| ServiceError::not_found("Order", order.id()))?;
        if expired_at < Utc::now() {
            return Err(ServiceError::Expired(order.id()));
        }
        state.guarded_replace(order)
    }

    async fn find_by_id(&self, id: OrderId) -> Result<Option<Order>, ServiceError> {
        let state = self.state.read().await;
        state.check_available()?;
        Ok(state.orders.get(&id).cloned())
    }

    async fn find_expired(
        &self,
        now: DateTime<Utc>,
        limit: usize,
    ) -> Result<Vec<Order>, ServiceError> {
        let state = self.state.read().await;
        state.check_available()?;
        let mut expired: Vec<Order> = state
            .orders
            .values()
            .filter(|o| o.status().is_unresolved() && o.expired_at() < now)
            .cloned()
            .collect();
        // Ids are time-ordered, so this is creation order.
        expired.sort_by_key(Order::id);
        expired.truncate(limit);
        Ok(expired)
    }
}
