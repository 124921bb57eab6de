//! Outbound user notifications.

use std::sync::Arc;

use async_trait::async_trait;
use common::{OrderId, UserId};
use serde::{Deserialize, Serialize};
use tokio::sync::RwLock;

use crate::error::ServiceError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NotificationKind {
    OrderSucceeded,
    OrderFailed,
    OrderVerifying,
    OtpRequired,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Notification {
    pub user_id: UserId,
    pub order_id: OrderId,
    pub kind: NotificationKind,
    pub message: String,
}

/// Delivers notifications (push, message bus). Always called through the
/// worker pool, never on a saga's critical path.
#[async_trait]
pub trait Notifier: Send + Sync {
    async fn notify(&self, notification: Notification) -> Result<(), ServiceError>;
}

/// Collects notifications in memory.
#[derive(Debug, Clone, Default)]
pub struct InMemoryNotifier {
    sent: Arc<RwLock<Vec<Notification>>>,
}

impl InMemoryNotifier {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn sent(&self) -> Vec<Notification> {
        self.sent.read().await.clone()
    }

    pub async fn sent_for(&self, order_id: OrderId) -> Vec<NotificationKind> {
        self.sent
            .read()
            .await
            .iter()
            .filter(|n| n.order_id == order_id)
            .map(|n| n.kind)
            .collect()
    }
}

#[async_trait]
impl Notifier for InMemoryNotifier {
    async fn notify(&self, notification: Notification) -> Result<(), ServiceError> {
        self.sent.write().await.push(notification);
        Ok(())
    }
}
