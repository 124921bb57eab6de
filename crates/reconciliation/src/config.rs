//! Reconciliation settings.

use std::collections::HashSet;
use std::time::Duration;

use domain::{Order, ProviderCode};
use serde::{Deserialize, Serialize};

/// Reconciliation settings, passed explicitly to the job and scheduler.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReconciliationConfig {
    /// Time between two sweeps.
    pub interval: Duration,
    /// Maximum orders examined per sweep.
    pub batch_limit: usize,
    /// Orders reconciled in parallel within one sweep.
    pub concurrency: usize,
    /// Providers whose calls cannot always be confirmed synchronously.
    pub retrieval_providers: HashSet<ProviderCode>,
    /// Fail reason written on expired orders.
    pub expired_reason: String,
}

impl Default for ReconciliationConfig {
    fn default() -> Self {
        Self {
            interval: Duration::from_secs(60),
            batch_limit: 500,
            concurrency: 8,
            retrieval_providers: HashSet::new(),
            expired_reason: "order expired".to_string(),
        }
    }
}

impl ReconciliationConfig {
    pub fn with_retrieval_provider(mut self, code: impl Into<ProviderCode>) -> Self {
        self.retrieval_providers.insert(code.into());
        self
    }

    /// Returns true if the bank must be asked before resolving `order`.
    ///
    /// Verifying orders are indeterminate by definition, so they always are.
    pub fn requires_retrieval(&self, order: &Order) -> bool {
        order.is_verifying()
            || order
                .provider()
                .is_some_and(|p| self.retrieval_providers.contains(p))
    }
}
