//! The reconciliation sweep.

use std::sync::Arc;

use chrono::Utc;
use common::OrderId;
use domain::{ClassifierRegistry, Order, OutcomeKind, Transaction, TransactionStatus};
use futures_util::StreamExt;
use futures_util::stream;
use saga::{BankGateway, LedgerService, OrderStore, ServiceError};
use serde::{Deserialize, Serialize};
use tracing::instrument;

use crate::config::ReconciliationConfig;
use crate::error::Result;

/// What a sweep did with one order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Resolution {
    /// Settled to `SUCCESS` from bank or ledger ground truth.
    Succeeded,
    /// Settled to `FAILED` from bank ground truth.
    Failed,
    /// Failed because it outlived its deadline.
    Expired,
    /// Left as-is until a later sweep.
    Skipped,
}

impl Resolution {
    pub fn as_str(&self) -> &'static str {
        match self {
            Resolution::Succeeded => "succeeded",
            Resolution::Failed => "failed",
            Resolution::Expired => "expired",
            Resolution::Skipped => "skipped",
        }
    }
}

/// Counters for one sweep.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SweepReport {
    pub examined: usize,
    pub succeeded: usize,
    pub failed: usize,
    pub expired: usize,
    pub skipped: usize,
    /// Orders left untouched because a collaborator call failed.
    pub errors: usize,
}

impl SweepReport {
    fn record(&mut self, resolution: Resolution) {
        match resolution {
            Resolution::Succeeded => self.succeeded += 1,
            Resolution::Failed => self.failed += 1,
            Resolution::Expired => self.expired += 1,
            Resolution::Skipped => self.skipped += 1,
        }
    }

    /// Orders whose status changed.
    pub fn resolved(&self) -> usize {
        self.succeeded + self.failed + self.expired
    }
}

/// Resolves orders that their synchronous flow left unresolved.
///
/// Candidates are unresolved orders past their deadline. For each:
/// - orders that need bank ground truth (verifying, or created through a
///   retrieval provider) and were not retrieved yet are resolved from
///   `retrieve_order_status`
/// - orders whose ledger record is on hold are resolved the same way
/// - everything else is expired, withdrawing its ledger record if still
///   cancellable
///
/// A failed collaborator call leaves the order untouched for the next
/// sweep. Every order write is a conditional replace, so a flow that
/// resolved the order meanwhile always wins.
pub struct ReconciliationJob {
    orders: Arc<dyn OrderStore>,
    ledger: Arc<dyn LedgerService>,
    bank: Arc<dyn BankGateway>,
    classifier: ClassifierRegistry,
    config: ReconciliationConfig,
}

impl ReconciliationJob {
    pub fn new(
        orders: Arc<dyn OrderStore>,
        ledger: Arc<dyn LedgerService>,
        bank: Arc<dyn BankGateway>,
        classifier: impl Into<ClassifierRegistry>,
        config: ReconciliationConfig,
    ) -> Self {
        Self {
            orders,
            ledger,
            bank,
            classifier: classifier.into(),
            config,
        }
    }

    pub fn config(&self) -> &ReconciliationConfig {
        &self.config
    }

    /// Runs one sweep over at most `batch_limit` candidates.
    #[instrument(skip(self))]
    pub async fn sweep(&self) -> Result<SweepReport> {
        metrics::counter!("reconciliation_sweeps_total").increment(1);

        let candidates = self
            .orders
            .find_expired(Utc::now(), self.config.batch_limit)
            .await?;

        let mut report = SweepReport {
            examined: candidates.len(),
            ..SweepReport::default()
        };

        let mut results = stream::iter(candidates)
            .map(|order| async move {
                let order_id = order.id();
                (order_id, self.reconcile(order).await)
            })
            .buffer_unordered(self.config.concurrency.max(1));

        while let Some((order_id, result)) = results.next().await {
            match result {
                Ok(resolution) => {
                    metrics::counter!(
                        "reconciliation_orders_resolved",
                        "outcome" => resolution.as_str()
                    )
                    .increment(1);
                    report.record(resolution);
                }
                Err(e) => {
                    tracing::warn!(%order_id, error = %e, "Reconciliation failed, order left for next sweep");
                    metrics::counter!("reconciliation_errors").increment(1);
                    report.errors += 1;
                }
            }
        }

        tracing::info!(
            examined = report.examined,
            resolved = report.resolved(),
            skipped = report.skipped,
            errors = report.errors,
            "Reconciliation sweep finished"
        );
        Ok(report)
    }

    /// Reconciles a single order.
    #[instrument(skip(self, order), fields(order_id = %order.id(), status = %order.status()))]
    pub async fn reconcile(&self, order: Order) -> std::result::Result<Resolution, ServiceError> {
        if !order.status().is_unresolved() {
            return Ok(Resolution::Skipped);
        }

        if self.config.requires_retrieval(&order) && !order.is_retrieved() {
            return self.retrieve(order).await;
        }

        self.expire(order).await
    }

    async fn retrieve(&self, order: Order) -> std::result::Result<Resolution, ServiceError> {
        let response = self
            .bank
            .retrieve_order_status(order.id(), order.bank_trace_id())
            .await?;
        let outcome = self.classifier.classify(order.provider(), &response.code);
        tracing::info!(code = %response.code, %outcome, "Retrieved order status from bank");

        match outcome.kind() {
            OutcomeKind::Success => self.resolve(order, true, None).await,
            OutcomeKind::Failure | OutcomeKind::NeedsAuth => {
                self.resolve(order, false, Some(response.reason())).await
            }
            OutcomeKind::Pending => Ok(Resolution::Skipped),
        }
    }

    /// Settles the ledger record, then the order, from bank ground truth.
    async fn resolve(
        &self,
        mut order: Order,
        success: bool,
        reason: Option<String>,
    ) -> std::result::Result<Resolution, ServiceError> {
        let txn = self.linked_transaction(&order).await?;

        if success {
            let Some(txn) = txn else {
                tracing::error!("Bank reports success but the order has no ledger record");
                return Ok(Resolution::Skipped);
            };
            match txn.status() {
                TransactionStatus::Finish => {}
                TransactionStatus::Failed => {
                    tracing::error!(transaction_id = %txn.id(), "Bank reports success but the ledger record failed");
                    return Ok(Resolution::Skipped);
                }
                _ => {
                    self.ledger.confirm(txn.id()).await?;
                }
            }
        } else if let Some(txn) = txn {
            let ledger_reason = reason.as_deref().unwrap_or("bank reported failure");
            match txn.status() {
                TransactionStatus::Failed => {}
                TransactionStatus::Finish => {
                    tracing::error!(transaction_id = %txn.id(), "Bank reports failure but the ledger record finished");
                    return Ok(Resolution::Skipped);
                }
                _ if txn.is_cancellable() => {
                    self.ledger.cancel(txn.id(), ledger_reason).await?;
                }
                _ => {
                    self.ledger.fail(txn.id(), ledger_reason).await?;
                }
            }
        }

        order.settle(success, reason)?;
        order.mark_retrieved();
        let resolution = if success {
            Resolution::Succeeded
        } else {
            Resolution::Failed
        };
        self.write(order, resolution).await
    }

    async fn expire(&self, mut order: Order) -> std::result::Result<Resolution, ServiceError> {
        if let Some(txn) = self.linked_transaction(&order).await? {
            match txn.status() {
                TransactionStatus::Finish => {
                    // The money moved; the order write was lost.
                    order.settle(true, None)?;
                    return self.write(order, Resolution::Succeeded).await;
                }
                TransactionStatus::Pending => {
                    // A held record means the bank outcome was never learned.
                    tracing::warn!(transaction_id = %txn.id(), "Funds on hold, asking the bank");
                    return self.retrieve(order).await;
                }
                _ if txn.is_cancellable() => {
                    self.ledger
                        .cancel(txn.id(), &self.config.expired_reason)
                        .await?;
                }
                _ => {}
            }
        }

        order.expire(self.config.expired_reason.clone())?;
        self.write(order, Resolution::Expired).await
    }

    async fn linked_transaction(
        &self,
        order: &Order,
    ) -> std::result::Result<Option<Transaction>, ServiceError> {
        match order.transaction_id() {
            Some(id) => self.ledger.find_by_id(id).await.map(Some),
            None => Ok(None),
        }
    }

    async fn write(
        &self,
        order: Order,
        resolution: Resolution,
    ) -> std::result::Result<Resolution, ServiceError> {
        let order_id: OrderId = order.id();
        match self.orders.replace_by_id(order).await {
            Ok(order) => {
                tracing::info!(%order_id, status = %order.status(), "Order reconciled");
                Ok(resolution)
            }
            Err(ServiceError::Conflict(reason)) => {
                tracing::info!(%order_id, %reason, "Order resolved concurrently");
                Ok(Resolution::Skipped)
            }
            Err(e) => Err(e),
        }
    }
}

impl std::fmt::Debug for ReconciliationJob {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ReconciliationJob")
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}
