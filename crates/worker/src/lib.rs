//! Wallet orchestration worker.
//!
//! Wires the collaborators, the saga flows and the reconciliation job
//! together and exposes operational HTTP endpoints:
//! - `GET /health`: liveness plus pool and provider details
//! - `GET /metrics`: Prometheus exposition
//! - `POST /reconciliation/run`: runs one sweep immediately

pub mod config;
pub mod error;
pub mod routes;

use std::sync::Arc;

use axum::Router;
use axum::routing::{get, post};
use domain::ClassifierRegistry;
use metrics_exporter_prometheus::PrometheusHandle;
use reconciliation::ReconciliationJob;
use saga::services::{
    InMemoryVirtualAccountGateway, VaProvider, VirtualAccountRegistry, VirtualAccountService,
};
use saga::{
    CashInFlow, CashOutFlow, FlowDeps, InMemoryBankGateway, InMemoryLedgerService,
    InMemoryNotifier, InMemoryOrderStore, InMemoryPromotionService, TracingExecutionLog,
    WorkerPool,
};
use tower_http::trace::TraceLayer;

use config::Config;

/// Every collaborator of the process, built once at start.
///
/// Adapters are the in-memory ones; network-backed adapters plug in
/// behind the same traits.
#[derive(Clone)]
pub struct Services {
    pub orders: Arc<InMemoryOrderStore>,
    pub ledger: Arc<InMemoryLedgerService>,
    pub bank: Arc<InMemoryBankGateway>,
    pub notifier: Arc<InMemoryNotifier>,
    pub flows: FlowDeps,
    pub job: Arc<ReconciliationJob>,
    pub virtual_accounts: Option<VirtualAccountService>,
}

impl Services {
    pub fn in_memory(config: &Config) -> Self {
        let orders = Arc::new(InMemoryOrderStore::new());
        let ledger = Arc::new(InMemoryLedgerService::new());
        let bank = Arc::new(InMemoryBankGateway::new());
        let notifier = Arc::new(InMemoryNotifier::new());
        let classifiers = ClassifierRegistry::default();

        let flows = FlowDeps {
            orders: orders.clone(),
            ledger: ledger.clone(),
            promotion: Arc::new(InMemoryPromotionService::new()),
            bank: bank.clone(),
            notifier: notifier.clone(),
            pool: WorkerPool::new(config.pool_config()),
            log: Arc::new(TracingExecutionLog),
            classifier: classifiers.clone(),
            config: config.flow_config(),
        };

        let job = Arc::new(ReconciliationJob::new(
            orders.clone(),
            ledger.clone(),
            bank.clone(),
            classifiers.clone(),
            config.reconciliation_config(),
        ));

        let registry = VaProvider::ALL.into_iter().fold(VirtualAccountRegistry::new(), |registry, provider| {
            registry.register(Arc::new(InMemoryVirtualAccountGateway::new(provider)))
        });
        let virtual_accounts = config.va_provider.as_ref().and_then(|code| {
            match registry.select(code) {
                Ok(gateway) => Some(VirtualAccountService::new(
                    gateway,
                    classifiers.for_provider(Some(code)).clone(),
                )),
                Err(e) => {
                    tracing::warn!(provider = %code, error = %e, "Virtual accounts disabled");
                    None
                }
            }
        });

        Self {
            orders,
            ledger,
            bank,
            notifier,
            flows,
            job,
            virtual_accounts,
        }
    }

    pub fn cash_in(&self) -> CashInFlow {
        CashInFlow::new(self.flows.clone())
    }

    pub fn cash_out(&self) -> CashOutFlow {
        CashOutFlow::new(self.flows.clone())
    }

    pub fn pool(&self) -> &WorkerPool {
        &self.flows.pool
    }
}

/// Shared state of the HTTP handlers.
pub struct AppState {
    pub job: Arc<ReconciliationJob>,
    pub pool: WorkerPool,
    pub va_provider: Option<VaProvider>,
}

impl AppState {
    pub fn new(services: &Services) -> Self {
        Self {
            job: services.job.clone(),
            pool: services.pool().clone(),
            va_provider: services.virtual_accounts.as_ref().map(VirtualAccountService::provider),
        }
    }
}

/// Creates the Axum router with all routes and shared state.
pub fn create_app(state: Arc<AppState>, metrics_handle: PrometheusHandle) -> Router {
    let metrics_router = Router::new()
        .route("/metrics", get(routes::metrics::render))
        .with_state(metrics_handle);

    Router::new()
        .route("/health", get(routes::health::check))
        .route("/reconciliation/run", post(routes::reconciliation::run))
        .with_state(state)
        .merge(metrics_router)
        .layer(TraceLayer::new_for_http())
}
