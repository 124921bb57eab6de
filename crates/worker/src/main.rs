//! Worker entry point.

use std::sync::Arc;

use reconciliation::ReconciliationScheduler;
use saga::ExecutionContext;
use tokio::signal;
use tracing_subscriber::EnvFilter;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use worker::config::{Config, LogFormat};
use worker::{AppState, Services};

/// Waits for a shutdown signal (SIGINT or SIGTERM).
async fn shutdown_signal() {
    let ctrl_c = async {
        signal::ctrl_c()
            .await
            .expect("failed to install SIGINT handler");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("failed to install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => tracing::info!("received SIGINT, starting graceful shutdown"),
        () = terminate => tracing::info!("received SIGTERM, starting graceful shutdown"),
    }
}

fn init_tracing(config: &Config) {
    let filter = EnvFilter::try_new(&config.log_level).unwrap_or_else(|_| EnvFilter::new("info"));
    let registry = tracing_subscriber::registry().with(filter);
    match config.log_format {
        LogFormat::Json => registry
            .with(tracing_subscriber::fmt::layer().json())
            .init(),
        LogFormat::Text => registry.with(tracing_subscriber::fmt::layer()).init(),
    }
}

#[tokio::main]
async fn main() {
    let config = Config::from_env();
    init_tracing(&config);

    let metrics_handle = metrics_exporter_prometheus::PrometheusBuilder::new()
        .install_recorder()
        .expect("failed to install Prometheus recorder");

    let services = Services::in_memory(&config);

    // Stopped only after the server drained, so a sweep never races shutdown.
    let (scheduler_ctx, stop_scheduler) = ExecutionContext::cancellable();
    let scheduler = ReconciliationScheduler::new(services.job.clone()).spawn(scheduler_ctx);

    let app = worker::create_app(Arc::new(AppState::new(&services)), metrics_handle);

    let addr = config.addr();
    tracing::info!(%addr, "starting worker");
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .expect("failed to bind address");
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .expect("server error");

    stop_scheduler.cancel();
    if let Err(e) = scheduler.await {
        tracing::error!(error = %e, "reconciliation scheduler panicked");
    }
    services.pool().wait_idle().await;

    tracing::info!("worker shut down gracefully");
}
