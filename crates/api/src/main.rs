//! API server entry point.

use std::sync::Arc;
use std::time::Duration;

use api::config::{Config, LogFormat};
use api::state::{SharedNotifier, SharedStore};
use api::{AppState, demo};
use checkout::{LoggingNotificationService, ReconciliationJob};
use domain::PricingEngine;
use store::{InMemoryStore, PgStore};
use tokio::signal;
use tracing_subscriber::EnvFilter;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;

type BoxError = Box<dyn std::error::Error + Send + Sync>;

/// Waits for a shutdown signal (SIGINT or SIGTERM).
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            tracing::error!(error = %e, "failed to install SIGINT handler");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut stream) => {
                stream.recv().await;
            }
            Err(e) => {
                tracing::error!(error = %e, "failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {
            tracing::info!("received SIGINT, starting graceful shutdown");
        }
        () = terminate => {
            tracing::info!("received SIGTERM, starting graceful shutdown");
        }
    }
}

fn init_tracing(config: &Config) {
    let filter = EnvFilter::try_new(&config.log_level).unwrap_or_else(|_| EnvFilter::new("info"));
    let (text, json) = match config.log_format {
        LogFormat::Text => (Some(tracing_subscriber::fmt::layer()), None),
        LogFormat::Json => (None, Some(tracing_subscriber::fmt::layer().json())),
    };

    tracing_subscriber::registry()
        .with(filter)
        .with(text)
        .with(json)
        .init();
}

/// Connects to PostgreSQL when configured, otherwise seeds an in-memory store.
async fn open_store(config: &Config) -> Result<SharedStore, BoxError> {
    match &config.database_url {
        Some(url) => {
            let store = PgStore::connect(url, config.db_max_connections)
                .await?
                .with_lock_timeout(config.lock_timeout);
            store.run_migrations().await?;
            tracing::info!(max_connections = config.db_max_connections, "connected to PostgreSQL");
            Ok(Arc::new(store))
        }
        None => {
            let store = InMemoryStore::with_lock_timeout(config.lock_timeout);
            demo::seed(&store).await?;
            tracing::info!("DATABASE_URL not set, using in-memory store");
            Ok(Arc::new(store))
        }
    }
}

/// Periodically repairs every cart and deactivates expired coupons.
async fn reconcile_loop(job: ReconciliationJob<SharedStore>, period: Duration) {
    let mut ticker = tokio::time::interval(period);
    // The first tick completes immediately.
    ticker.tick().await;

    loop {
        ticker.tick().await;
        metrics::counter!("reconciliation_sweeps_total").increment(1);

        match job.run_sweep().await {
            Ok(report) => tracing::info!(
                carts_checked = report.carts_checked,
                carts_adjusted = report.carts_adjusted,
                adjustments = report.adjustments,
                failures = report.failures,
                "reconciliation sweep finished"
            ),
            Err(e) => tracing::error!(error = %e, "reconciliation sweep failed"),
        }

        if let Err(e) = job.expire_coupons(chrono::Utc::now()).await {
            tracing::error!(error = %e, "coupon expiry pass failed");
        }
    }
}

#[tokio::main]
async fn main() -> Result<(), BoxError> {
    // 1. Configuration and tracing
    let config = Config::from_env();
    init_tracing(&config);

    // 2. Install Prometheus metrics recorder
    let metrics_handle = metrics_exporter_prometheus::PrometheusBuilder::new()
        .install_recorder()
        .map_err(|e| format!("failed to install Prometheus recorder: {e}"))?;

    // 3. Store and application state
    let store = open_store(&config).await?;
    let notifier: SharedNotifier = Arc::new(LoggingNotificationService);
    let pricing = PricingEngine::new(config.pricing.clone());
    let state = Arc::new(AppState::new(store, pricing, notifier));

    // 4. Background reconciliation
    if let Some(period) = config.reconcile_interval {
        tracing::info!(period_secs = period.as_secs(), "starting reconciliation loop");
        tokio::spawn(reconcile_loop(state.reconciliation.clone(), period));
    }

    // 5. Build the application
    let app = api::create_app(state, metrics_handle);

    // 6. Start server
    let addr = config.addr();
    tracing::info!(%addr, "starting API server");

    let listener = tokio::net::TcpListener::bind(&addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    tracing::info!("server shut down gracefully");
    Ok(())
}
