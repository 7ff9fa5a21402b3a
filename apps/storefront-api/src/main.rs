//! # Pustakam Storefront API
//!
//! HTTP server for order checkout, tracking and gateway webhooks.
//!
//! ## Architecture
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                       Storefront API Server                             │
//! │                                                                         │
//! │  Browser / Gateway ───► axum (8080) ───► FulfillmentService ───► SQLite │
//! │                                                 ▲                       │
//! │                          ReconciliationWorker ──┘                       │
//! │                          (every interval_secs)                          │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Configuration
//! `pustakam.toml` in the platform config dir (or the path in
//! `PUSTAKAM_CONFIG`), then `PUSTAKAM_*` environment overrides.
//! Log filter comes from `RUST_LOG` (default `info`).

use std::path::PathBuf;
use std::sync::Arc;

use tokio::net::TcpListener;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

use pustakam_db::{Database, DbConfig};
use pustakam_fulfillment::{
    FulfillmentConfig, FulfillmentService, HttpGatewayClient, ReconciliationWorker, Reconciler,
};
use storefront_api::{router, AppState};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_target(true)
        .init();

    info!("Starting Pustakam storefront API...");

    // Load configuration
    let config_path = std::env::var_os("PUSTAKAM_CONFIG").map(PathBuf::from);
    let config = FulfillmentConfig::load(config_path)?;
    info!(
        db = %config.database.path.display(),
        payment_gateway = %config.gateway.payment_base_url,
        courier = %config.gateway.courier_base_url,
        "Configuration loaded"
    );

    // Open database (runs migrations)
    let db = Database::new(
        DbConfig::new(&config.database.path).max_connections(config.database.max_connections),
    )
    .await?;

    let service = FulfillmentService::new(db.clone(), config.pricing_policy());

    // Reconciliation runs in the background; the API only queues passes on it
    let client = Arc::new(HttpGatewayClient::new(&config.gateway)?);
    let reconciler = Arc::new(Reconciler::new(
        service.clone(),
        client,
        config.reconciliation.clone(),
    ));
    let (worker, reconciliation) = ReconciliationWorker::new(reconciler, &config.reconciliation);
    let worker_task = tokio::spawn(worker.run());

    let app = router(AppState::new(service, reconciliation.clone()));

    let bind_addr = config.server.bind_address();
    let listener = TcpListener::bind(&bind_addr).await?;
    info!(addr = %bind_addr, "Storefront API listening");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    if let Err(e) = reconciliation.shutdown().await {
        error!(error = %e, "Failed to stop reconciliation worker");
    }
    let _ = worker_task.await;
    db.close().await;

    info!("Server shutdown complete");
    Ok(())
}

/// Graceful shutdown signal handler.
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!(error = %e, "Failed to install Ctrl+C handler");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                error!(error = %e, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }

    info!("Shutdown signal received, starting graceful shutdown...");
}
