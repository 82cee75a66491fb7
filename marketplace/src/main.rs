//! Socialmart service process.
//!
//! This binary:
//! - Connects to `PostgreSQL` and applies migrations
//! - Starts the Prometheus scrape endpoint
//! - Runs the scheduled sales report job until shutdown
//!
//! Settlement and dashboard calls are served by the HTTP layer embedding the library.
//!
//! # Usage
//!
//! ```bash
//! docker compose up -d postgres
//! cargo run --bin socialmart
//! ```

use socialmart::{Config, Marketplace, MarketplaceSettings, ReportJob};
use socialmart_core::{Clock, SystemClock};
use socialmart_postgres::PostgresEntityStore;
use socialmart_runtime::metrics::MetricsServer;
use std::sync::Arc;
use tokio::sync::watch;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Load .env file
    let _ = dotenvy::dotenv();

    let config = Config::from_env();

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| config.server.log_level.as_str().into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    tracing::info!("Starting Socialmart...");
    tracing::info!(
        max_connections = config.postgres.max_connections,
        report_interval_secs = config.reporting.report_interval_secs,
        "Configuration loaded"
    );

    let mut metrics_server = MetricsServer::new(config.metrics_addr().parse()?);
    metrics_server.start()?;
    socialmart::metrics::register_business_metrics();

    let store = PostgresEntityStore::connect(&config.postgres.url, &config.pool_settings()).await?;
    store.migrate().await?;
    tracing::info!("✓ Entity store ready");

    let clock: Arc<dyn Clock> = Arc::new(SystemClock);
    let marketplace = Marketplace::new(Arc::new(store), Arc::clone(&clock), MarketplaceSettings::from(&config));

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let job = ReportJob::new(marketplace, clock, config.report_interval(), shutdown_rx);
    let job_handle = tokio::spawn(job.run());

    tracing::info!("Socialmart is running. Press Ctrl+C to shutdown");
    tokio::signal::ctrl_c().await?;

    tracing::info!("Shutting down gracefully...");
    let _ = shutdown_tx.send(true);
    if let Err(e) = job_handle.await {
        tracing::error!(error = %e, "Report job did not stop cleanly");
    }
    Ok(())
}
