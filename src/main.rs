mod api;
mod config;
mod error;
mod image_pipeline;
mod lifecycle;
mod listing_store;
mod moderation;
mod object_storage;
mod submission;
mod vehicle;

use anyhow::{Context, Result};
use api::{start_api_server, AppState};
use config::Config;
use lifecycle::ListingLifecycle;
use listing_store::{ListingStore, PgListingStore};
use moderation::ModerationQueue;
use object_storage::{ObjectStorage, S3ObjectStorage};
use std::sync::Arc;
use submission::SubmissionPipeline;
use tokio::signal;
use tracing::{error, info};
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

#[tokio::main]
async fn main() -> Result<()> {
    // Load configuration
    let config = Config::load().context("Failed to load configuration")?;

    // Initialize logging
    init_tracing(&config.service.log_level);

    info!(
        service = %config.service.name,
        "Starting listing service"
    );

    // Initialize metrics
    init_metrics(config.service.metrics_port)?;

    // Initialize components
    let store = Arc::new(
        PgListingStore::new(&config.database)
            .await
            .context("Failed to initialize listing store")?,
    );

    // Run migrations if enabled
    if config.database.run_migrations {
        store
            .run_migrations()
            .await
            .context("Failed to run database migrations")?;
    }

    let storage = Arc::new(
        S3ObjectStorage::new(&config.s3)
            .await
            .context("Failed to initialize S3 image storage")?,
    );

    let store: Arc<dyn ListingStore> = store;
    let storage: Arc<dyn ObjectStorage> = storage;

    let submissions = Arc::new(SubmissionPipeline::new(
        store.clone(),
        storage.clone(),
        config.listings.clone(),
        config.s3.key_prefix.clone(),
    ));
    let moderation = Arc::new(ModerationQueue::new(
        store.clone(),
        storage.clone(),
        config.listing_ttl(),
    ));
    let lifecycle = Arc::new(ListingLifecycle::new(store.clone(), storage.clone()));

    let state = AppState {
        store,
        submissions,
        moderation,
        lifecycle,
    };

    // Spawn API server task
    let api_config = config.api.clone();
    let listing_config = config.listings.clone();
    let api_handle = tokio::spawn(async move {
        if let Err(e) = start_api_server(state, &api_config, &listing_config).await {
            error!(error = %e, "API server error");
        }
    });

    info!("Listing service started successfully");

    // Wait for shutdown signal
    shutdown_signal().await;

    info!("Shutting down listing service");

    api_handle.abort();

    info!("Listing service stopped");

    Ok(())
}

/// Initialize tracing/logging
fn init_tracing(log_level: &str) {
    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(log_level));

    tracing_subscriber::registry()
        .with(env_filter)
        .with(fmt::layer().json())
        .init();
}

/// Initialize Prometheus metrics exporter
fn init_metrics(port: u16) -> Result<()> {
    let builder = metrics_exporter_prometheus::PrometheusBuilder::new();

    builder
        .with_http_listener(([0, 0, 0, 0], port))
        .install()
        .context("Failed to install Prometheus metrics exporter")?;

    info!(port = port, "Prometheus metrics exporter started");

    Ok(())
}

/// Wait for shutdown signal (SIGINT or SIGTERM)
async fn shutdown_signal() {
    let ctrl_c = async {
        signal::ctrl_c()
            .await
            .expect("Failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("Failed to install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            info!("Received Ctrl+C signal");
        }
        _ = terminate => {
            info!("Received SIGTERM signal");
        }
    }
}
