use anyhow::{Context, Result};
use asset_service::config::{DatabaseBackend, StorageBackend};
use asset_service::{
    start_api_server, AppState, AssetMetadataStore, Config, IngestionPipeline,
    MemoryMetadataStore, MemoryObjectStore, ObjectStore, PostgresMetadataStore,
    ReplaceCoordinator, S3ObjectStore,
};
use std::sync::Arc;
use std::time::Duration;
use tokio::signal;
use tracing::{error, info, warn};
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

const SHUTDOWN_GRACE: Duration = Duration::from_secs(60);

#[tokio::main]
async fn main() -> Result<()> {
    // Load configuration
    let config = Config::load().context("Failed to load configuration")?;

    // Initialize logging
    init_tracing(&config.service.log_level);

    info!(
        service = %config.service.name,
        "Starting Heritage Asset Service"
    );

    // Initialize metrics
    init_metrics(config.service.metrics_port)?;

    // Initialize components
    let records = init_metadata_store(&config).await?;
    let store = init_object_store(&config).await?;

    let pipeline = Arc::new(IngestionPipeline::new(
        store,
        config.ingestion.max_entry_bytes,
    ));
    let coordinator = Arc::new(ReplaceCoordinator::new(
        pipeline.clone(),
        records.clone(),
        config.replace_lease(),
    ));

    // Replaces that crashed between purge and commit left their marker behind
    match coordinator.audit_interrupted().await {
        Ok(interrupted) if !interrupted.is_empty() => {
            warn!(
                count = interrupted.len(),
                "Assets with interrupted replaces need to be replaced again"
            );
        }
        Ok(_) => {}
        Err(e) => error!(error = %e, "Failed to audit interrupted replaces"),
    }

    // Create API state
    let api_state = AppState {
        pipeline,
        records,
        coordinator: coordinator.clone(),
        upload_url_expiry: config.presigned_upload_expiry(),
    };

    // Spawn API server task
    let api_config = config.api.clone();
    let body_limit = config.ingestion.max_upload_bytes;
    let api_handle = tokio::spawn(async move {
        if let Err(e) = start_api_server(api_state, &api_config, body_limit).await {
            error!(error = %e, "API server error");
        }
    });

    info!("Asset service started successfully");

    // Wait for shutdown signal
    shutdown_signal().await;

    info!("Shutting down asset service");

    api_handle.abort();

    // Replaces run detached from their requests; let them reach a commit
    if !coordinator.drain(SHUTDOWN_GRACE).await {
        warn!(
            in_flight = coordinator.in_flight(),
            "Stopping with replaces still running"
        );
    }

    info!("Asset service stopped");

    Ok(())
}

async fn init_metadata_store(config: &Config) -> Result<Arc<dyn AssetMetadataStore>> {
    match config.database.backend {
        DatabaseBackend::Postgres => {
            let store = PostgresMetadataStore::new(&config.database)
                .await
                .context("Failed to initialize metadata store")?;

            // Run migrations if enabled
            if config.database.run_migrations {
                store
                    .run_migrations()
                    .await
                    .context("Failed to run database migrations")?;
            }
            Ok(Arc::new(store))
        }
        DatabaseBackend::Memory => {
            warn!("Using in-memory metadata store; records are lost on restart");
            Ok(Arc::new(MemoryMetadataStore::new()))
        }
    }
}

async fn init_object_store(config: &Config) -> Result<Arc<dyn ObjectStore>> {
    match config.storage.backend {
        StorageBackend::S3 => {
            let store = S3ObjectStore::new(&config.storage)
                .await
                .context("Failed to initialize S3 object store")?;
            Ok(Arc::new(store))
        }
        StorageBackend::Memory => {
            warn!("Using in-memory object store; files are lost on restart");
            Ok(Arc::new(MemoryObjectStore::new(&config.storage.public_base())))
        }
    }
}

/// Initialize tracing/logging
fn init_tracing(log_level: &str) {
    let env_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(log_level));

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
        if let Err(e) = signal::ctrl_c().await {
            error!(error = %e, "Failed to listen for Ctrl+C");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
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
        _ = ctrl_c => {
            info!("Received Ctrl+C signal");
        }
        _ = terminate => {
            info!("Received SIGTERM signal");
        }
    }
}
