use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use clap::{Parser, Subcommand};
use common::config::StorageBackend;
use common::storage::BlobStore;
use common::storage::filesystem::FilesystemBlobStore;
use common::storage::memory::MemoryBlobStore;
use common::storage::s3::S3BlobStore;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use submission_server::cleanup::{Reconciler, run_cleanup_scheduler};
use submission_server::config::AppConfig;
use submission_server::metadata::{MemoryMetadataStore, MetadataStore, SqlMetadataStore};
use submission_server::state::AppState;
use submission_server::{build_router, database};

#[derive(Parser)]
#[command(name = "submission-server", about = "Media submission server")]
struct Cli {
    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand)]
enum Command {
    /// Serve the HTTP API (default).
    Serve,
    /// Run one cleanup sweep and exit.
    Sweep,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_target(false)
        .init();

    let cli = Cli::parse();
    let config = AppConfig::load().context("Failed to load config")?;

    let blobs = init_blob_store(&config).await?;
    let metadata = init_metadata_store(&config).await?;
    let reconciler = Reconciler::new(
        blobs.clone(),
        metadata.clone(),
        config.cleanup.concurrency,
    );

    match cli.command.unwrap_or(Command::Serve) {
        Command::Sweep => {
            let report = reconciler.sweep().await.context("Cleanup sweep failed")?;
            info!(removed = report.removed, retained = report.retained, "Sweep complete");
            Ok(())
        }
        Command::Serve => serve(config, blobs, metadata, reconciler).await,
    }
}

async fn serve(
    config: AppConfig,
    blobs: Arc<dyn BlobStore>,
    metadata: Arc<dyn MetadataStore>,
    reconciler: Reconciler,
) -> anyhow::Result<()> {
    let shutdown = CancellationToken::new();

    let scheduler = if config.cleanup.enabled {
        Some(tokio::spawn(run_cleanup_scheduler(
            reconciler,
            Duration::from_secs(config.cleanup.interval_secs.max(1)),
            shutdown.clone(),
        )))
    } else {
        warn!("Cleanup scheduler disabled; soft-deleted submissions will not be purged");
        None
    };

    let addr: SocketAddr = format!("{}:{}", config.server.host, config.server.port)
        .parse()
        .context("Invalid server address")?;
    let app = build_router(AppState::new(config, blobs, metadata));

    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("Failed to bind {addr}"))?;
    info!("Server running at http://{}", addr);

    let signal = shutdown.clone();
    axum::serve(listener, app)
        .with_graceful_shutdown(async move {
            if let Err(e) = tokio::signal::ctrl_c().await {
                warn!(error = %e, "Failed to listen for shutdown signal");
            }
            signal.cancel();
        })
        .await
        .context("Server error")?;

    shutdown.cancel();
    if let Some(handle) = scheduler {
        let _ = handle.await;
    }
    Ok(())
}

async fn init_blob_store(config: &AppConfig) -> anyhow::Result<Arc<dyn BlobStore>> {
    let max_size = config.upload.max_file_size;
    let store: Arc<dyn BlobStore> = match config.storage.backend {
        StorageBackend::Filesystem => Arc::new(
            FilesystemBlobStore::new(config.storage.path.clone().into(), max_size)
                .await
                .with_context(|| format!("Failed to open blob store at {}", config.storage.path))?,
        ),
        StorageBackend::Memory => {
            warn!("Using in-memory blob store; files are lost on restart");
            Arc::new(MemoryBlobStore::new())
        }
        StorageBackend::S3 => {
            let s3 = config
                .storage
                .s3
                .as_ref()
                .context("storage.s3 must be set when storage.backend = \"s3\"")?;
            Arc::new(S3BlobStore::new(s3, max_size).context("Failed to configure S3 bucket")?)
        }
    };
    info!(backend = ?config.storage.backend, "Blob store ready");
    Ok(store)
}

async fn init_metadata_store(config: &AppConfig) -> anyhow::Result<Arc<dyn MetadataStore>> {
    match &config.database.url {
        Some(url) => {
            let db = database::init_db(url)
                .await
                .context("Failed to connect to database")?;
            info!("Database connected");
            Ok(Arc::new(SqlMetadataStore::new(db)))
        }
        None => {
            warn!("No database.url configured; using in-memory metadata store");
            Ok(Arc::new(MemoryMetadataStore::new()))
        }
    }
}
