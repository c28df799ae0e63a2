//! Command implementations for the disaster-watch daemon.
//!
//! Handles:
//! - start: Load config, open storage, serve HTTP, run scheduled ingestion
//! - ingest: One manual ingestion run
//! - similar: Local similarity query
//! - admin: Store statistics and maintenance

use std::fs;
use std::net::SocketAddr;
use std::path::Path;
use std::sync::{Arc, OnceLock};
use std::time::Duration;

use anyhow::{bail, Context, Result};
use tokio::signal;
use tracing::{info, warn};
use tracing_appender::non_blocking::WorkerGuard;
use tracing_appender::rolling::{RollingFileAppender, Rotation};
use tracing_subscriber::prelude::*;
use tracing_subscriber::{fmt, EnvFilter};

use disaster_embeddings::{build_embedder, EmbeddingModel};
use disaster_ingest::{
    last_report, DisasterClassifier, HttpImagerySource, HttpImagerySourceConfig, ImagerySource,
    IngestionPipeline, IngestionReport, MockClassifier, PipelineConfig, StaticImagerySource,
};
use disaster_scheduler::jobs::{create_ingestion_job, IngestionJobConfig};
use disaster_scheduler::{SchedulerConfig, SchedulerService};
use disaster_service::{
    run_server_with_shutdown, AppState, IngestRequest, IngestionTrigger, SimilarityQueryService,
};
use disaster_storage::{EventStore, RocksEventStore, StoreConfig};
use disaster_types::{ScoredEvent, Settings};

use crate::cli::AdminCommands;

/// Load configuration and apply CLI overrides (highest precedence).
pub fn load_settings(
    config_path: Option<&str>,
    db_path_override: Option<&str>,
    log_level_override: Option<&str>,
) -> Result<Settings> {
    let mut settings = Settings::load(config_path).context("Failed to load configuration")?;

    if let Some(db_path) = db_path_override {
        settings.db_path = db_path.to_string();
    }
    if let Some(log_level) = log_level_override {
        settings.log_level = log_level.to_string();
    }
    Ok(settings)
}

/// Install the global tracing subscriber.
///
/// `RUST_LOG` wins over the configured level. Output goes to stderr so
/// command results on stdout stay machine-readable.
pub fn init_logging(settings: &Settings) -> Result<()> {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(&settings.log_level));

    let file_layer = match settings.expanded_log_dir() {
        Some(dir) => {
            let (writer, guard) = tracing_appender::non_blocking(daily_log_appender(&dir)?);
            let _ = LOG_GUARD.set(guard);
            Some(fmt::layer().with_ansi(false).with_writer(writer))
        }
        None => None,
    };

    let subscriber = tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().with_writer(std::io::stderr))
        .with(file_layer);
    tracing::subscriber::set_global_default(subscriber)
        .context("Failed to set tracing subscriber")
}

/// Keeps the background log writer flushing until the process exits.
static LOG_GUARD: OnceLock<WorkerGuard> = OnceLock::new();

/// Appender writing `app.YYYY-MM-DD.log` under `dir`, one file per day.
pub fn daily_log_appender(dir: &Path) -> Result<RollingFileAppender> {
    fs::create_dir_all(dir)
        .with_context(|| format!("Failed to create log directory {}", dir.display()))?;
    RollingFileAppender::builder()
        .rotation(Rotation::DAILY)
        .filename_prefix("app")
        .filename_suffix("log")
        .build(dir)
        .with_context(|| format!("Failed to open log file in {}", dir.display()))
}

/// Open the event store, creating parent directories if needed.
pub fn open_store(settings: &Settings) -> Result<Arc<RocksEventStore>> {
    let db_path = settings.expanded_db_path();
    info!("Opening storage at {:?}", db_path);

    if let Some(parent) = db_path.parent() {
        fs::create_dir_all(parent).context("Failed to create database directory")?;
    }

    let store = RocksEventStore::open(&db_path, StoreConfig::from_settings(settings))
        .with_context(|| format!("Failed to open event store at {}", db_path.display()))?;
    Ok(Arc::new(store))
}

fn embedder(settings: &Settings) -> Result<Arc<dyn EmbeddingModel>> {
    build_embedder(&settings.embedding).context("Failed to initialize embedding model")
}

/// Imagery source for ingestion: a scene file when given, else the
/// configured provider. `None` when neither is available.
pub fn imagery_source(
    settings: &Settings,
    scene_file: Option<&str>,
) -> Result<Option<Arc<dyn ImagerySource>>> {
    if let Some(path) = scene_file {
        let source = StaticImagerySource::from_file(Path::new(path))
            .with_context(|| format!("Failed to load scene file {}", path))?;
        return Ok(Some(Arc::new(source)));
    }

    let timeout = Duration::from_secs(settings.request_timeout_secs);
    match HttpImagerySourceConfig::from_settings(&settings.ingestion, timeout) {
        Some(config) => {
            info!("Imagery provider: {}", config.base_url);
            let source =
                HttpImagerySource::new(config).context("Failed to build imagery client")?;
            Ok(Some(Arc::new(source)))
        }
        None => Ok(None),
    }
}

fn build_trigger(
    settings: &Settings,
    source: Arc<dyn ImagerySource>,
    embedder: Arc<dyn EmbeddingModel>,
    store: Arc<dyn EventStore>,
) -> Result<(Arc<IngestionPipeline>, IngestionTrigger)> {
    let config = PipelineConfig::from_settings(&settings.ingestion)
        .context("Invalid ingestion settings")?;
    let pipeline = Arc::new(
        IngestionPipeline::new(config, source, embedder, store)
            .context("Failed to build ingestion pipeline")?,
    );
    let region = settings
        .ingestion
        .region()
        .context("Invalid ingestion region")?;
    let trigger = IngestionTrigger::new(Arc::clone(&pipeline), region);
    Ok((pipeline, trigger))
}

/// Run one ingestion pass against the store and return its report.
pub async fn ingest_once(
    settings: &Settings,
    bbox: Option<String>,
    days: Option<u32>,
    scene_file: Option<&str>,
) -> Result<IngestionReport> {
    let Some(source) = imagery_source(settings, scene_file)? else {
        bail!("No imagery source: set ingestion.imagery_url or pass --scene-file");
    };
    let store = open_store(settings)?;
    let (_, trigger) = build_trigger(settings, source, embedder(settings)?, store.clone())?;

    let report = trigger
        .run(&IngestRequest { bbox, days })
        .await
        .context("Ingestion failed")?;
    store.flush().context("Failed to flush event store")?;
    Ok(report)
}

/// Rank stored events against a description; embeddings are stripped.
pub async fn similar_once(
    settings: &Settings,
    description: &str,
    top_k: Option<usize>,
) -> Result<Vec<ScoredEvent>> {
    let store = open_store(settings)?;
    let query = SimilarityQueryService::new(
        embedder(settings)?,
        store,
        top_k.unwrap_or(settings.query.top_k),
    )
    .context("Failed to build query service")?;

    let mut ranked = query
        .find_similar(description)
        .await
        .context("Similarity query failed")?;
    for scored in &mut ranked {
        scored.event.embedding = None;
    }
    Ok(ranked)
}

/// Execute an admin command and return its printable output.
pub fn admin_output(settings: &Settings, command: &AdminCommands) -> Result<String> {
    let store = open_store(settings)?;

    match command {
        AdminCommands::Stats => {
            let stats = store.stats().context("Failed to read store statistics")?;
            let index = &stats.index;
            Ok(format!(
                "Database: {}\n\
                 Events:          {}\n\
                 Embedded:        {}\n\
                 Dimension:       {}\n\
                 Index:           {} ({} vectors, {})\n\
                 Index size:      {} bytes\n\
                 Disk usage:      {} bytes",
                settings.expanded_db_path().display(),
                stats.event_count,
                stats.embedded_count,
                stats.dimension,
                index.kind,
                index.vector_count,
                if index.available { "available" } else { "unavailable" },
                index.size_bytes,
                stats.disk_usage_bytes,
            ))
        }
        AdminCommands::RebuildIndex => {
            let count = store
                .rebuild_index()
                .context("Failed to rebuild vector index")?;
            store.flush().context("Failed to flush event store")?;
            Ok(format!("Rebuilt vector index with {} vectors", count))
        }
        AdminCommands::Compact => {
            store.compact().context("Compaction failed")?;
            Ok("Compaction complete".to_string())
        }
        AdminCommands::LastRun => match last_report(store.as_ref())
            .context("Failed to read last ingestion report")?
        {
            Some(report) => Ok(serde_json::to_string_pretty(&report)?),
            None => Ok("No ingestion run recorded".to_string()),
        },
    }
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            warn!("Failed to install Ctrl+C handler: {}", e);
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
                warn!("Failed to install SIGTERM handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            info!("Received Ctrl+C, shutting down...");
        }
        _ = terminate => {
            info!("Received SIGTERM, shutting down...");
        }
    }
}

/// Start the disaster-watch daemon.
///
/// 1. Load configuration (defaults -> file -> env -> CLI)
/// 2. Open RocksDB storage and the embedding model
/// 3. Register the ingestion job unless disabled
/// 4. Serve HTTP until SIGINT/SIGTERM, then stop the scheduler and flush
pub async fn start_daemon(
    config_path: Option<&str>,
    port_override: Option<u16>,
    db_path_override: Option<&str>,
    log_level_override: Option<&str>,
    no_scheduler: bool,
) -> Result<()> {
    let mut settings = load_settings(config_path, db_path_override, log_level_override)?;
    if let Some(port) = port_override {
        settings.http_port = port;
    }

    init_logging(&settings)?;

    info!("Disaster-watch daemon starting...");
    info!("Configuration:");
    info!("  Database path: {}", settings.db_path);
    info!("  HTTP address: {}", settings.http_addr());
    info!("  Embedding: {:?} ({} dims)", settings.embedding.provider, settings.embedding.dimension);
    info!("  Log level: {}", settings.log_level);

    let store = open_store(&settings)?;
    let embedder = embedder(&settings)?;
    let classifier: Arc<dyn DisasterClassifier> = Arc::new(MockClassifier::new());

    let mut state = AppState::new(store.clone(), Arc::clone(&embedder), classifier, &settings)
        .context("Failed to build application state")?;

    let mut scheduler = None;
    match imagery_source(&settings, None)? {
        Some(source) => {
            let (pipeline, trigger) =
                build_trigger(&settings, source, Arc::clone(&embedder), store.clone())?;
            state = state.with_ingestion(trigger);

            if settings.ingestion.enabled && !no_scheduler {
                let service = SchedulerService::new(SchedulerConfig::from_settings(
                    &settings.ingestion,
                ))
                .await
                .context("Failed to create scheduler")?;
                let region = settings
                    .ingestion
                    .region()
                    .context("Invalid ingestion region")?;
                create_ingestion_job(
                    &service,
                    pipeline,
                    region,
                    IngestionJobConfig::from_settings(&settings.ingestion),
                )
                .await
                .context("Failed to register ingestion job")?;
                service.start().await.context("Failed to start scheduler")?;

                state = state.with_jobs(service.registry());
                scheduler = Some(service);
            } else {
                info!("Scheduled ingestion disabled");
            }
        }
        None => warn!("No imagery provider configured; ingestion endpoints are disabled"),
    }

    let addr: SocketAddr = settings
        .http_addr()
        .parse()
        .context("Invalid HTTP address")?;
    let timeout = Duration::from_secs(settings.request_timeout_secs);

    let result = run_server_with_shutdown(addr, state, timeout, shutdown_signal()).await;

    if let Some(service) = scheduler {
        if let Err(e) = service.shutdown().await {
            warn!("Scheduler shutdown failed: {}", e);
        }
    }
    if let Err(e) = store.flush() {
        warn!("Failed to flush event store: {}", e);
    }

    result.map_err(|e| anyhow::anyhow!("Server error: {}", e))
}

/// `ingest`: one manual run, report printed as JSON.
pub async fn run_ingest(
    config_path: Option<&str>,
    db_path_override: Option<&str>,
    log_level_override: Option<&str>,
    bbox: Option<String>,
    days: Option<u32>,
    scene_file: Option<&str>,
) -> Result<()> {
    let settings = load_settings(config_path, db_path_override, log_level_override)?;
    init_logging(&settings)?;

    let report = ingest_once(&settings, bbox, days, scene_file).await?;
    println!("{}", serde_json::to_string_pretty(&report)?);
    if report.is_partial() {
        warn!(
            skipped = report.skipped,
            failed = report.failed,
            "Ingestion completed with dropped regions"
        );
    }
    Ok(())
}

/// `similar`: ranked matches printed as JSON.
pub async fn run_similar(
    config_path: Option<&str>,
    db_path_override: Option<&str>,
    log_level_override: Option<&str>,
    description: &str,
    top_k: Option<usize>,
) -> Result<()> {
    let settings = load_settings(config_path, db_path_override, log_level_override)?;
    init_logging(&settings)?;

    let ranked = similar_once(&settings, description, top_k).await?;
    println!("{}", serde_json::to_string_pretty(&ranked)?);
    Ok(())
}

/// `admin`: operates on the store directly; the daemon must not hold it open.
pub fn handle_admin(
    config_path: Option<&str>,
    db_path_override: Option<&str>,
    log_level_override: Option<&str>,
    command: AdminCommands,
) -> Result<()> {
    let settings = load_settings(config_path, db_path_override, log_level_override)?;
    init_logging(&settings)?;

    println!("{}", admin_output(&settings, &command)?);
    Ok(())
}
