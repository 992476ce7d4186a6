//! recall - long-term memory daemon
//!
//! Opens the memory store, wires up the embedding and completion providers,
//! and runs periodic maintenance (optimization, embedding backfill and
//! clustering) until interrupted.

use std::net::SocketAddr;
use std::sync::Arc;

use metrics_exporter_prometheus::PrometheusBuilder;
use recall_core::db;
use recall_core::{Config, Error, MaintenanceWorker, MemoryService, Result, Summarizer};
use recall_embeddings::EmbeddingService;
use recall_llm::LlmService;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> Result<()> {
    let config = Config::from_env();

    init_tracing(config.telemetry.json_logs);

    if let Some(addr) = &config.telemetry.metrics_addr {
        install_metrics_exporter(addr)?;
        tracing::info!(%addr, "Prometheus exporter listening");
    }

    tracing::info!(database = %config.database.path, "Starting recall");

    let pool = db::init_pool(&config.database.path).await?;
    db::initialize_schema(&pool).await?;
    db::health_check(&pool).await?;

    let embeddings = EmbeddingService::from_config(&config.embedding)?;
    if !embeddings.has_providers() {
        tracing::warn!("No embedding provider configured; similarity uses lexical placeholders");
    }

    let summarizer = if config.llm.providers.is_empty() || !config.memory.summarization_enabled {
        tracing::info!("Summarization disabled");
        Summarizer::disabled()
    } else {
        let llm = LlmService::new(&config.llm)?;
        tracing::info!(providers = ?llm.providers(), "Summarization enabled");
        Summarizer::new(Arc::new(llm))
    };
    let summarizer = summarizer.with_threshold(config.memory.summarize_threshold);

    let memory = MemoryService::new(pool, Arc::new(embeddings), summarizer, config.memory.clone());

    let worker_handle = if config.maintenance.enabled {
        let worker = MaintenanceWorker::new(memory, config.maintenance.clone());
        Some(worker.start().await)
    } else {
        tracing::info!("Maintenance worker disabled");
        None
    };

    tracing::info!("recall is running, press Ctrl-C to stop");
    tokio::signal::ctrl_c().await?;
    tracing::info!("Shutting down");

    if let Some(handle) = worker_handle {
        handle.stop().await;
    }

    Ok(())
}

fn init_tracing(json: bool) {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| "recall=debug,recall_core=debug".into());

    let registry = tracing_subscriber::registry().with(filter);
    if json {
        registry.with(tracing_subscriber::fmt::layer().json()).init();
    } else {
        registry.with(tracing_subscriber::fmt::layer()).init();
    }
}

fn install_metrics_exporter(addr: &str) -> Result<()> {
    let addr: SocketAddr = addr
        .parse()
        .map_err(|e| Error::Config(format!("Invalid METRICS_ADDR {addr}: {e}")))?;

    PrometheusBuilder::new()
        .with_http_listener(addr)
        .install()
        .map_err(|e| Error::Config(format!("Failed to install Prometheus exporter: {e}")))
}
