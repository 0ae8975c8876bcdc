//! CLI binary for pdfmill.
//!
//! Two modes over the same engine: `serve` runs the HTTP service, `convert`
//! drives one file through the pipeline and exits.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use pdfmill::server::{self, AppState};
use pdfmill::store::{MemoryStore, RedisStore, TaskStore};
use pdfmill::{config, processor, EngineConfig, LlmConfig, TaskManager};

#[derive(Parser)]
#[command(name = "pdfmill", version, about = "Shard PDFs through an LLM OCR backend into Markdown")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Run the HTTP service.
    Serve {
        /// Address to bind.
        #[arg(long, default_value = "0.0.0.0", env = "HOST")]
        host: String,

        /// Port to listen on.
        #[arg(long, default_value_t = 8080, env = "PORT")]
        port: u16,

        /// Concurrent shard workers.
        #[arg(long, default_value_t = 3)]
        workers: usize,

        /// Root directory for per-task work dirs.
        #[arg(long, default_value = "output")]
        output_root: PathBuf,

        /// Directory for uploaded PDFs.
        #[arg(long, default_value = "uploads")]
        uploads_dir: PathBuf,
    },

    /// Convert a single PDF and exit.
    Convert {
        /// Path to the PDF.
        pdf: PathBuf,

        /// Concurrent shard workers.
        #[arg(long, default_value_t = 3)]
        workers: usize,

        /// Copy the aggregated Markdown here when done.
        #[arg(long)]
        output: Option<PathBuf>,

        /// Give up waiting after this many seconds.
        #[arg(long, default_value_t = 300)]
        timeout: u64,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenv::dotenv().ok();
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    match Cli::parse().command {
        Command::Serve {
            host,
            port,
            workers,
            output_root,
            uploads_dir,
        } => serve(host, port, workers, output_root, uploads_dir).await,
        Command::Convert {
            pdf,
            workers,
            output,
            timeout,
        } => convert(pdf, workers, output, timeout).await,
    }
}

async fn serve(
    host: String,
    port: u16,
    workers: usize,
    output_root: PathBuf,
    uploads_dir: PathBuf,
) -> Result<()> {
    let cfg = EngineConfig {
        worker_count: workers,
        output_root,
        ..EngineConfig::default()
    };
    let llm = LlmConfig::from_env()?;
    let processor = processor::from_config(&llm, &cfg.output_root);
    let store = build_store(cfg.record_ttl).await;

    let manager = Arc::new(TaskManager::new(cfg, processor, Some(store)));
    manager.start().await;

    tokio::fs::create_dir_all(&uploads_dir)
        .await
        .with_context(|| format!("creating uploads dir {}", uploads_dir.display()))?;
    let app = server::router(AppState {
        manager: Arc::clone(&manager),
        uploads_dir,
    });

    let listener = tokio::net::TcpListener::bind((host.as_str(), port))
        .await
        .with_context(|| format!("binding {host}:{port}"))?;
    info!(%host, port, "pdfmill listening");

    axum::serve(listener, app)
        .with_graceful_shutdown(async {
            let _ = tokio::signal::ctrl_c().await;
            info!("shutdown signal received");
        })
        .await?;

    manager.shutdown().await;
    Ok(())
}

async fn convert(
    pdf: PathBuf,
    workers: usize,
    output: Option<PathBuf>,
    timeout: u64,
) -> Result<()> {
    let cfg = EngineConfig {
        worker_count: workers,
        ..EngineConfig::default()
    };
    let llm = LlmConfig::from_env()?;
    let processor = processor::from_config(&llm, &cfg.output_root);

    let manager = Arc::new(TaskManager::new(cfg, processor, None));
    manager.start().await;

    let id = manager.create(&pdf).await?;
    info!(task = %id, "task created");
    manager.submit(&id, Duration::from_secs(10)).await?;
    manager.wait(&id, Duration::from_secs(timeout)).await?;

    let view = manager
        .get(&id)
        .await
        .context("task vanished while waiting")?;
    if !view.failed_shards.is_empty() {
        warn!(failed = view.failed_shards.len(), "some shards failed; markers left in output");
    }
    println!("{}", view.output_path.display());

    if let Some(dest) = output {
        tokio::fs::copy(&view.output_path, &dest)
            .await
            .with_context(|| format!("copying result to {}", dest.display()))?;
        info!(dest = %dest.display(), "result copied");
    }

    manager.shutdown().await;
    Ok(())
}

/// Prefer Redis; run on the in-memory store when it is unreachable.
async fn build_store(ttl: Duration) -> Arc<dyn TaskStore> {
    let addr = config::redis_address();
    match RedisStore::connect(&addr, ttl).await {
        Ok(store) => {
            info!(%addr, "task records persisted to redis");
            Arc::new(store)
        }
        Err(e) => {
            warn!(%addr, error = %e, "redis unreachable, keeping task records in memory");
            Arc::new(MemoryStore::new(ttl))
        }
    }
}
