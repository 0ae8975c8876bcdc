//! # pdfmill
//!
//! Turn large PDFs into Markdown by sharding them across an OCR-capable
//! LLM backend.
//!
//! A single LLM request over a long document is slow, expensive to retry,
//! and fails as a unit. pdfmill instead splits the upload into small
//! page-range shards, runs them concurrently through a bounded worker pool
//! with per-shard retry, and stitches the results back together in page
//! order, exactly once, under a task id.
//!
//! ## Pipeline Overview
//!
//! ```text
//! PDF upload
//!  │
//!  ├─ 1. Create    count pages, derive the shard catalog, split (lopdf)
//!  ├─ 2. Submit    bounded enqueue of every shard into the worker pool
//!  ├─ 3. Workers   process_pdf() against the backend, retry with backoff,
//!  │               write per-shard scratch Markdown
//!  ├─ 4. Consume   single loop applies completion signals to the parent
//!  ├─ 5. Aggregate once-only stitch in page order, failure markers for
//!  │               shards that exhausted their retries
//!  └─ 6. Persist   TaskRecord into the TTL record store
//! ```
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use std::time::Duration;
//! use pdfmill::{processor, EngineConfig, LlmConfig, TaskManager};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let cfg = EngineConfig::default();
//!     let llm = LlmConfig::from_env()?;
//!     let processor = processor::from_config(&llm, &cfg.output_root);
//!
//!     let manager = Arc::new(TaskManager::new(cfg, processor, None));
//!     manager.start().await;
//!
//!     let id = manager.create("document.pdf".as_ref()).await?;
//!     manager.submit(&id, Duration::from_secs(5)).await?;
//!     manager.wait(&id, Duration::from_secs(300)).await?;
//!     if let Some(view) = manager.get(&id).await {
//!         println!("result at {}", view.output_path.display());
//!     }
//!     manager.shutdown().await;
//!     Ok(())
//! }
//! ```
//!
//! Backends are pluggable through the [`processor::PdfProcessor`] trait;
//! the crate ships a Gemini adapter (shard bytes inlined into a multimodal
//! request) and a MinerU adapter (shard published by URL, remote task
//! polled to completion).

// ── Modules ──────────────────────────────────────────────────────────────

pub mod config;
pub mod error;
pub mod keystore;
pub mod postprocess;
pub mod processor;
pub mod prompts;
pub mod server;
pub mod split;
pub mod store;
pub mod task;
pub mod worker;

// ── Re-exports ───────────────────────────────────────────────────────────

pub use config::{EngineConfig, LlmConfig, Provider};
pub use error::OcrError;
pub use processor::PdfProcessor;
pub use store::{MemoryStore, RedisStore, StoreError, TaskRecord, TaskStore};
pub use task::{ParentTask, ShardMeta, ShardStatus, TaskManager, TaskStatus, TaskView};
pub use worker::{CompletionSignal, ShardJob, WorkerPool};
