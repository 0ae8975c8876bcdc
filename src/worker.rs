//! Bounded worker pool executing shard jobs against the LLM backend.
//!
//! Shards enter through a bounded queue (submit blocks up to the caller's
//! timeout when it is full), a fixed set of workers drains the queue, and a
//! completion signal per shard leaves through a bounded result channel with
//! a single consumer on the other end.
//!
//! Shutdown closes the queue first and lets workers finish what they hold:
//! a partially written scratch file is recoverable, a killed one is not.
//! The pool's cancellation token is the parent context for processor calls;
//! it is NOT cancelled by shutdown.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use tokio::io::AsyncWriteExt;
use tokio::sync::mpsc::error::SendTimeoutError;
use tokio::sync::{mpsc, Mutex};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::config::EngineConfig;
use crate::error::OcrError;
use crate::postprocess;
use crate::processor::PdfProcessor;

/// Retry ceiling applied when a job arrives with `max_retries == 0`.
pub const DEFAULT_MAX_RETRIES: u32 = 3;

/// One shard of a parent task, as the pool sees it.
#[derive(Debug, Clone)]
pub struct ShardJob {
    pub id: String,
    pub parent_id: String,
    /// Shard PDF produced by the splitter.
    pub pdf_path: PathBuf,
    /// Scratch file the worker writes the Markdown to.
    pub output_path: PathBuf,
    pub page_start: usize,
    pub page_end: usize,
    pub max_retries: u32,
}

/// What a worker reports back when it is done with a shard.
#[derive(Debug, Clone)]
pub struct CompletionSignal {
    pub shard_id: String,
    pub parent_id: String,
    pub success: bool,
    pub error: Option<String>,
    /// Retries consumed before the outcome (0 on first-attempt success).
    pub retries: u32,
}

/// Fixed-size worker pool over a bounded shard queue.
pub struct WorkerPool {
    processor: Arc<dyn PdfProcessor>,
    cancel: CancellationToken,
    worker_count: usize,
    max_retries: u32,
    backoff: Duration,
    backoff_cap: Duration,
    job_tx: Mutex<Option<mpsc::Sender<ShardJob>>>,
    job_rx: Mutex<Option<mpsc::Receiver<ShardJob>>>,
    result_tx: Mutex<Option<mpsc::Sender<CompletionSignal>>>,
    result_rx: Mutex<Option<mpsc::Receiver<CompletionSignal>>>,
    workers: Mutex<Vec<JoinHandle<()>>>,
}

impl WorkerPool {
    pub fn new(cfg: &EngineConfig, processor: Arc<dyn PdfProcessor>) -> Self {
        let (job_tx, job_rx) = mpsc::channel(cfg.queue_capacity);
        let (result_tx, result_rx) = mpsc::channel(cfg.result_capacity);
        Self {
            processor,
            cancel: CancellationToken::new(),
            worker_count: cfg.worker_count,
            max_retries: cfg.max_retries,
            backoff: cfg.retry_backoff,
            backoff_cap: cfg.retry_backoff_cap,
            job_tx: Mutex::new(Some(job_tx)),
            job_rx: Mutex::new(Some(job_rx)),
            result_tx: Mutex::new(Some(result_tx)),
            result_rx: Mutex::new(Some(result_rx)),
            workers: Mutex::new(Vec::new()),
        }
    }

    /// Token cancelling in-flight processor calls. Held by the pool for its
    /// whole life; per-shard cancellation is intentionally not plumbed.
    pub fn cancel_token(&self) -> &CancellationToken {
        &self.cancel
    }

    /// Take the completion-signal receiver. The single consumer calls this
    /// once, before or after `start`.
    pub async fn take_results(&self) -> Option<mpsc::Receiver<CompletionSignal>> {
        self.result_rx.lock().await.take()
    }

    /// Spawn the workers. Idempotent: a second call is a no-op.
    pub async fn start(&self) {
        let Some(job_rx) = self.job_rx.lock().await.take() else {
            warn!("worker pool already started");
            return;
        };
        // Workers hold the only sender clones; the result channel closes
        // exactly when the last worker exits.
        let Some(result_tx) = self.result_tx.lock().await.take() else {
            warn!("worker pool already started");
            return;
        };

        let shared_rx = Arc::new(Mutex::new(job_rx));
        let mut workers = self.workers.lock().await;
        for worker in 0..self.worker_count {
            let jobs = Arc::clone(&shared_rx);
            let results = result_tx.clone();
            let processor = Arc::clone(&self.processor);
            let cancel = self.cancel.clone();
            let max_retries = self.max_retries;
            let backoff = self.backoff;
            let backoff_cap = self.backoff_cap;
            workers.push(tokio::spawn(async move {
                worker_loop(
                    worker, jobs, results, processor, cancel, max_retries, backoff, backoff_cap,
                )
                .await;
            }));
        }
        debug!(workers = self.worker_count, "worker pool started");
    }

    /// Enqueue one shard, waiting at most `timeout` for a queue slot.
    pub async fn submit(&self, job: ShardJob, timeout: Duration) -> Result<(), OcrError> {
        let sender = self
            .job_tx
            .lock()
            .await
            .clone()
            .ok_or(OcrError::PoolClosed)?;
        match sender.send_timeout(job, timeout).await {
            Ok(()) => Ok(()),
            Err(SendTimeoutError::Timeout(job)) => Err(OcrError::QueueFull {
                shard_id: job.id,
                timeout,
            }),
            Err(SendTimeoutError::Closed(_)) => Err(OcrError::PoolClosed),
        }
    }

    /// Close the shard queue, let the workers drain it, and wait for them.
    ///
    /// After this returns the result channel is closed (all sender clones
    /// are gone) and the pool accepts no further submissions.
    pub async fn shutdown(&self) {
        drop(self.job_tx.lock().await.take());
        let workers = std::mem::take(&mut *self.workers.lock().await);
        for handle in workers {
            if let Err(e) = handle.await {
                warn!(error = %e, "worker task aborted");
            }
        }
        debug!("worker pool drained");
    }
}

#[allow(clippy::too_many_arguments)]
async fn worker_loop(
    worker: usize,
    jobs: Arc<Mutex<mpsc::Receiver<ShardJob>>>,
    results: mpsc::Sender<CompletionSignal>,
    processor: Arc<dyn PdfProcessor>,
    cancel: CancellationToken,
    max_retries: u32,
    backoff: Duration,
    backoff_cap: Duration,
) {
    loop {
        // Serialise the recv, not the processing: the guard drops as soon
        // as a job (or queue closure) is observed.
        let job = { jobs.lock().await.recv().await };
        let Some(job) = job else { break };

        debug!(
            worker,
            shard = %job.id,
            page_start = job.page_start,
            page_end = job.page_end,
            "processing shard"
        );
        let signal = execute(&*processor, &cancel, max_retries, backoff, backoff_cap, job).await;
        if results.send(signal).await.is_err() {
            warn!(worker, "result channel closed, dropping completion signal");
        }
    }
    debug!(worker, "worker exiting");
}

/// Run one shard to a terminal outcome. Never propagates an error: every
/// failure mode ends in a `success = false` signal.
async fn execute(
    processor: &dyn PdfProcessor,
    cancel: &CancellationToken,
    pool_max_retries: u32,
    backoff: Duration,
    backoff_cap: Duration,
    job: ShardJob,
) -> CompletionSignal {
    let max_retries = if job.max_retries == 0 {
        pool_max_retries.max(1)
    } else {
        job.max_retries
    };

    let mut last_error = String::new();
    for attempt in 0..max_retries {
        match processor.process_pdf(cancel, &job.pdf_path).await {
            Ok(markdown) => {
                return match write_scratch(&job, &markdown).await {
                    Ok(()) => signal(&job, true, None, attempt),
                    Err(e) => signal(&job, false, Some(e.to_string()), attempt),
                };
            }
            Err(e) => {
                warn!(
                    shard = %job.id,
                    attempt = attempt + 1,
                    max_retries,
                    error = %e,
                    "shard attempt failed"
                );
                last_error = e.to_string();
                if attempt + 1 < max_retries {
                    tokio::time::sleep(backoff_duration(backoff, backoff_cap, attempt)).await;
                }
            }
        }
    }
    signal(&job, false, Some(last_error), max_retries)
}

/// Exponential backoff for the sleep after failed attempt `attempt`
/// (0-based): `base * 2^attempt`, capped.
fn backoff_duration(base: Duration, cap: Duration, attempt: u32) -> Duration {
    base.saturating_mul(1u32 << attempt.min(16)).min(cap)
}

async fn write_scratch(job: &ShardJob, markdown: &str) -> Result<(), OcrError> {
    if let Some(parent) = job.output_path.parent() {
        tokio::fs::create_dir_all(parent)
            .await
            .map_err(|e| OcrError::io(parent, e))?;
    }
    let mut file = tokio::fs::OpenOptions::new()
        .append(true)
        .create(true)
        .open(&job.output_path)
        .await
        .map_err(|e| OcrError::io(&job.output_path, e))?;
    file.write_all(postprocess::strip_wrapping_fence(markdown).as_bytes())
        .await
        .map_err(|e| OcrError::io(&job.output_path, e))?;
    file.flush()
        .await
        .map_err(|e| OcrError::io(&job.output_path, e))?;
    Ok(())
}

fn signal(job: &ShardJob, success: bool, error: Option<String>, retries: u32) -> CompletionSignal {
    CompletionSignal {
        shard_id: job.id.clone(),
        parent_id: job.parent_id.clone(),
        success,
        error,
        retries,
    }
}
