//! Task manager: parent-task lifecycle, pool submission, the completion
//! consumer, and post-completion persistence.

use std::collections::HashMap;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{mpsc, Mutex, RwLock};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use crate::config::EngineConfig;
use crate::error::OcrError;
use crate::processor::PdfProcessor;
use crate::split;
use crate::store::TaskStore;
use crate::task::parent::{ParentTask, ShardMeta, ShardStatus, TaskStatus, TaskView};
use crate::worker::{CompletionSignal, WorkerPool};

/// Owns the worker pool, the in-memory parent-task index, the completion
/// consumer, and the record-store writer.
pub struct TaskManager {
    cfg: EngineConfig,
    pool: WorkerPool,
    /// Shared with the consumer task, which outlives any one call site.
    inner: Arc<Inner>,
    consumer: Mutex<Option<JoinHandle<()>>>,
}

struct Inner {
    tasks: RwLock<HashMap<String, Arc<ParentTask>>>,
    store: Option<Arc<dyn TaskStore>>,
    stop: CancellationToken,
}

impl TaskManager {
    pub fn new(
        cfg: EngineConfig,
        processor: Arc<dyn PdfProcessor>,
        store: Option<Arc<dyn TaskStore>>,
    ) -> Self {
        let pool = WorkerPool::new(&cfg, processor);
        Self {
            cfg,
            pool,
            inner: Arc::new(Inner {
                tasks: RwLock::new(HashMap::new()),
                store,
                stop: CancellationToken::new(),
            }),
            consumer: Mutex::new(None),
        }
    }

    pub fn config(&self) -> &EngineConfig {
        &self.cfg
    }

    /// Spawn the worker pool and the single completion consumer.
    pub async fn start(&self) {
        let Some(results) = self.pool.take_results().await else {
            warn!("task manager already started");
            return;
        };
        self.pool.start().await;
        let inner = Arc::clone(&self.inner);
        let handle = tokio::spawn(async move { inner.consume(results).await });
        *self.consumer.lock().await = Some(handle);
        info!(workers = self.cfg.worker_count, "task manager started");
    }

    /// Stop the consumer, then drain and join the pool.
    pub async fn shutdown(&self) {
        self.inner.stop.cancel();
        if let Some(handle) = self.consumer.lock().await.take() {
            if let Err(e) = handle.await {
                warn!(error = %e, "completion consumer aborted");
            }
        }
        self.pool.shutdown().await;
        info!("task manager stopped");
    }

    /// Register a new parent task for the PDF at `pdf_path`: count pages,
    /// derive the shard catalog, split the document, insert into the index.
    ///
    /// The task is created `Pending`; nothing is enqueued until
    /// [`submit`](Self::submit).
    pub async fn create(&self, pdf_path: &Path) -> Result<String, OcrError> {
        let pages = {
            let path = pdf_path.to_path_buf();
            run_blocking(move || split::page_count(&path)).await?
        };
        if pages == 0 {
            return Err(OcrError::EmptyDocument {
                path: pdf_path.to_path_buf(),
            });
        }
        if pages >= self.cfg.max_pages {
            return Err(OcrError::TooManyPages {
                path: pdf_path.to_path_buf(),
                pages,
                limit: self.cfg.max_pages,
            });
        }

        let id = Uuid::new_v4().to_string();
        let work_dir = self.cfg.output_root.join(&id);
        tokio::fs::create_dir_all(&work_dir)
            .await
            .map_err(|e| OcrError::io(&work_dir, e))?;

        let span = self.cfg.span;
        let total_shards = pages.div_ceil(span);
        let stem = split::file_stem(pdf_path);
        let mut shards = HashMap::new();
        for index in 0..total_shards {
            let page_start = index * span + 1;
            let page_end = ((index + 1) * span).min(pages);
            let shard_id = format!("{id}_{}", index + 1);
            shards.insert(
                shard_id.clone(),
                ShardMeta {
                    id: shard_id,
                    page_start,
                    page_end,
                    split_pdf_path: work_dir
                        .join(split::shard_file_name(&stem, page_start, page_end)),
                    temp_md_path: work_dir.join(format!("page_{}.md", index + 1)),
                    status: ShardStatus::Pending,
                    error: None,
                },
            );
        }

        // The splitter derives the same names from the same ranges, so the
        // catalog above always matches what lands on disk.
        {
            let path = pdf_path.to_path_buf();
            let dir = work_dir.clone();
            run_blocking(move || split::split_document(&path, &dir, span)).await?;
        }

        let parent = Arc::new(ParentTask::new(
            id.clone(),
            pdf_path.to_path_buf(),
            work_dir,
            pages,
            shards,
        ));
        self.inner.tasks.write().await.insert(id.clone(), parent);
        info!(task = %id, pages, shards = total_shards, "task created");
        Ok(id)
    }

    /// Enqueue every shard of `id` into the pool, waiting at most `timeout`
    /// per shard for a queue slot.
    ///
    /// Not idempotent: on a queue-full error the shards enqueued so far stay
    /// in the pool and the task must be considered fatally un-submitted.
    pub async fn submit(&self, id: &str, timeout: Duration) -> Result<(), OcrError> {
        let parent = self
            .inner
            .lookup(id)
            .await
            .ok_or_else(|| OcrError::UnknownTask { id: id.to_string() })?;

        parent.set_status(TaskStatus::Processing);
        for job in parent.jobs(self.cfg.max_retries) {
            let shard_id = job.id.clone();
            self.pool.submit(job, timeout).await?;
            parent.mark_shard_processing(&shard_id);
        }
        debug!(task = %id, "all shards enqueued");
        Ok(())
    }

    /// Snapshot of a task: the live parent if present, otherwise the
    /// persisted record (shard detail empty).
    pub async fn get(&self, id: &str) -> Option<TaskView> {
        if let Some(parent) = self.inner.lookup(id).await {
            return Some(parent.view());
        }
        let store = self.inner.store.as_ref()?;
        match store.get(id).await {
            Ok(record) => Some(TaskView::from_record(&record)),
            Err(e) => {
                if !e.is_not_found() {
                    error!(task = %id, error = %e, "record store lookup failed");
                }
                None
            }
        }
    }

    /// Block until the task reaches a terminal status or `timeout` elapses.
    /// Observer only: the deadline does not cancel the underlying work.
    pub async fn wait(&self, id: &str, timeout: Duration) -> Result<(), OcrError> {
        let deadline = tokio::time::Instant::now() + timeout;
        let mut tick = tokio::time::interval(Duration::from_millis(100));
        loop {
            tick.tick().await;
            let parent = self
                .inner
                .lookup(id)
                .await
                .ok_or_else(|| OcrError::UnknownTask { id: id.to_string() })?;
            if matches!(parent.status(), TaskStatus::Completed | TaskStatus::Failed) {
                return Ok(());
            }
            if tokio::time::Instant::now() >= deadline {
                return Err(OcrError::WaitTimeout {
                    id: id.to_string(),
                    deadline: timeout,
                });
            }
        }
    }

    /// Drop a task from the in-memory index. Its persisted record, if any,
    /// remains readable through [`get`](Self::get).
    pub async fn evict(&self, id: &str) -> bool {
        self.inner.tasks.write().await.remove(id).is_some()
    }

    #[cfg(test)]
    async fn lookup(&self, id: &str) -> Option<Arc<ParentTask>> {
        self.inner.lookup(id).await
    }
}

impl Inner {
    async fn lookup(&self, id: &str) -> Option<Arc<ParentTask>> {
        self.tasks.read().await.get(id).cloned()
    }

    /// Single consumer of the pool's completion signals.
    async fn consume(self: Arc<Self>, mut results: mpsc::Receiver<CompletionSignal>) {
        loop {
            tokio::select! {
                _ = self.stop.cancelled() => {
                    debug!("completion consumer stopping");
                    break;
                }
                signal = results.recv() => {
                    let Some(signal) = signal else { break };
                    self.handle_signal(signal).await;
                }
            }
        }
    }

    async fn handle_signal(&self, signal: CompletionSignal) {
        let Some(parent) = self.lookup(&signal.parent_id).await else {
            // A signal for an unknown parent is a protocol error; the loop
            // must survive it.
            warn!(
                parent = %signal.parent_id,
                shard = %signal.shard_id,
                "completion signal for unknown task"
            );
            return;
        };

        debug!(
            task = %parent.id,
            shard = %signal.shard_id,
            success = signal.success,
            retries = signal.retries,
            "shard reported"
        );
        if parent.apply_signal(&signal) {
            // Aggregation happens on its own task; the latch inside the
            // parent keeps it at-most-once no matter how many triggers race.
            let store = self.store.clone();
            tokio::spawn(async move {
                match parent.aggregate().await {
                    Ok(true) => {
                        if let Some(store) = store {
                            let record = parent.record();
                            if let Err(e) = store.save(&record).await {
                                error!(task = %parent.id, error = %e, "failed to persist task record");
                            }
                        }
                    }
                    Ok(false) => {}
                    Err(e) => error!(task = %parent.id, error = %e, "aggregation failed"),
                }
            });
        }
    }
}

async fn run_blocking<T: Send + 'static>(
    f: impl FnOnce() -> Result<T, OcrError> + Send + 'static,
) -> Result<T, OcrError> {
    tokio::task::spawn_blocking(f)
        .await
        .map_err(|e| OcrError::InvalidConfig(format!("blocking task aborted: {e}")))?
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::split::tests::build_pdf;
    use async_trait::async_trait;
    use tokio_util::sync::CancellationToken;

    struct NullProcessor;

    #[async_trait]
    impl PdfProcessor for NullProcessor {
        async fn process_pdf(
            &self,
            _cancel: &CancellationToken,
            _pdf_path: &Path,
        ) -> Result<String, OcrError> {
            Ok(String::new())
        }
    }

    fn manager(output_root: &Path) -> TaskManager {
        let cfg = EngineConfig {
            output_root: output_root.to_path_buf(),
            ..EngineConfig::default()
        };
        TaskManager::new(cfg, Arc::new(NullProcessor), None)
    }

    #[tokio::test]
    async fn create_materialises_shard_catalog_and_files() {
        let dir = tempfile::tempdir().unwrap();
        let pdf = dir.path().join("report.pdf");
        build_pdf(&pdf, 5);

        let mgr = manager(&dir.path().join("out"));
        let id = mgr.create(&pdf).await.unwrap();

        let parent = mgr.lookup(&id).await.unwrap();
        let shards = parent.shards();
        assert_eq!(shards.len(), 3);
        assert_eq!(
            shards
                .iter()
                .map(|s| (s.page_start, s.page_end))
                .collect::<Vec<_>>(),
            vec![(1, 2), (3, 4), (5, 5)]
        );
        assert_eq!(shards[0].id, format!("{id}_1"));
        assert_eq!(
            shards[2].split_pdf_path.file_name().unwrap(),
            "report_5.pdf"
        );
        for shard in &shards {
            assert!(shard.split_pdf_path.exists(), "{:?}", shard.split_pdf_path);
        }
        assert_eq!(parent.status(), TaskStatus::Pending);
    }

    #[tokio::test]
    async fn create_rejects_documents_at_the_page_limit() {
        let dir = tempfile::tempdir().unwrap();
        let pdf = dir.path().join("big.pdf");
        build_pdf(&pdf, 30);

        let mgr = manager(&dir.path().join("out"));
        let err = mgr.create(&pdf).await.unwrap_err();
        assert!(matches!(
            err,
            OcrError::TooManyPages {
                pages: 30,
                limit: 30,
                ..
            }
        ));
    }

    #[tokio::test]
    async fn unknown_ids_surface_as_errors() {
        let dir = tempfile::tempdir().unwrap();
        let mgr = manager(dir.path());

        let err = mgr.submit("nope", Duration::from_secs(1)).await.unwrap_err();
        assert!(matches!(err, OcrError::UnknownTask { .. }));
        let err = mgr.wait("nope", Duration::from_millis(10)).await.unwrap_err();
        assert!(matches!(err, OcrError::UnknownTask { .. }));
        assert!(mgr.get("nope").await.is_none());
    }
}
