//! Parent task: shard catalog, completion accounting, and the once-only
//! aggregation of shard Markdown into the final artifact.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Mutex, MutexGuard, PoisonError};

use chrono::Utc;
use serde::{Deserialize, Serialize};
use tokio::io::AsyncWriteExt;
use tracing::{info, warn};

use crate::error::OcrError;
use crate::store::TaskRecord;
use crate::worker::{CompletionSignal, ShardJob};

/// Lifecycle of a parent task.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TaskStatus {
    Pending,
    Processing,
    Completed,
    Failed,
}

impl std::fmt::Display for TaskStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            TaskStatus::Pending => "pending",
            TaskStatus::Processing => "processing",
            TaskStatus::Completed => "completed",
            TaskStatus::Failed => "failed",
        };
        f.write_str(s)
    }
}

/// Lifecycle of one shard.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ShardStatus {
    Pending,
    Processing,
    Success,
    Failed,
}

impl ShardStatus {
    fn is_terminal(self) -> bool {
        matches!(self, ShardStatus::Success | ShardStatus::Failed)
    }
}

/// Tracking record for one shard of a parent task.
#[derive(Debug, Clone)]
pub struct ShardMeta {
    /// `<parent_id>_<index>`, index 1-based.
    pub id: String,
    /// Inclusive 1-based page range.
    pub page_start: usize,
    pub page_end: usize,
    /// Shard PDF produced by the splitter.
    pub split_pdf_path: PathBuf,
    /// Scratch Markdown written by the worker.
    pub temp_md_path: PathBuf,
    pub status: ShardStatus,
    /// Last error reported for this shard.
    pub error: Option<String>,
}

/// Read-only snapshot served to status queries.
#[derive(Debug, Clone, Serialize)]
pub struct TaskView {
    pub id: String,
    pub status: TaskStatus,
    pub completed_shards: usize,
    pub total_shards: usize,
    pub failed_shards: Vec<String>,
    pub output_path: PathBuf,
}

impl TaskView {
    /// Snapshot reconstructed from a persisted record; shard-level detail is
    /// gone once the task left the in-memory index.
    pub fn from_record(record: &TaskRecord) -> Self {
        Self {
            id: record.id.clone(),
            status: record.status,
            completed_shards: 0,
            total_shards: 0,
            failed_shards: Vec::new(),
            output_path: record.result_path.clone(),
        }
    }
}

struct ParentState {
    shards: HashMap<String, ShardMeta>,
    /// Shards that reported a terminal outcome, success or failure.
    completed_count: usize,
    failed_shards: Vec<String>,
    status: TaskStatus,
}

/// A user-visible PDF job and its shard catalog.
///
/// Mutated only through the task manager's synchronized entry points and
/// the single completion consumer; the aggregation latch keeps the stitch
/// at-most-once even if a future design runs multiple consumers.
pub struct ParentTask {
    pub id: String,
    pub source_path: PathBuf,
    pub work_dir: PathBuf,
    pub output_path: PathBuf,
    pub total_pages: usize,
    pub total_shards: usize,
    state: Mutex<ParentState>,
    aggregated: AtomicBool,
}

impl ParentTask {
    pub fn new(
        id: String,
        source_path: PathBuf,
        work_dir: PathBuf,
        total_pages: usize,
        shards: HashMap<String, ShardMeta>,
    ) -> Self {
        let output_path = work_dir.join("result.md");
        let total_shards = shards.len();
        Self {
            id,
            source_path,
            work_dir,
            output_path,
            total_pages,
            total_shards,
            state: Mutex::new(ParentState {
                shards,
                completed_count: 0,
                failed_shards: Vec::new(),
                status: TaskStatus::Pending,
            }),
            aggregated: AtomicBool::new(false),
        }
    }

    fn lock_state(&self) -> MutexGuard<'_, ParentState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn status(&self) -> TaskStatus {
        self.lock_state().status
    }

    pub fn set_status(&self, status: TaskStatus) {
        self.lock_state().status = status;
    }

    /// Shard snapshot in `page_start` order.
    pub fn shards(&self) -> Vec<ShardMeta> {
        let state = self.lock_state();
        let mut shards: Vec<ShardMeta> = state.shards.values().cloned().collect();
        shards.sort_by(|a, b| a.page_start.cmp(&b.page_start).then(a.id.cmp(&b.id)));
        shards
    }

    /// Pool jobs for every shard, in `page_start` order.
    pub fn jobs(&self, max_retries: u32) -> Vec<ShardJob> {
        self.shards()
            .into_iter()
            .map(|s| ShardJob {
                id: s.id,
                parent_id: self.id.clone(),
                pdf_path: s.split_pdf_path,
                output_path: s.temp_md_path,
                page_start: s.page_start,
                page_end: s.page_end,
                max_retries,
            })
            .collect()
    }

    /// Mark one shard as handed to the pool.
    pub fn mark_shard_processing(&self, shard_id: &str) {
        if let Some(shard) = self.lock_state().shards.get_mut(shard_id) {
            shard.status = ShardStatus::Processing;
        }
    }

    pub fn view(&self) -> TaskView {
        let state = self.lock_state();
        TaskView {
            id: self.id.clone(),
            status: state.status,
            completed_shards: state.completed_count,
            total_shards: self.total_shards,
            failed_shards: state.failed_shards.clone(),
            output_path: self.output_path.clone(),
        }
    }

    /// Record a completion signal against its shard.
    ///
    /// Both outcomes advance `completed_count`; a success-only counter would
    /// stall aggregation forever on the first failed shard. Returns `true`
    /// when every shard has reported.
    pub fn apply_signal(&self, signal: &CompletionSignal) -> bool {
        if signal.parent_id != self.id {
            warn!(
                task = %self.id,
                parent = %signal.parent_id,
                shard = %signal.shard_id,
                "completion signal addressed to another task"
            );
            return false;
        }

        let mut state = self.lock_state();
        let Some(shard) = state.shards.get_mut(&signal.shard_id) else {
            warn!(task = %self.id, shard = %signal.shard_id, "signal for unknown shard");
            return false;
        };
        if shard.status.is_terminal() {
            warn!(task = %self.id, shard = %signal.shard_id, "duplicate completion signal");
            return false;
        }

        if signal.success {
            shard.status = ShardStatus::Success;
        } else {
            shard.status = ShardStatus::Failed;
            shard.error = signal.error.clone();
            let id = signal.shard_id.clone();
            state.failed_shards.push(id);
        }
        state.completed_count += 1;
        state.completed_count == self.total_shards
    }

    pub fn is_all_done(&self) -> bool {
        self.lock_state().completed_count == self.total_shards
    }

    /// Stitch the shard outputs into `output_path`, in `page_start` order.
    ///
    /// Guarded by the aggregation latch: the first caller does the work and
    /// gets `Ok(true)`, every later caller gets `Ok(false)` untouched.
    /// Successful shards are appended verbatim; failed ones leave a marker
    /// comment. Scratch files and shard PDFs are removed afterwards,
    /// ignoring individual removal errors. Partial failure still ends in
    /// `Completed`; `failed_shards` records the misses.
    pub async fn aggregate(&self) -> Result<bool, OcrError> {
        if self.aggregated.swap(true, Ordering::SeqCst) {
            return Ok(false);
        }

        let shards = self.shards();
        let mut out = tokio::fs::OpenOptions::new()
            .append(true)
            .create(true)
            .open(&self.output_path)
            .await
            .map_err(|e| OcrError::io(&self.output_path, e))?;

        for shard in &shards {
            if shard.status == ShardStatus::Success {
                let content = tokio::fs::read(&shard.temp_md_path)
                    .await
                    .map_err(|e| OcrError::io(&shard.temp_md_path, e))?;
                out.write_all(&content)
                    .await
                    .map_err(|e| OcrError::io(&self.output_path, e))?;
            } else {
                let marker = format!(
                    "<!-- [OCR Failed] Pages {}-{}: {} -->\n",
                    shard.page_start, shard.page_end, shard.id
                );
                out.write_all(marker.as_bytes())
                    .await
                    .map_err(|e| OcrError::io(&self.output_path, e))?;
            }
        }
        out.flush()
            .await
            .map_err(|e| OcrError::io(&self.output_path, e))?;
        drop(out);

        for shard in &shards {
            remove_quietly(&shard.split_pdf_path).await;
            remove_quietly(&shard.temp_md_path).await;
        }

        let failed = {
            let mut state = self.lock_state();
            state.status = TaskStatus::Completed;
            state.failed_shards.len()
        };
        info!(
            task = %self.id,
            shards = shards.len(),
            failed,
            output = %self.output_path.display(),
            "aggregation complete"
        );
        Ok(true)
    }

    /// Persistable record of the finished task.
    pub fn record(&self) -> TaskRecord {
        let state = self.lock_state();
        let now = Utc::now();
        TaskRecord {
            id: self.id.clone(),
            status: state.status,
            pdf_path: self.source_path.clone(),
            result_path: self.output_path.clone(),
            total_pages: self.total_pages,
            error: None,
            created_at: now,
            updated_at: now,
        }
    }
}

/// Scratch cleanup is best effort; a leftover file is harmless.
async fn remove_quietly(path: &Path) {
    let _ = tokio::fs::remove_file(path).await;
}
